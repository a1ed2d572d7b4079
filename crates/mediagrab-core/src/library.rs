//! Downloaded media library.
//!
//! A flat view over the download directory: only regular, non-hidden files
//! whose extension is one of [`ALLOWED_EXTENSIONS`] count as library
//! entries. Everything else in the directory (partial downloads, probe
//! files, unrelated documents) is invisible and never deleted.
//!
//! [`ALLOWED_EXTENSIONS`]: crate::media::ALLOWED_EXTENSIONS

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::MediagrabConfig;
use crate::error::{ErrorContext, FileSystemError, Result};
use crate::media::is_allowed_extension;
use crate::progress::to_megabytes;

/// One downloaded media file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryEntry {
    /// File name within the library directory.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Lowercase extension.
    pub extension: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Size in MiB, two decimals.
    pub size_megabytes: f64,
}

/// Media files in one directory.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    directory: PathBuf,
}

impl MediaLibrary {
    /// Library over `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Library over the configured download directory.
    pub fn from_config(config: &MediagrabConfig) -> Self {
        Self::new(&config.download_directory)
    }

    /// The library directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List media files, sorted by name.
    ///
    /// A missing directory is an empty library.
    pub fn list(&self) -> Result<Vec<LibraryEntry>> {
        if !self.directory.exists() {
            debug!("Library {} does not exist yet", self.directory.display());
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.directory).read_context(&self.directory)?;
        let mut files: Vec<LibraryEntry> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let name = entry.file_name().to_str()?.to_string();
                let extension = media_extension(&name)?;
                let meta = entry.metadata().ok().filter(fs::Metadata::is_file)?;
                Some(LibraryEntry {
                    name,
                    path,
                    extension,
                    size_bytes: meta.len(),
                    size_megabytes: to_megabytes(meta.len()),
                })
            })
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            "Found {} media files in {}",
            files.len(),
            self.directory.display()
        );
        Ok(files)
    }

    /// Delete one media file by name.
    ///
    /// `name` must be a bare file name of a listed entry; anything else is
    /// rejected with [`FileSystemError::NotInLibrary`].
    pub fn delete(&self, name: &str) -> Result<()> {
        let is_bare = Path::new(name).file_name() == Some(OsStr::new(name));
        let path = self.directory.join(name);
        if !is_bare || media_extension(name).is_none() || !path.is_file() {
            return Err(FileSystemError::NotInLibrary {
                name: name.to_string(),
                directory: self.directory.clone(),
            }
            .into());
        }

        fs::remove_file(&path).delete_context(&path)?;
        info!("Deleted {}", path.display());
        Ok(())
    }

    /// Delete every media file, returning how many were removed.
    ///
    /// Other files and the directory itself are left alone.
    pub fn delete_all(&self) -> Result<usize> {
        let entries = self.list()?;
        for entry in &entries {
            fs::remove_file(&entry.path).delete_context(&entry.path)?;
            debug!("Deleted {}", entry.path.display());
        }
        info!(
            "Cleared {} media files from {}",
            entries.len(),
            self.directory.display()
        );
        Ok(entries.len())
    }
}

/// The lowercase extension of a visible media file name.
fn media_extension(name: &str) -> Option<String> {
    if name.starts_with('.') {
        return None;
    }
    let extension = Path::new(name)
        .extension()
        .and_then(OsStr::to_str)?
        .to_ascii_lowercase();
    is_allowed_extension(&extension).then_some(extension)
}
