//! Configuration management for Mediagrab.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, ErrorContext, Result};
use crate::media::DEFAULT_FORMAT_HINT;
use crate::ytdlp::DEFAULT_BINARY;

/// Upper bound accepted for the socket timeout.
pub const MAX_SOCKET_TIMEOUT_SECS: u64 = 600;

const fn default_socket_timeout() -> u64 {
    30
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from(DEFAULT_BINARY)
}

fn default_format_hint() -> String {
    DEFAULT_FORMAT_HINT.to_string()
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediagrabConfig {
    /// Path or name of the `yt-dlp` executable.
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,
    /// Format hint used when extracting metadata.
    #[serde(default = "default_format_hint")]
    pub info_format_hint: String,
    /// Directory downloads go to when none is given.
    #[serde(default = "default_download_directory")]
    pub download_directory: PathBuf,
    /// Network timeout handed to the provider, in seconds (0 = provider default).
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,
    /// Extra provider arguments, appended before the URL.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for MediagrabConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            info_format_hint: default_format_hint(),
            download_directory: default_download_directory(),
            socket_timeout_secs: default_socket_timeout(),
            extra_args: Vec::new(),
        }
    }
}

impl MediagrabConfig {
    /// Load configuration from the platform config directory.
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).read_context(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.validate();

        info!("Loaded config from {}", path.display());
        debug!("Download directory: {}", config.download_directory.display());
        Ok(config)
    }

    /// Save configuration to the platform config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).create_dir_context(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).write_context(path)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Repair out-of-range or empty values in place.
    pub fn validate(&mut self) {
        if self.ytdlp_path.as_os_str().is_empty() {
            warn!("Empty yt-dlp path in config, using '{}'", DEFAULT_BINARY);
            self.ytdlp_path = default_ytdlp_path();
        }
        if self.info_format_hint.trim().is_empty() {
            warn!("Empty format hint in config, using '{}'", DEFAULT_FORMAT_HINT);
            self.info_format_hint = default_format_hint();
        }
        if self.socket_timeout_secs > MAX_SOCKET_TIMEOUT_SECS {
            warn!(
                "Socket timeout {}s too large, clamping to {}s",
                self.socket_timeout_secs, MAX_SOCKET_TIMEOUT_SECS
            );
            self.socket_timeout_secs = MAX_SOCKET_TIMEOUT_SECS;
        }
        if self.download_directory.as_os_str().is_empty() {
            self.download_directory = default_download_directory();
        }
    }

    /// Get the path to the default config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the default download directory.
#[must_use]
pub fn default_download_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mediagrab")
        .join("config.json")
}
