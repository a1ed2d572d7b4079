//! Error types for Mediagrab core operations.
//!
//! Errors are grouped by domain and composed into the top-level [`Error`]:
//!
//! - [`ExtractionError`] - metadata fetch failed, nothing was produced
//! - [`DownloadError`] - a transfer failed mid-flight (a partial file may exist)
//! - [`TaskError`] - download slot conflicts
//! - [`ProviderError`] - low-level failures of the media provider
//! - [`FileSystemError`] - local filesystem failures with the offending path

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::task::TaskId;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category, used by hosts for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Metadata extraction failed.
    Extraction,
    /// A download failed.
    Download,
    /// A task slot conflict.
    Task,
    /// The media provider failed.
    Provider,
    /// Local filesystem failure.
    FileSystem,
    /// Invalid configuration.
    Configuration,
    /// Raw I/O failure.
    Io,
    /// JSON (de)serialization failure.
    Serialization,
}

/// Failures reported by a media provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider executable could not be found.
    #[error("Provider tool not found: {tool}")]
    ToolNotFound {
        /// Tool name or path.
        tool: String,
    },

    /// The provider process could not be launched.
    #[error("Failed to launch {tool}: {reason}")]
    SpawnFailed {
        /// Tool name or path.
        tool: String,
        /// Underlying reason.
        reason: String,
    },

    /// The provider ran but reported failure.
    #[error("{message}")]
    Failed {
        /// Process exit code, if any.
        exit_code: Option<i32>,
        /// The provider's own error message.
        message: String,
    },

    /// The provider produced output we could not understand.
    #[error("Provider returned malformed output: {reason}")]
    InvalidOutput {
        /// What was wrong with the output.
        reason: String,
    },

    /// I/O failure while talking to the provider.
    #[error("Provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata extraction errors.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The URL was rejected before contacting the provider.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The provider failed to extract metadata.
    #[error("Failed to extract media info from {url}: {message}")]
    Provider {
        /// The requested URL.
        url: String,
        /// The provider's message.
        message: String,
    },
}

/// Download errors, reported through the observer's `on_error`.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request was rejected before a task was created.
    #[error("Invalid download request: {reason}")]
    InvalidRequest {
        /// Why it was rejected.
        reason: String,
    },

    /// The provider transfer failed.
    #[error("Download of {url} failed: {message}")]
    Transfer {
        /// The requested URL.
        url: String,
        /// The provider's message.
        message: String,
    },

    /// The background task died without reporting an outcome.
    #[error("Download task for {url} terminated unexpectedly")]
    Aborted {
        /// The requested URL.
        url: String,
    },
}

/// Download slot errors.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A start request arrived while another task was active.
    #[error("A download is already in progress (task {active})")]
    Busy {
        /// The task currently holding the slot.
        active: TaskId,
    },

    /// A cancel request no longer matches the live task.
    ///
    /// Never surfaced by the public controller API; it is resolved to a no-op.
    #[error("Cancellation targeted task {requested} but the live task is {live:?}")]
    CancellationRace {
        /// The task id the caller asked to cancel.
        requested: TaskId,
        /// The task id currently in the slot, if any.
        live: Option<TaskId>,
    },
}

/// Filesystem errors.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to read a file.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// File path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to write a file.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// File path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to delete a file.
    #[error("Failed to delete {path}: {reason}")]
    DeleteFailed {
        /// File path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The named file is not a media file in the library.
    #[error("No downloaded media named '{name}' in {directory}")]
    NotInLibrary {
        /// Requested file name.
        name: String,
        /// Library directory.
        directory: PathBuf,
    },
}

/// Errors that can occur in Mediagrab core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Metadata extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Task slot conflict.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Provider failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Filesystem failure.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get the coarse category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Download(_) => ErrorKind::Download,
            Self::Task(_) => ErrorKind::Task,
            Self::Provider(_) => ErrorKind::Provider,
            Self::FileSystem(_) => ErrorKind::FileSystem,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Extraction(ExtractionError::Provider { .. })
            | Self::Download(DownloadError::Transfer { .. } | DownloadError::Aborted { .. })
            | Self::Task(TaskError::Busy { .. }) => true,
            Self::Provider(ProviderError::Failed { .. } | ProviderError::Io(_)) => true,
            _ => false,
        }
    }

    /// Suggested delay before retrying, if the error is retryable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Task(TaskError::Busy { .. }) => Some(1),
            Self::Extraction(_) | Self::Download(_) | Self::Provider(_) if self.is_retryable() => {
                Some(5)
            }
            _ => None,
        }
    }
}

/// Attach filesystem context to raw I/O results.
pub trait ErrorContext<T> {
    /// Map a failed read of `path` into [`FileSystemError::ReadFailed`].
    fn read_context(self, path: &Path) -> Result<T>;
    /// Map a failed write of `path` into [`FileSystemError::WriteFailed`].
    fn write_context(self, path: &Path) -> Result<T>;
    /// Map a failed directory creation into [`FileSystemError::CreateDirFailed`].
    fn create_dir_context(self, path: &Path) -> Result<T>;
    /// Map a failed removal of `path` into [`FileSystemError::DeleteFailed`].
    fn delete_context(self, path: &Path) -> Result<T>;
}

impl<T> ErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn read_context(self, path: &Path) -> Result<T> {
        self.map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })
    }

    fn write_context(self, path: &Path) -> Result<T> {
        self.map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })
    }

    fn create_dir_context(self, path: &Path) -> Result<T> {
        self.map_err(|e| {
            Error::FileSystem(FileSystemError::CreateDirFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })
    }

    fn delete_context(self, path: &Path) -> Result<T> {
        self.map_err(|e| {
            Error::FileSystem(FileSystemError::DeleteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })
    }
}
