//! Mediagrab Core Library
//!
//! This crate provides the core functionality for Mediagrab:
//! - Media metadata extraction and normalization
//! - Progress normalization for provider byte counters
//! - A single-slot, cancellable download controller
//! - A `yt-dlp` backed media provider
//! - A view over downloaded media files

pub mod config;
pub mod controller;
pub mod error;
pub mod filename;
pub mod library;
pub mod media;
pub mod progress;
pub mod provider;
pub mod service;
pub mod task;
pub mod ytdlp;

pub use config::MediagrabConfig;
pub use controller::{
    CancelOutcome, DownloadController, DownloadHandle, DownloadObserver, NoopObserver,
};
pub use error::{Error, ErrorKind, Result};
pub use library::{LibraryEntry, MediaLibrary};
pub use media::{FormatOption, MediaInfo, MetadataNormalizer};
pub use progress::{ProgressEvent, normalize_progress};
pub use provider::{MediaProvider, ProgressHook, ProviderProgress, TransferStatus};
pub use service::MediaService;
pub use task::{DownloadRequest, DownloadTask, TaskId, TaskState};
pub use ytdlp::YtDlpProvider;
