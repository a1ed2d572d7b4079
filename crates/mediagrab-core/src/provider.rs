//! Media provider abstraction.
//!
//! A provider is the opaque extractor/downloader that actually talks to the
//! video host. The rest of the crate only sees this trait, which keeps the
//! normalizer and the controller testable without network access.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Options for a metadata-only extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractOptions {
    /// Format hint for the provider's own selection logic.
    pub format: Option<String>,
    /// Only look at the single item, never expand playlists.
    pub no_playlist: bool,
}

/// Options for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Format selector; `None` lets the provider choose its default.
    pub format: Option<String>,
    /// Output path template, may contain provider placeholders such as `%(ext)s`.
    pub output_template: String,
    /// Only download the single item, never expand playlists.
    pub no_playlist: bool,
    /// List formats instead of downloading.
    pub list_formats: bool,
}

impl DownloadOptions {
    /// Options for downloading a single item with the given selector and template.
    pub fn new(format: Option<String>, output_template: impl Into<String>) -> Self {
        Self {
            format,
            output_template: output_template.into(),
            no_playlist: true,
            list_formats: false,
        }
    }
}

/// Status attached to a provider progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Bytes are actively being transferred.
    Downloading,
    /// One file finished transferring.
    Finished,
    /// Merging, remuxing or other post-processing.
    PostProcessing,
    /// The target already existed on disk.
    AlreadyDownloaded,
    /// The provider reported an error for this tick.
    Error,
}

/// One raw progress tick from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProgress {
    /// What the provider is doing.
    pub status: TransferStatus,
    /// Bytes transferred so far (0 if not reported).
    pub downloaded_bytes: u64,
    /// Total size, when the provider knows it.
    pub total_bytes: Option<u64>,
}

impl ProviderProgress {
    /// A `Downloading` tick.
    #[must_use]
    pub const fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            status: TransferStatus::Downloading,
            downloaded_bytes,
            total_bytes,
        }
    }
}

/// Callback the provider invokes for every progress tick.
#[derive(Clone)]
pub struct ProgressHook(Arc<dyn Fn(ProviderProgress) + Send + Sync>);

impl ProgressHook {
    /// Wrap a callback.
    pub fn new(f: impl Fn(ProviderProgress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A hook that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report one tick.
    pub fn report(&self, progress: ProviderProgress) {
        (self.0)(progress);
    }
}

impl fmt::Debug for ProgressHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHook").finish_non_exhaustive()
    }
}

/// Capability surface of a media provider.
///
/// Implementations must be cancel-safe: dropping a `download` future has to
/// stop the transfer (for process-backed providers, kill the child).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Name of the provider (for logging).
    fn name(&self) -> &'static str;

    /// Extract raw metadata for `url` without downloading anything.
    async fn extract_info(
        &self,
        url: &str,
        options: &ExtractOptions,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Download `url`, reporting ticks through `progress`.
    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: ProgressHook,
    ) -> Result<(), ProviderError>;

    /// Version string of the underlying provider library.
    async fn version(&self) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_hook_forwards_ticks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook = ProgressHook::new(move |p| sink.lock().unwrap().push(p));

        hook.report(ProviderProgress::downloading(10, Some(100)));
        hook.clone().report(ProviderProgress {
            status: TransferStatus::Finished,
            downloaded_bytes: 100,
            total_bytes: Some(100),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].downloaded_bytes, 10);
        assert_eq!(seen[1].status, TransferStatus::Finished);
    }

    #[test]
    fn test_download_options_defaults_to_single_item() {
        let options = DownloadOptions::new(None, "/tmp/%(id)s.%(ext)s");
        assert!(options.no_playlist);
        assert!(!options.list_formats);
        assert_eq!(options.format, None);
    }

    #[tokio::test]
    async fn test_mock_provider_reports_failure() {
        let mut provider = MockMediaProvider::new();
        provider.expect_version().returning(|| {
            Err(ProviderError::ToolNotFound {
                tool: "yt-dlp".to_string(),
            })
        });

        let err = provider.version().await.unwrap_err();
        assert!(err.to_string().contains("yt-dlp"));
    }
}
