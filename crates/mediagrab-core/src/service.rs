//! Host-facing service.
//!
//! [`MediaService`] is what a host binds to: metadata lookup, a single
//! cancellable download slot and the provider version, behind one object.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::MediagrabConfig;
use crate::controller::{CancelOutcome, DownloadController, DownloadHandle, DownloadObserver};
use crate::error::Result;
use crate::media::{MediaInfo, MetadataNormalizer};
use crate::provider::MediaProvider;
use crate::task::DownloadTask;
use crate::ytdlp::YtDlpProvider;

/// Metadata lookup plus the download controller, sharing one provider.
pub struct MediaService {
    provider: Arc<dyn MediaProvider>,
    normalizer: MetadataNormalizer,
    controller: DownloadController,
}

impl MediaService {
    /// Create a service on the current Tokio runtime.
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        observer: Arc<dyn DownloadObserver>,
        format_hint: impl Into<String>,
    ) -> Result<Self> {
        let normalizer = MetadataNormalizer::with_format_hint(Arc::clone(&provider), format_hint);
        let controller = DownloadController::new(Arc::clone(&provider), observer)?;
        Ok(Self {
            provider,
            normalizer,
            controller,
        })
    }

    /// Create a `yt-dlp` backed service from configuration.
    pub fn from_config(
        config: &MediagrabConfig,
        observer: Arc<dyn DownloadObserver>,
    ) -> Result<Self> {
        let provider: Arc<dyn MediaProvider> = Arc::new(YtDlpProvider::from_config(config));
        Self::new(provider, observer, config.info_format_hint.clone())
    }

    /// Fetch normalized metadata for `url`.
    pub async fn get_info(&self, url: &str) -> Result<MediaInfo> {
        self.normalizer.extract_info(url).await
    }

    /// Start a download. See [`DownloadController::start_download`].
    pub fn start_download(
        &self,
        url: impl Into<String>,
        format_selector: impl Into<String>,
        destination: impl Into<PathBuf>,
        desired_title: impl Into<String>,
    ) -> Result<DownloadHandle> {
        self.controller
            .start_download(url, format_selector, destination, desired_title)
    }

    /// Cancel whatever is downloading.
    pub fn stop_download(&self) -> CancelOutcome {
        let outcome = self.controller.cancel_download();
        info!("Stop requested: {:?}", outcome);
        outcome
    }

    /// Snapshot of the most recent download.
    pub fn current_task(&self) -> Option<DownloadTask> {
        self.controller.current_task()
    }

    /// Version of the provider library.
    pub async fn library_version(&self) -> Result<String> {
        Ok(self.provider.version().await?)
    }

    /// The underlying controller.
    pub const fn controller(&self) -> &DownloadController {
        &self.controller
    }
}
