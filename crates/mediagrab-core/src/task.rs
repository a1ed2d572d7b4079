//! Download task records.
//!
//! A [`DownloadTask`] is the controller-owned view of one download attempt.
//! Callers only ever see snapshots of it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::progress::ProgressEvent;

/// Unique identifier for a download task.
pub type TaskId = u64;

/// Lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted, background task not yet talking to the provider.
    #[default]
    Idle,
    /// The provider transfer is in flight.
    Running,
    /// The provider finished the transfer.
    Completed,
    /// The transfer failed.
    Failed,
    /// The transfer was cancelled.
    Cancelled,
}

impl TaskState {
    /// Whether this is one of the terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Parameters of a download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Media page URL.
    pub url: String,
    /// Provider format selector; empty means "provider default".
    pub format_selector: String,
    /// Directory the file is written to.
    pub destination: PathBuf,
    /// Human title used as the filename stem when possible.
    pub desired_title: String,
}

impl DownloadRequest {
    /// Create a new download request.
    pub fn new(
        url: impl Into<String>,
        format_selector: impl Into<String>,
        destination: impl Into<PathBuf>,
        desired_title: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            format_selector: format_selector.into(),
            destination: destination.into(),
            desired_title: desired_title.into(),
        }
    }

    /// The selector to hand to the provider, `None` for its own default.
    #[must_use]
    pub fn selector(&self) -> Option<&str> {
        let selector = self.format_selector.as_str();
        (!selector.trim().is_empty()).then_some(selector)
    }
}

/// Snapshot of a download task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Task identifier.
    pub id: TaskId,
    /// Current lifecycle state.
    pub state: TaskState,
    /// The request this task serves.
    pub request: DownloadRequest,
    /// Bytes transferred so far.
    pub bytes_downloaded: u64,
    /// Total bytes; 0 means unknown.
    pub bytes_total: u64,
    /// Last reported percentage (0.0 - 100.0).
    pub percent: f64,
    /// Failure message when `state` is `Failed`.
    pub error: Option<String>,
}

impl DownloadTask {
    pub(crate) const fn new(id: TaskId, request: DownloadRequest) -> Self {
        Self {
            id,
            state: TaskState::Idle,
            request,
            bytes_downloaded: 0,
            bytes_total: 0,
            percent: 0.0,
            error: None,
        }
    }

    /// Whether the task reached a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a progress event. Ignored once the task is terminal.
    pub(crate) const fn record_progress(&mut self, event: &ProgressEvent) {
        if self.state.is_terminal() {
            return;
        }
        self.bytes_downloaded = event.downloaded;
        self.bytes_total = event.total;
        self.percent = event.percent;
    }

    /// Move to `next`, enforcing the lifecycle. Returns false if refused.
    pub(crate) fn transition(&mut self, next: TaskState) -> bool {
        let allowed = match (self.state, next) {
            (TaskState::Idle, TaskState::Running) => true,
            (current, next) if !current.is_terminal() && next.is_terminal() => true,
            _ => false,
        };
        if allowed {
            self.state = next;
        }
        allowed
    }
}
