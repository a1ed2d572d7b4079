//! Progress normalization.
//!
//! Turns the raw byte counters a provider reports into a [`ProgressEvent`].

use serde::{Deserialize, Serialize};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// A normalized progress update delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressEvent {
    /// Bytes transferred so far.
    pub downloaded: u64,
    /// Total bytes; 0 when the provider does not know.
    pub total: u64,
    /// Completion percentage with one decimal place; 0 when `total` is 0.
    pub percent: f64,
}

impl ProgressEvent {
    /// Downloaded amount in MiB, two decimals.
    #[must_use]
    pub fn downloaded_megabytes(&self) -> f64 {
        to_megabytes(self.downloaded)
    }

    /// Total size in MiB, two decimals (0 when unknown).
    #[must_use]
    pub fn total_megabytes(&self) -> f64 {
        to_megabytes(self.total)
    }

    /// Whether the total size is known.
    #[must_use]
    pub const fn has_total(&self) -> bool {
        self.total > 0
    }
}

/// Build a progress event from raw counters.
///
/// An unknown or zero total yields `total = 0` and `percent = 0`.
///
/// ```rust
/// use mediagrab_core::progress::normalize_progress;
///
/// let event = normalize_progress(1, Some(3));
/// assert_eq!(event.percent, 33.3);
/// assert_eq!(normalize_progress(50, None).percent, 0.0);
/// ```
#[must_use]
pub fn normalize_progress(downloaded: u64, total: Option<u64>) -> ProgressEvent {
    match total {
        Some(total) if total > 0 => ProgressEvent {
            downloaded,
            total,
            percent: round_one_decimal(downloaded as f64 / total as f64 * 100.0),
        },
        _ => ProgressEvent {
            downloaded,
            total: 0,
            percent: 0.0,
        },
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Convert a byte count to MiB rounded to two decimals.
#[must_use]
pub fn to_megabytes(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MEGABYTE * 100.0).round() / 100.0
}
