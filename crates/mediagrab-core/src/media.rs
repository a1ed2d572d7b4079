//! Media metadata extraction and normalization.
//!
//! Provider responses are loosely typed: fields go missing, come back as
//! `null`, switch between integers and floats, and the same variant can be
//! listed several times. Everything is parsed through [`RawMediaInfo`] and
//! [`RawFormat`] once, at the boundary, and turned into the canonical
//! [`MediaInfo`] / [`FormatOption`] records.
//!
//! # Normalization rules
//!
//! - missing or `null` top-level fields become `""` / `0`
//! - a response without a `formats` list is treated as a single format
//! - formats whose extension is not in [`ALLOWED_EXTENSIONS`] are dropped
//! - `(format_id, extension, resolution)` duplicates keep the first entry
//! - the resulting list is emitted in reverse provider order

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, Result};
use crate::progress::to_megabytes;
use crate::provider::{ExtractOptions, MediaProvider};

/// Containers the host can play or save. Anything else is filtered out.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp4", "m4a", "webm", "mp3", "3gp", "ogg", "opus", "wav", "aac", "mkv",
];

/// Format hint used for metadata-only extraction.
///
/// Falls back to split streams for hosts that offer no muxed format.
pub const DEFAULT_FORMAT_HINT: &str = "best/bestvideo+bestaudio";

/// Canonical metadata for one media URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// The URL the metadata was extracted from.
    pub source_url: String,
    /// Media title (may be empty).
    pub title: String,
    /// Thumbnail URL (may be empty).
    pub thumbnail_url: String,
    /// Description (empty when absent or null).
    pub description: String,
    /// Duration in whole seconds (0 if unknown).
    pub duration_secs: u64,
    /// Selectable formats, reverse provider order.
    pub formats: Vec<FormatOption>,
}

/// One selectable encoding of the media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOption {
    /// Provider-assigned id, used verbatim as the download selector.
    pub format_id: String,
    /// Descriptive label.
    pub note: String,
    /// Size in bytes when the provider reports it.
    pub file_size_bytes: Option<u64>,
    /// Direct media URL (may be empty).
    pub media_link: String,
    /// Resolution label (empty for audio-only or unknown).
    pub resolution: String,
    /// Lower-cased container/codec token.
    pub extension: String,
}

impl FormatOption {
    /// Size in MiB (two decimals), if known.
    #[must_use]
    pub fn size_megabytes(&self) -> Option<f64> {
        self.file_size_bytes.map(to_megabytes)
    }

    /// Whether the provider reported this as an audio-only stream.
    #[must_use]
    pub fn is_audio_only(&self) -> bool {
        self.resolution.eq_ignore_ascii_case("audio only")
    }

    fn dedup_key(&self) -> (String, String, String) {
        (
            self.format_id.clone(),
            self.extension.clone(),
            self.resolution.clone(),
        )
    }

    fn from_raw(raw: RawFormat) -> Option<Self> {
        let format_id = raw.format_id.filter(|id| !id.is_empty())?;
        Some(Self {
            format_id,
            note: raw.format_note.unwrap_or_default(),
            file_size_bytes: raw.filesize,
            media_link: raw.url.unwrap_or_default(),
            resolution: raw.resolution.unwrap_or_default(),
            extension: raw
                .ext
                .map(|ext| ext.trim().to_ascii_lowercase())
                .unwrap_or_default(),
        })
    }
}

/// Whether `extension` is in the allow-list.
#[must_use]
pub fn is_allowed_extension(extension: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension)
}

/// One format entry as the provider reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    /// Provider format id.
    #[serde(default, deserialize_with = "lenient_string")]
    pub format_id: Option<String>,
    /// Descriptive note.
    #[serde(default, deserialize_with = "lenient_string")]
    pub format_note: Option<String>,
    /// Exact size in bytes.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    /// Direct media URL.
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    /// Resolution label.
    #[serde(default, deserialize_with = "lenient_string")]
    pub resolution: Option<String>,
    /// File extension.
    #[serde(default, deserialize_with = "lenient_string")]
    pub ext: Option<String>,
}

/// Top-level provider response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMediaInfo {
    /// Media title.
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    /// Thumbnail URL.
    #[serde(default, deserialize_with = "lenient_string")]
    pub thumbnail: Option<String>,
    /// Description; `null` and absent are the same.
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    /// Duration in seconds, possibly fractional.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    /// Format list, kept unparsed so one bad entry cannot sink the rest.
    #[serde(default)]
    pub formats: Option<Vec<Value>>,
    /// The response read as a single format, used when `formats` is missing.
    #[serde(flatten)]
    pub top_level: RawFormat,
}

impl RawMediaInfo {
    /// Parse a raw provider response.
    pub fn from_value(value: Value) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    fn candidates(self) -> Vec<RawFormat> {
        match self.formats {
            Some(entries) => entries
                .into_iter()
                .enumerate()
                .filter_map(|(index, entry)| match RawFormat::deserialize(entry) {
                    Ok(format) => Some(format),
                    Err(e) => {
                        warn!("Skipping unreadable format entry #{}: {}", index, e);
                        None
                    }
                })
                .collect(),
            None => vec![self.top_level],
        }
    }
}

/// Build the canonical record from a parsed provider response.
#[must_use]
pub fn normalize_media_info(source_url: &str, raw: RawMediaInfo) -> MediaInfo {
    let title = raw.title.clone().unwrap_or_default();
    let thumbnail_url = raw.thumbnail.clone().unwrap_or_default();
    let description = raw.description.clone().unwrap_or_default();
    let duration_secs = raw
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map_or(0, |d| d.trunc() as u64);

    let candidates = raw.candidates();
    let candidate_count = candidates.len();

    let mut seen = HashSet::new();
    let mut formats = Vec::with_capacity(candidate_count);
    for candidate in candidates {
        let Some(option) = FormatOption::from_raw(candidate) else {
            warn!("Skipping format without a format_id");
            continue;
        };
        if !is_allowed_extension(&option.extension) {
            debug!(
                "Filtering format {} with extension '{}'",
                option.format_id, option.extension
            );
            continue;
        }
        if !seen.insert(option.dedup_key()) {
            continue;
        }
        formats.push(option);
    }
    formats.reverse();

    debug!(
        "Normalized {} of {} provider formats for {}",
        formats.len(),
        candidate_count,
        source_url
    );

    MediaInfo {
        source_url: source_url.to_string(),
        title,
        thumbnail_url,
        description,
        duration_secs,
        formats,
    }
}

/// Extracts and normalizes metadata through a [`MediaProvider`].
pub struct MetadataNormalizer {
    provider: Arc<dyn MediaProvider>,
    format_hint: String,
}

impl MetadataNormalizer {
    /// Create a normalizer using [`DEFAULT_FORMAT_HINT`].
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        Self::with_format_hint(provider, DEFAULT_FORMAT_HINT)
    }

    /// Create a normalizer with a custom format hint.
    pub fn with_format_hint(provider: Arc<dyn MediaProvider>, hint: impl Into<String>) -> Self {
        Self {
            provider,
            format_hint: hint.into(),
        }
    }

    /// Fetch metadata for `url` and normalize it.
    ///
    /// Suspends until the provider round trip finishes. On failure nothing
    /// partial is returned.
    pub async fn extract_info(&self, url: &str) -> Result<MediaInfo> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ExtractionError::InvalidUrl {
                url: url.to_string(),
                reason: "URL cannot be empty".to_string(),
            }
            .into());
        }

        let options = ExtractOptions {
            format: Some(self.format_hint.clone()),
            no_playlist: true,
        };

        info!("Extracting media info for {} via {}", url, self.provider.name());

        let value = self
            .provider
            .extract_info(url, &options)
            .await
            .map_err(|e| ExtractionError::Provider {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !value.is_object() {
            return Err(ExtractionError::Provider {
                url: url.to_string(),
                message: "provider returned no data".to_string(),
            }
            .into());
        }

        let raw = RawMediaInfo::from_value(value).map_err(|e| ExtractionError::Provider {
            url: url.to_string(),
            message: format!("unreadable provider response: {e}"),
        })?;

        let media = normalize_media_info(url, raw);
        info!(
            "Extracted '{}' with {} formats",
            media.title,
            media.formats.len()
        );
        Ok(media)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.trunc() as u64))
}
