//! Terminal progress bar driven by download callbacks.

use std::sync::LazyLock;

use indicatif::{ProgressBar, ProgressStyle};
use mediagrab_core::{DownloadObserver, ProgressEvent};

const BAR_STYLE: &str =
    "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const SPINNER_STYLE: &str = "{spinner:.blue} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const BAR_CHARS: &str = "█▓▒░  ";

static BAR_TEMPLATE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template(BAR_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(BAR_CHARS))
});

static SPINNER_TEMPLATE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template(SPINNER_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK))
});

/// Observer rendering an `indicatif` bar.
///
/// Starts as a spinner and becomes a bar once the total size is known.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    /// Create a hidden-until-first-tick progress bar.
    pub fn new() -> Self {
        let bar = ProgressBar::no_length();
        if let Some(style) = SPINNER_TEMPLATE.as_ref() {
            bar.set_style(style.clone());
        }
        bar.set_message("starting");
        Self { bar }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadObserver for TerminalProgress {
    fn on_progress(&self, event: ProgressEvent) {
        if event.has_total() && self.bar.length() != Some(event.total) {
            self.bar.set_length(event.total);
            if let Some(style) = BAR_TEMPLATE.as_ref() {
                self.bar.set_style(style.clone());
            }
        }
        self.bar.set_message("");
        self.bar.set_position(event.downloaded);
    }

    fn on_complete(&self) {
        self.bar.finish_with_message("done");
    }

    fn on_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("failed: {message}"));
    }

    fn on_cancelled(&self) {
        self.bar.abandon_with_message("cancelled");
    }
}
