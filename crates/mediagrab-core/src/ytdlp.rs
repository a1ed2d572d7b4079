//! `MediaProvider` backed by the `yt-dlp` executable.
//!
//! Every operation runs a child process spawned with `kill_on_drop`, so
//! dropping an in-flight future (for example when the controller aborts a
//! download task) kills the process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, trace};

use crate::config::MediagrabConfig;
use crate::error::ProviderError;
use crate::provider::{
    DownloadOptions, ExtractOptions, MediaProvider, ProgressHook, ProviderProgress,
    TransferStatus,
};

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "yt-dlp";

const PROGRESS_MARKER: &str = "mediagrab-progress";

const PROGRESS_TEMPLATE: &str = "download:mediagrab-progress %(progress.status)s \
     %(progress.downloaded_bytes)s %(progress.total_bytes)s";

static PROGRESS_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^mediagrab-progress\s+(\w+)\s+(\S+)\s+(\S+)\s*$").ok()
});

/// Provider that shells out to `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlpProvider {
    binary: PathBuf,
    socket_timeout_secs: u64,
    extra_args: Vec<String>,
}

impl Default for YtDlpProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

impl YtDlpProvider {
    /// Create a provider for the given executable.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_timeout_secs: 0,
            extra_args: Vec::new(),
        }
    }

    /// Create a provider from application configuration.
    pub fn from_config(config: &MediagrabConfig) -> Self {
        Self::new(&config.ytdlp_path)
            .with_socket_timeout(config.socket_timeout_secs)
            .with_extra_args(config.extra_args.clone())
    }

    /// Set the socket timeout in seconds (0 keeps the tool default).
    #[must_use]
    pub const fn with_socket_timeout(mut self, secs: u64) -> Self {
        self.socket_timeout_secs = secs;
        self
    }

    /// Extra arguments passed before the URL on every invocation.
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Path of the executable.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string(), "--no-colors".to_string()];
        if self.socket_timeout_secs > 0 {
            args.push("--socket-timeout".to_string());
            args.push(self.socket_timeout_secs.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn spawn_error(&self, e: std::io::Error) -> ProviderError {
        let tool = self.binary.display().to_string();
        if e.kind() == std::io::ErrorKind::NotFound {
            ProviderError::ToolNotFound { tool }
        } else {
            ProviderError::SpawnFailed {
                tool,
                reason: e.to_string(),
            }
        }
    }
}

/// Arguments for a metadata-only extraction.
fn extract_args(url: &str, options: &ExtractOptions) -> Vec<String> {
    let mut args = vec!["--dump-single-json".to_string(), "--skip-download".to_string()];
    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if let Some(format) = &options.format {
        args.push("-f".to_string());
        args.push(format.clone());
    }
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Arguments for a download.
fn download_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "-o".to_string(),
        options.output_template.clone(),
    ];
    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if options.list_formats {
        args.push("--list-formats".to_string());
    }
    if let Some(format) = &options.format {
        args.push("-f".to_string());
        args.push(format.clone());
    }
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Parse one line emitted through our progress template.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProviderProgress> {
    if !line.starts_with(PROGRESS_MARKER) {
        return None;
    }
    let caps = PROGRESS_LINE.as_ref()?.captures(line.trim_end())?;

    let status = match &caps[1] {
        "downloading" => TransferStatus::Downloading,
        "finished" => TransferStatus::Finished,
        "error" => TransferStatus::Error,
        _ => return None,
    };

    Some(ProviderProgress {
        status,
        downloaded_bytes: parse_byte_count(&caps[2]).unwrap_or(0),
        total_bytes: parse_byte_count(&caps[3]),
    })
}

/// yt-dlp prints `NA` for missing fields and sometimes floats for counters.
fn parse_byte_count(field: &str) -> Option<u64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.trunc() as u64)
}

/// The most useful line of yt-dlp's stderr: the last `ERROR:` line, or the
/// last non-empty line.
fn provider_message(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map_or_else(|| "yt-dlp exited without output".to_string(), |l| (*l).to_string())
}

fn check_status(status: ExitStatus, stderr: &str) -> Result<(), ProviderError> {
    if status.success() {
        return Ok(());
    }
    Err(ProviderError::Failed {
        exit_code: status.code(),
        message: provider_message(stderr),
    })
}

async fn collect_lines<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = String::new();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        buf.push_str(&line);
        buf.push('\n');
    }
    buf
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract_info(
        &self,
        url: &str,
        options: &ExtractOptions,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut args = self.common_args();
        args.extend(extract_args(url, options));
        debug!("Running {} {:?}", self.binary.display(), args);

        let output = self
            .command()
            .args(&args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        check_status(output.status, &stderr)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(ProviderError::InvalidOutput {
                reason: "empty metadata output".to_string(),
            });
        }

        serde_json::from_str(stdout.trim()).map_err(|e| ProviderError::InvalidOutput {
            reason: e.to_string(),
        })
    }

    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: ProgressHook,
    ) -> Result<(), ProviderError> {
        let mut args = self.common_args();
        args.extend(download_args(url, options));
        debug!("Running {} {:?}", self.binary.display(), args);

        let mut child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child.stdout.take().ok_or_else(|| ProviderError::InvalidOutput {
            reason: "stdout not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ProviderError::InvalidOutput {
            reason: "stderr not captured".to_string(),
        })?;

        let read_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some(tick) => progress.report(tick),
                    None => trace!("yt-dlp: {}", line),
                }
            }
        };

        let ((), stderr) = tokio::join!(read_progress, collect_lines(stderr));
        let status = child.wait().await?;
        check_status(status, &stderr)?;

        info!("yt-dlp finished downloading {}", url);
        Ok(())
    }

    async fn version(&self) -> Result<String, ProviderError> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        check_status(output.status, &stderr)?;

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(ProviderError::InvalidOutput {
                reason: "empty version output".to_string(),
            });
        }
        Ok(version)
    }
}
