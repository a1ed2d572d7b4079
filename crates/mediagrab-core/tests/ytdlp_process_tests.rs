//! `YtDlpProvider` driven end to end against stand-in `yt-dlp` scripts.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mediagrab_core::{
    CancelOutcome, DownloadController, DownloadHandle, DownloadObserver, DownloadTask,
    ProgressEvent, TaskState, YtDlpProvider,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl DownloadObserver for Recorder {
    fn on_progress(&self, event: ProgressEvent) {
        self.0
            .lock()
            .unwrap()
            .push(format!("p{}:{}:{}", event.downloaded, event.total, event.percent));
    }

    fn on_complete(&self) {
        self.0.lock().unwrap().push("complete".to_string());
    }

    fn on_error(&self, message: &str) {
        self.0.lock().unwrap().push(format!("err {message}"));
    }

    fn on_cancelled(&self) {
        self.0.lock().unwrap().push("cancelled".to_string());
    }
}

/// Write an executable shell script standing in for `yt-dlp`.
fn write_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-yt-dlp");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn controller(tool: &Path) -> (DownloadController, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let provider = Arc::new(YtDlpProvider::new(tool));
    let controller = DownloadController::new(provider, recorder.clone()).unwrap();
    (controller, recorder)
}

async fn finish(handle: &DownloadHandle) -> DownloadTask {
    tokio::time::timeout(WAIT, handle.wait())
        .await
        .expect("task never finished")
}

#[tokio::test]
async fn test_progress_lines_reach_observer() {
    let dir = TempDir::new().unwrap();
    let tool = write_tool(
        dir.path(),
        "echo '[youtube] abc: Downloading webpage'\n\
         echo 'mediagrab-progress downloading 10 100'\n\
         echo 'mediagrab-progress downloading 50 100'\n\
         echo 'mediagrab-progress downloading 100 100'\n\
         echo 'mediagrab-progress finished 100 100'",
    );
    let (controller, recorder) = controller(&tool);

    let handle = controller
        .start_download("https://example.com/v", "", dir.path().join("out"), "Clip")
        .unwrap();
    let task = finish(&handle).await;

    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.bytes_downloaded, 100);
    assert_eq!(
        recorder.calls(),
        vec!["p10:100:10", "p50:100:50", "p100:100:100", "complete"]
    );
}

#[tokio::test]
async fn test_cancel_kills_running_process() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("finished-marker");
    let tool = write_tool(
        dir.path(),
        &format!(
            "echo 'mediagrab-progress downloading 10 100'\n\
             echo 'mediagrab-progress downloading 50 100'\n\
             sleep 1\n\
             touch '{}'\n\
             echo 'mediagrab-progress downloading 100 100'",
            marker.display()
        ),
    );
    let (controller, recorder) = controller(&tool);

    let handle = controller
        .start_download("https://example.com/v", "", dir.path().join("out"), "Clip")
        .unwrap();
    tokio::time::timeout(WAIT, async {
        while handle.snapshot().bytes_downloaded < 50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no progress from tool");

    assert_eq!(
        controller.cancel_download(),
        CancelOutcome::Requested(handle.id())
    );
    let task = finish(&handle).await;
    assert_eq!(task.state, TaskState::Cancelled);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "tool kept running after cancel");
    assert_eq!(recorder.calls(), vec!["p10:100:10", "p50:100:50", "cancelled"]);
}

#[tokio::test]
async fn test_tool_error_line_becomes_failure() {
    let dir = TempDir::new().unwrap();
    let tool = write_tool(
        dir.path(),
        "echo 'WARNING: falling back' >&2\n\
         echo 'ERROR: Requested format is not available' >&2\n\
         exit 1",
    );
    let (controller, recorder) = controller(&tool);

    let handle = controller
        .start_download("https://x/v", "999", dir.path().join("out"), "Clip")
        .unwrap();
    let task = finish(&handle).await;

    assert_eq!(task.state, TaskState::Failed);
    let expected = "Download of https://x/v failed: ERROR: Requested format is not available";
    assert_eq!(task.error.as_deref(), Some(expected));
    assert_eq!(recorder.calls(), vec![format!("err {expected}")]);
    assert!(!controller.is_busy());
}
