//! Download lifecycle controller.
//!
//! The controller owns a single download slot. Starting a download spawns two
//! tasks on the runtime:
//!
//! - a **worker** that probes the output filename and drives the provider
//!   transfer, posting [`TaskEvent`]s
//! - a **supervisor** that owns the task record, applies those events, joins
//!   the worker and fires exactly one terminal observer callback
//!
//! Cancellation aborts the worker. The provider future is dropped with it,
//! which for process-backed providers kills the child process.
//!
//! ```text
//! Idle ──Started──▶ Running ──▶ Completed | Failed | Cancelled
//!   └──────────── abort / failure ──────────▶ Cancelled | Failed
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{DownloadError, Error, Result, TaskError};
use crate::filename::resolve_output_template;
use crate::progress::{ProgressEvent, normalize_progress};
use crate::provider::{DownloadOptions, MediaProvider, ProgressHook, TransferStatus};
use crate::task::{DownloadRequest, DownloadTask, TaskId, TaskState};

/// Receives the lifecycle of every download started by a controller.
///
/// Callbacks run on the supervisor task and must not block. For each task,
/// progress callbacks precede the single terminal callback and none follow it.
/// A panicking callback is logged and swallowed; the task still settles.
pub trait DownloadObserver: Send + Sync {
    /// A progress tick, `downloaded` never decreasing within a task.
    fn on_progress(&self, event: ProgressEvent);

    /// The provider finished the transfer.
    fn on_complete(&self);

    /// The transfer failed.
    fn on_error(&self, message: &str);

    /// The transfer was cancelled.
    fn on_cancelled(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DownloadObserver for NoopObserver {
    fn on_progress(&self, _event: ProgressEvent) {}
    fn on_complete(&self) {}
    fn on_error(&self, _message: &str) {}
}

/// Result of a cancellation request. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was told to stop.
    Requested(TaskId),
    /// Nothing has been started yet.
    NoActiveTask,
    /// The task already reached a terminal state.
    AlreadyFinished(TaskId),
    /// The id does not name the live task.
    Stale,
}

/// Messages from the worker to the supervisor.
#[derive(Debug, Clone, Copy)]
enum TaskEvent {
    Started,
    Progress(ProgressEvent),
}

/// What the watch channel publishes.
#[derive(Debug, Clone)]
struct TaskCell {
    task: DownloadTask,
    /// Set after the terminal callback returned.
    settled: bool,
}

/// Caller-side view of one download.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    id: TaskId,
    cell: watch::Receiver<TaskCell>,
}

impl DownloadHandle {
    /// Task identifier.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Current snapshot of the task.
    pub fn snapshot(&self) -> DownloadTask {
        self.cell.borrow().task.clone()
    }

    /// Current state of the task.
    pub fn state(&self) -> TaskState {
        self.cell.borrow().task.state
    }

    /// Whether the task is terminal.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait until the task is terminal and its observer callback has run.
    pub async fn wait(&self) -> DownloadTask {
        let mut cell = self.cell.clone();
        if let Ok(c) = cell.wait_for(|c| c.settled).await {
            return c.task.clone();
        }
        // Supervisor gone (runtime shut down): report what we last saw.
        cell.borrow().task.clone()
    }
}

struct ActiveTask {
    id: TaskId,
    abort: AbortHandle,
    cell: watch::Receiver<TaskCell>,
}

impl ActiveTask {
    fn is_finished(&self) -> bool {
        self.cell.borrow().task.is_finished()
    }
}

#[derive(Default)]
struct Slot {
    last_id: TaskId,
    active: Option<ActiveTask>,
}

/// Single-slot download controller.
pub struct DownloadController {
    provider: Arc<dyn MediaProvider>,
    observer: Arc<dyn DownloadObserver>,
    runtime: Handle,
    slot: Mutex<Slot>,
}

impl DownloadController {
    /// Create a controller on the current Tokio runtime.
    ///
    /// Fails with a configuration error when called outside a runtime.
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        observer: Arc<dyn DownloadObserver>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Configuration(format!("No Tokio runtime available: {e}")))?;
        Ok(Self::with_runtime(provider, observer, runtime))
    }

    /// Create a controller spawning onto the given runtime.
    pub fn with_runtime(
        provider: Arc<dyn MediaProvider>,
        observer: Arc<dyn DownloadObserver>,
        runtime: Handle,
    ) -> Self {
        Self {
            provider,
            observer,
            runtime,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start downloading `url` into `destination`.
    ///
    /// An empty `format_selector` lets the provider choose. Returns
    /// immediately; the transfer runs in the background. Rejected with
    /// [`TaskError::Busy`] while another task is idle or running.
    pub fn start_download(
        &self,
        url: impl Into<String>,
        format_selector: impl Into<String>,
        destination: impl Into<PathBuf>,
        desired_title: impl Into<String>,
    ) -> Result<DownloadHandle> {
        self.start(DownloadRequest::new(
            url,
            format_selector,
            destination,
            desired_title,
        ))
    }

    /// Start a download from a prepared request.
    pub fn start(&self, request: DownloadRequest) -> Result<DownloadHandle> {
        if request.url.trim().is_empty() {
            return Err(DownloadError::InvalidRequest {
                reason: "URL cannot be empty".to_string(),
            }
            .into());
        }

        let mut slot = self.lock_slot();
        if let Some(active) = &slot.active
            && !active.is_finished()
        {
            debug!("Rejecting download of {}: task {} busy", request.url, active.id);
            return Err(TaskError::Busy { active: active.id }.into());
        }

        slot.last_id += 1;
        let id = slot.last_id;
        info!(
            "Starting download task {} for {} (format: {})",
            id,
            request.url,
            request.selector().unwrap_or("default")
        );

        let (cell_tx, cell_rx) = watch::channel(TaskCell {
            task: DownloadTask::new(id, request.clone()),
            settled: false,
        });
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let span = info_span!("download", task_id = id);
        let worker = self.runtime.spawn(
            run_transfer(Arc::clone(&self.provider), request.clone(), event_tx)
                .instrument(span.clone()),
        );
        let abort = worker.abort_handle();

        let supervisor = Supervisor {
            url: request.url,
            cell: cell_tx,
            observer: Arc::clone(&self.observer),
            last_downloaded: 0,
        };
        drop(
            self.runtime
                .spawn(supervisor.run(worker, event_rx).instrument(span)),
        );

        slot.active = Some(ActiveTask {
            id,
            abort,
            cell: cell_rx.clone(),
        });

        Ok(DownloadHandle { id, cell: cell_rx })
    }

    /// Forcibly cancel the active task.
    ///
    /// A no-op when nothing is running. Safe to call repeatedly.
    ///
    /// Returns as soon as the abort is requested. The task turns `Cancelled`
    /// when the supervisor observes the abort, so a `start_download` issued
    /// in between is still rejected with [`TaskError::Busy`]. Await
    /// [`DownloadHandle::wait`] before starting the next download.
    pub fn cancel_download(&self) -> CancelOutcome {
        let live = self.lock_slot().active.as_ref().map(|a| a.id);
        match live {
            Some(id) => self.cancel_task(id),
            None => CancelOutcome::NoActiveTask,
        }
    }

    /// Cancel the task with `id` if it is still the live task.
    pub fn cancel_task(&self, id: TaskId) -> CancelOutcome {
        match self.try_cancel(id) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Ignoring cancellation: {}", e);
                CancelOutcome::Stale
            }
        }
    }

    fn try_cancel(&self, id: TaskId) -> std::result::Result<CancelOutcome, TaskError> {
        let slot = self.lock_slot();
        let Some(active) = slot.active.as_ref() else {
            return Err(TaskError::CancellationRace {
                requested: id,
                live: None,
            });
        };
        if active.id != id {
            return Err(TaskError::CancellationRace {
                requested: id,
                live: Some(active.id),
            });
        }
        if active.is_finished() {
            return Ok(CancelOutcome::AlreadyFinished(id));
        }

        info!("Cancelling download task {}", id);
        active.abort.abort();
        Ok(CancelOutcome::Requested(id))
    }

    /// Snapshot of the most recent task, if any.
    pub fn current_task(&self) -> Option<DownloadTask> {
        self.lock_slot()
            .active
            .as_ref()
            .map(|a| a.cell.borrow().task.clone())
    }

    /// Whether a task is idle or running.
    pub fn is_busy(&self) -> bool {
        self.lock_slot()
            .active
            .as_ref()
            .is_some_and(|a| !a.is_finished())
    }
}

impl Drop for DownloadController {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = &slot.active
            && !active.is_finished()
        {
            debug!("Controller dropped, aborting task {}", active.id);
            active.abort.abort();
        }
    }
}

/// Worker body: probe the filename and drive the provider.
async fn run_transfer(
    provider: Arc<dyn MediaProvider>,
    request: DownloadRequest,
    events: mpsc::UnboundedSender<TaskEvent>,
) -> std::result::Result<(), DownloadError> {
    if let Err(e) = tokio::fs::create_dir_all(&request.destination).await {
        debug!(
            "Could not create {}: {}",
            request.destination.display(),
            e
        );
    }
    let template = resolve_output_template(&request.destination, &request.desired_title);
    let options = DownloadOptions::new(request.selector().map(str::to_string), template);

    let _ = events.send(TaskEvent::Started);

    let progress_tx = events.clone();
    let hook = ProgressHook::new(move |tick| {
        if tick.status == TransferStatus::Downloading {
            let event = normalize_progress(tick.downloaded_bytes, tick.total_bytes);
            let _ = progress_tx.send(TaskEvent::Progress(event));
        }
    });

    provider
        .download(&request.url, &options, hook)
        .await
        .map_err(|e| DownloadError::Transfer {
            url: request.url.clone(),
            message: e.to_string(),
        })
}

struct Supervisor {
    url: String,
    cell: watch::Sender<TaskCell>,
    observer: Arc<dyn DownloadObserver>,
    last_downloaded: u64,
}

impl Supervisor {
    async fn run(
        mut self,
        mut worker: JoinHandle<std::result::Result<(), DownloadError>>,
        mut events: mpsc::UnboundedReceiver<TaskEvent>,
    ) {
        let joined = loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.apply(event),
                joined = &mut worker => break joined,
            }
        };
        while let Ok(event) = events.try_recv() {
            self.apply(event);
        }
        self.finish(joined);
    }

    fn apply(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Started => {
                self.cell.send_modify(|c| {
                    c.task.transition(TaskState::Running);
                });
                info!("Download running: {}", self.url);
            }
            TaskEvent::Progress(progress) => {
                if progress.downloaded < self.last_downloaded {
                    debug!(
                        "Dropping progress regression {} < {}",
                        progress.downloaded, self.last_downloaded
                    );
                    return;
                }
                self.last_downloaded = progress.downloaded;
                self.cell.send_modify(|c| c.task.record_progress(&progress));
                self.notify("on_progress", |o| o.on_progress(progress));
            }
        }
    }

    fn finish(self, joined: std::result::Result<std::result::Result<(), DownloadError>, JoinError>) {
        let (state, message) = match joined {
            Ok(Ok(())) => (TaskState::Completed, None),
            Ok(Err(e)) => (TaskState::Failed, Some(e.to_string())),
            Err(e) if e.is_cancelled() => (TaskState::Cancelled, None),
            Err(e) => {
                warn!("Download worker panicked: {}", e);
                let aborted = DownloadError::Aborted {
                    url: self.url.clone(),
                };
                (TaskState::Failed, Some(aborted.to_string()))
            }
        };

        self.cell.send_modify(|c| {
            if c.task.transition(state) {
                c.task.error.clone_from(&message);
            }
        });

        match state {
            TaskState::Completed => {
                info!("Download completed: {}", self.url);
                self.notify("on_complete", |o| o.on_complete());
            }
            TaskState::Cancelled => {
                info!("Download cancelled: {}", self.url);
                self.notify("on_cancelled", |o| o.on_cancelled());
            }
            _ => {
                let message = message.unwrap_or_default();
                error!("Download failed: {}", message);
                self.notify("on_error", |o| o.on_error(&message));
            }
        }

        self.cell.send_modify(|c| c.settled = true);
    }

    /// Run one observer callback, containing any panic it raises.
    fn notify(&self, callback: &str, f: impl FnOnce(&dyn DownloadObserver)) {
        let observer = self.observer.as_ref();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(observer))) {
            error!(
                "Observer {} panicked: {}",
                callback,
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{MockMediaProvider, ProviderProgress};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Progress(u64),
        Complete,
        Error(String),
        Cancelled,
    }

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<Call>>);

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }
    }

    impl DownloadObserver for Recorder {
        fn on_progress(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(Call::Progress(event.downloaded));
        }
        fn on_complete(&self) {
            self.0.lock().unwrap().push(Call::Complete);
        }
        fn on_error(&self, message: &str) {
            self.0.lock().unwrap().push(Call::Error(message.to_string()));
        }
        fn on_cancelled(&self) {
            self.0.lock().unwrap().push(Call::Cancelled);
        }
    }

    fn controller(provider: MockMediaProvider) -> (DownloadController, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let controller =
            DownloadController::new(Arc::new(provider), recorder.clone()).unwrap();
        (controller, recorder)
    }

    #[tokio::test]
    async fn test_completed_download_reports_progress_then_complete() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockMediaProvider::new();
        provider.expect_download().times(1).returning(|_, _, hook| {
            hook.report(ProviderProgress::downloading(10, Some(100)));
            hook.report(ProviderProgress {
                status: TransferStatus::PostProcessing,
                downloaded_bytes: 0,
                total_bytes: None,
            });
            hook.report(ProviderProgress::downloading(100, Some(100)));
            Ok(())
        });

        let (controller, recorder) = controller(provider);
        let handle = controller
            .start_download("https://example.com/v", "", dir.path(), "Clip")
            .unwrap();
        let task = handle.wait().await;

        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.bytes_downloaded, 100);
        assert_eq!(task.percent, 100.0);
        assert_eq!(
            recorder.calls(),
            vec![Call::Progress(10), Call::Progress(100), Call::Complete]
        );
    }

    #[tokio::test]
    async fn test_selector_and_template_reach_provider() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockMediaProvider::new();
        provider
            .expect_download()
            .withf(|url, options, _| {
                url == "https://example.com/v"
                    && options.format.as_deref() == Some("137+140")
                    && options.output_template.ends_with("My Song.%(ext)s")
                    && options.no_playlist
                    && !options.list_formats
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (controller, _) = controller(provider);
        let handle = controller
            .start_download("https://example.com/v", "137+140", dir.path(), "My Song")
            .unwrap();
        assert_eq!(handle.wait().await.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_provider_failure_reports_error() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockMediaProvider::new();
        provider.expect_download().returning(|_, _, _| {
            Err(ProviderError::Failed {
                exit_code: Some(1),
                message: "ERROR: Requested format is not available".to_string(),
            })
        });

        let (controller, recorder) = controller(provider);
        let handle = controller
            .start_download("https://example.com/v", "999", dir.path(), "x")
            .unwrap();
        let task = handle.wait().await;

        assert_eq!(task.state, TaskState::Failed);
        let message = task.error.unwrap();
        assert!(message.contains("Requested format is not available"));
        assert_eq!(recorder.calls(), vec![Call::Error(message)]);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_progress_regression_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockMediaProvider::new();
        provider.expect_download().returning(|_, _, hook| {
            hook.report(ProviderProgress::downloading(50, Some(100)));
            hook.report(ProviderProgress::downloading(20, Some(100)));
            hook.report(ProviderProgress::downloading(60, Some(100)));
            Ok(())
        });

        let (controller, recorder) = controller(provider);
        let handle = controller
            .start_download("https://example.com/v", "", dir.path(), "x")
            .unwrap();
        handle.wait().await;

        assert_eq!(
            recorder.calls(),
            vec![Call::Progress(50), Call::Progress(60), Call::Complete]
        );
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let (controller, recorder) = controller(MockMediaProvider::new());
        let err = controller.start_download("  ", "", "/tmp", "x").unwrap_err();
        assert!(matches!(
            err,
            Error::Download(DownloadError::InvalidRequest { .. })
        ));
        assert!(controller.current_task().is_none());
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_task_is_noop() {
        let (controller, _) = controller(MockMediaProvider::new());
        assert_eq!(controller.cancel_download(), CancelOutcome::NoActiveTask);
        assert_eq!(controller.cancel_task(42), CancelOutcome::Stale);
    }

    #[tokio::test]
    async fn test_stale_id_does_not_cancel_live_task() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockMediaProvider::new();
        provider.expect_download().returning(|_, _, _| Ok(()));

        let (controller, _) = controller(provider);
        let first = controller
            .start_download("https://example.com/a", "", dir.path(), "a")
            .unwrap();
        first.wait().await;
        let second = controller
            .start_download("https://example.com/b", "", dir.path(), "b")
            .unwrap();

        assert_eq!(controller.cancel_task(first.id()), CancelOutcome::Stale);
        assert_eq!(second.wait().await.state, TaskState::Completed);
        assert_eq!(
            controller.cancel_task(second.id()),
            CancelOutcome::AlreadyFinished(second.id())
        );
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = DownloadController::new(
            Arc::new(MockMediaProvider::new()),
            Arc::new(NoopObserver),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
