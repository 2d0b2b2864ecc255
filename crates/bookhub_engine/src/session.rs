use std::sync::{Arc, Mutex, MutexGuard};

use bookhub_core::{
    Collection, HarvestSettings, Progress, Record, SessionState, SessionStatus, Snapshot,
    SyncFinished,
};
use bookhub_logging::{bookhub_error, bookhub_info, bookhub_warn};
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::{
    ConvergenceController, HarvestRun, HarvestSource, ProgressSink, RunOutcome, SnapshotStore,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SessionError {
    pub message: String,
}

impl SessionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type SessionResult = Result<Vec<Record>, SessionError>;

/// Awaitable handle on a session run; clones resolve to the same result.
pub type SyncHandle = Shared<BoxFuture<'static, SessionResult>>;

/// Told once when a session run ends.
#[async_trait::async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, finished: SyncFinished);
}

#[derive(Default)]
struct SessionInner {
    status: SessionStatus,
    collection: Collection,
    in_flight: Option<SyncHandle>,
}

/// Guards a source against concurrent harvest loops and tracks the run state.
#[derive(Clone)]
pub struct SyncSession {
    inner: Arc<Mutex<SessionInner>>,
    source: Arc<dyn HarvestSource>,
    store: Arc<dyn SnapshotStore>,
    settings: HarvestSettings,
    sinks: Vec<Arc<dyn ProgressSink>>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    auto_close: Option<bool>,
}

impl SyncSession {
    pub fn new(
        source: Arc<dyn HarvestSource>,
        store: Arc<dyn SnapshotStore>,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner::default())),
            source,
            store,
            settings,
            sinks: Vec::new(),
            notifier: None,
            auto_close: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Report the end of every run, asking the receiver to close this surface or not.
    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn CompletionNotifier>,
        auto_close: Option<bool>,
    ) -> Self {
        self.notifier = Some(notifier);
        self.auto_close = auto_close;
        self
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).status.state
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.inner).status.clone()
    }

    /// Records of the current or last run; partial after a failure.
    pub fn collection(&self) -> Collection {
        lock(&self.inner).collection.clone()
    }

    /// Starts a run, or returns the in-flight one while the session is Running.
    ///
    /// The run is spawned onto the current tokio runtime, so it completes
    /// even when every handle is dropped.
    pub fn start(&self) -> SyncHandle {
        let mut inner = lock(&self.inner);
        if inner.status.state == SessionState::Running {
            if let Some(handle) = inner.in_flight.as_ref() {
                bookhub_info!("sync already running; joining the in-flight session");
                return handle.clone();
            }
        }

        inner.status = SessionStatus {
            state: SessionState::Running,
            ..SessionStatus::default()
        };
        inner.collection = Collection::new();

        let session = self.clone();
        let task = tokio::spawn(async move { session.run().await });
        let handle: SyncHandle = async move {
            task.await
                .unwrap_or_else(|err| Err(SessionError::new(format!("sync task aborted: {err}"))))
        }
        .boxed()
        .shared();
        inner.in_flight = Some(handle.clone());
        handle
    }

    async fn run(self) -> SessionResult {
        bookhub_info!("sync started for {}", self.source.url());
        let tracker = Arc::new(StatusSink {
            inner: self.inner.clone(),
        });
        let mut controller = ConvergenceController::new(self.settings)
            .with_sink(tracker)
            .with_checkpoints(self.store.clone());
        for sink in &self.sinks {
            controller = controller.with_sink(sink.clone());
        }

        let run = controller.run(self.source.as_ref()).await;
        let total = run.collection.len();

        let result = match run.outcome {
            RunOutcome::Converged | RunOutcome::Capped => {
                let snapshot = Snapshot::capture(&run.collection, self.source.url(), Utc::now());
                if let Err(err) = self.store.write(&snapshot).await {
                    bookhub_error!("final snapshot not written: {}", err);
                }
                self.finish(SessionState::Succeeded, run.collection.clone(), None, &run);
                bookhub_info!("sync succeeded with {} records", total);
                Ok(run.collection.into_records())
            }
            RunOutcome::Failed(ref err) => {
                let message = err.to_string();
                self.finish(
                    SessionState::Failed,
                    run.collection.clone(),
                    Some(message.clone()),
                    &run,
                );
                bookhub_warn!("sync failed after {} records: {}", total, message);
                Err(SessionError::new(message))
            }
        };

        if let Some(notifier) = self.notifier.as_ref() {
            let finished = match &result {
                Ok(records) => SyncFinished::succeeded(records.len()),
                Err(err) => SyncFinished::failed(err.message.clone()),
            };
            notifier
                .notify(finished.with_auto_close(self.auto_close))
                .await;
        }
        result
    }

    fn finish(
        &self,
        state: SessionState,
        collection: Collection,
        error: Option<String>,
        run: &HarvestRun,
    ) {
        let mut inner = lock(&self.inner);
        inner.status = SessionStatus {
            state,
            iteration: run.iterations,
            idle_rounds: run.idle_rounds,
            total: collection.len(),
            error,
        };
        inner.collection = collection;
    }
}

struct StatusSink {
    inner: Arc<Mutex<SessionInner>>,
}

impl ProgressSink for StatusSink {
    fn emit(&self, progress: Progress) {
        let mut inner = lock(&self.inner);
        inner.status.iteration = progress.iteration;
        inner.status.idle_rounds = progress.idle_rounds;
        inner.status.total = progress.total_records;
    }
}

fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    // Status bookkeeping stays usable even if an observer panicked mid-update.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
