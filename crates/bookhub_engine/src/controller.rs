use std::sync::Arc;

use bookhub_core::{Collection, ConvergenceTracker, HarvestSettings, Progress, Snapshot, Verdict};
use bookhub_logging::{bookhub_debug, bookhub_info, bookhub_warn};
use chrono::Utc;

use crate::{HarvestSource, ProgressDriver, SnapshotStore, SourceError};

/// Receives a progress notification after every harvest step.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn emit(&self, progress: Progress) {
        self(progress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Converged,
    /// Hit `max_iterations`; still a success.
    Capped,
    Failed(SourceError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed(_))
    }
}

/// Result of one controller run. The collection is kept even on failure.
#[derive(Debug, Clone)]
pub struct HarvestRun {
    pub collection: Collection,
    pub iterations: u32,
    pub idle_rounds: u32,
    pub outcome: RunOutcome,
}

/// Repeats [`ProgressDriver`] steps until idle rounds reach the tolerance,
/// the iteration cap is hit, or a step fails.
#[derive(Clone, Default)]
pub struct ConvergenceController {
    settings: HarvestSettings,
    sinks: Vec<Arc<dyn ProgressSink>>,
    checkpoints: Option<Arc<dyn SnapshotStore>>,
}

impl ConvergenceController {
    pub fn new(settings: HarvestSettings) -> Self {
        Self {
            settings,
            sinks: Vec::new(),
            checkpoints: None,
        }
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Write a snapshot after every step that added records.
    pub fn with_checkpoints(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub async fn run(&self, source: &dyn HarvestSource) -> HarvestRun {
        let driver = ProgressDriver::new(
            source,
            self.settings.interval(),
            self.settings.extent_epsilon,
        );
        let mut tracker = ConvergenceTracker::new(&self.settings);
        let mut collection = Collection::new();
        let mut verdict = Verdict::Capped;

        while tracker.can_step() {
            let iteration = tracker.next_iteration();
            let outcome = match driver.step(iteration, &mut collection).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    bookhub_warn!("harvest step {} failed: {}", iteration, err);
                    return HarvestRun {
                        collection,
                        iterations: tracker.iteration(),
                        idle_rounds: tracker.idle_rounds(),
                        outcome: RunOutcome::Failed(err),
                    };
                }
            };

            verdict = tracker.record(outcome);
            let progress = tracker.progress(collection.len());
            for sink in &self.sinks {
                sink.emit(progress);
            }
            if outcome.collection_changed {
                self.checkpoint(source, &collection).await;
            }
            if verdict != Verdict::Continue {
                break;
            }
        }

        if let Err(err) = source.scroll_to_start().await {
            bookhub_debug!("could not restore scroll position: {}", err);
        }

        let outcome = match verdict {
            Verdict::Converged => RunOutcome::Converged,
            Verdict::Capped | Verdict::Continue => RunOutcome::Capped,
        };
        bookhub_info!(
            "harvest finished {:?} after {} iterations: {} records",
            outcome,
            tracker.iteration(),
            collection.len()
        );
        HarvestRun {
            collection,
            iterations: tracker.iteration(),
            idle_rounds: tracker.idle_rounds(),
            outcome,
        }
    }

    async fn checkpoint(&self, source: &dyn HarvestSource, collection: &Collection) {
        let Some(store) = self.checkpoints.as_ref() else {
            return;
        };
        let snapshot = Snapshot::capture(collection, source.url(), Utc::now());
        if let Err(err) = store.write(&snapshot).await {
            bookhub_warn!("checkpoint snapshot not written: {}", err);
        }
    }
}
