use std::time::Duration;

use bookhub_core::{Collection, StepOutcome};
use bookhub_logging::bookhub_debug;

use crate::{HarvestSource, SourceError};

/// Performs single harvesting steps against a source.
pub struct ProgressDriver<'a> {
    source: &'a dyn HarvestSource,
    settle: Duration,
    epsilon: f64,
}

impl<'a> ProgressDriver<'a> {
    pub fn new(source: &'a dyn HarvestSource, settle: Duration, epsilon: f64) -> Self {
        Self {
            source,
            settle,
            epsilon,
        }
    }

    /// Reveal more, wait for rendering, re-extract and merge into `collection`.
    ///
    /// Source errors are returned as-is; the caller owns the retry policy.
    pub async fn step(
        &self,
        iteration: u32,
        collection: &mut Collection,
    ) -> Result<StepOutcome, SourceError> {
        let extent_before = self.source.extent().await?;
        let records_before = collection.len();

        self.source.reveal_more().await?;
        tokio::time::sleep(self.settle).await;

        let candidates = self.source.extract().await?;
        let candidate_count = candidates.len();
        // Nothing is merged until every fallible read of this step has succeeded.
        let extent_after = self.source.extent().await?;
        collection.absorb(candidates);

        let outcome = StepOutcome::measure(
            records_before,
            collection.len(),
            extent_before,
            extent_after,
            self.epsilon,
        );
        bookhub_debug!(
            "step {} candidates={} total={} extent {} -> {} progress={}",
            iteration,
            candidate_count,
            collection.len(),
            extent_before,
            extent_after,
            outcome.has_progress()
        );
        Ok(outcome)
    }
}
