use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: u32 = 180;
pub const DEFAULT_IDLE_TOLERANCE: u32 = 12;
pub const DEFAULT_INTERVAL_MS: u64 = 1500;
/// Extent growth below this is treated as sub-pixel jitter.
pub const DEFAULT_EXTENT_EPSILON: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    pub max_iterations: u32,
    pub idle_tolerance: u32,
    pub interval_ms: u64,
    pub extent_epsilon: f64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            idle_tolerance: DEFAULT_IDLE_TOLERANCE,
            interval_ms: DEFAULT_INTERVAL_MS,
            extent_epsilon: DEFAULT_EXTENT_EPSILON,
        }
    }
}

impl HarvestSettings {
    /// Settle time between revealing more content and re-extracting.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// What a single harvesting step observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    pub collection_changed: bool,
    pub extent_grew: bool,
}

impl StepOutcome {
    pub fn measure(
        records_before: usize,
        records_after: usize,
        extent_before: f64,
        extent_after: f64,
        epsilon: f64,
    ) -> Self {
        Self {
            collection_changed: records_after > records_before,
            extent_grew: extent_after > extent_before + epsilon,
        }
    }

    pub fn has_progress(&self) -> bool {
        self.collection_changed || self.extent_grew
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub iteration: u32,
    pub total_records: usize,
    pub idle_rounds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Idle rounds reached the tolerance.
    Converged,
    /// Iteration cap reached; a success that may be incomplete.
    Capped,
}

/// Iteration and idle-round bookkeeping for the harvest loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceTracker {
    max_iterations: u32,
    idle_tolerance: u32,
    iteration: u32,
    idle_rounds: u32,
}

impl ConvergenceTracker {
    pub fn new(settings: &HarvestSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            idle_tolerance: settings.idle_tolerance,
            iteration: 0,
            idle_rounds: 0,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn idle_rounds(&self) -> u32 {
        self.idle_rounds
    }

    /// Index the next step will run as (1-based).
    pub fn next_iteration(&self) -> u32 {
        self.iteration + 1
    }

    /// False once the cap is reached; a zero cap runs no steps at all.
    pub fn can_step(&self) -> bool {
        self.iteration < self.max_iterations
    }

    pub fn record(&mut self, outcome: StepOutcome) -> Verdict {
        self.iteration += 1;
        if outcome.has_progress() {
            self.idle_rounds = 0;
        } else {
            self.idle_rounds += 1;
        }

        if self.idle_rounds >= self.idle_tolerance {
            Verdict::Converged
        } else if self.iteration >= self.max_iterations {
            Verdict::Capped
        } else {
            Verdict::Continue
        }
    }

    pub fn progress(&self, total_records: usize) -> Progress {
        Progress {
            iteration: self.iteration,
            total_records,
            idle_rounds: self.idle_rounds,
        }
    }
}
