//! Compute-engine seam.
//!
//! The loop never computes gradients, steps environments, or talks to
//! devices. All of that lives behind [`ComputeEngine`]: one call executes
//! one batch of the active phase and advances the global step as a side
//! effect. The loop only schedules — it decides which phase's feed and
//! signals to pass in, and interprets the outcome.
//!
//! # Contract
//!
//! - The engine owns the global step counter. `global_step` returned from
//!   [`ComputeEngine::run_batch`] must be non-decreasing across calls, and
//!   each call must advance it by at least one step. The loop enforces both
//!   and fails loudly on violations.
//! - In a multi-replica deployment, the engine also owns gradient
//!   aggregation and barriers; replicas must all observe the same sequence
//!   of counter values so every replica's schedule resolves identically.
//! - `export_state`/`import_state` carry the algorithm state (weights,
//!   optimizer slots, whatever the engine needs to resume exactly) as an
//!   opaque byte blob through checkpoints. Episode-local environment state
//!   is deliberately excluded: the reset signal reinitializes it after a
//!   restore, matching what the signals promise.

use serde::{Deserialize, Serialize};

use crate::error::LoopResult;
use crate::phases::{Feed, PhaseSignals};
use crate::summary::Summary;

/// Result of executing one batch of a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Summary produced when `should_log` was set and the engine had
    /// something to record. `None` otherwise.
    pub summary: Option<Summary>,
    /// Mean score of the batch (e.g. mean episode return).
    pub mean_score: f32,
    /// The global step counter after this batch.
    pub global_step: u64,
    /// How many steps this call advanced the counter.
    pub steps_made: u64,
}

/// Executes units of work for the training loop.
pub trait ComputeEngine {
    /// Runs one batch of the active phase.
    ///
    /// `feed` is the phase's registered parameters; `signals` carries the
    /// per-iteration reset/log/report flags.
    ///
    /// # Errors
    ///
    /// Any failure propagates to the loop and stops the run; the engine is
    /// responsible for its own internal retries.
    fn run_batch(&mut self, feed: &Feed, signals: PhaseSignals) -> LoopResult<BatchOutcome>;

    /// Returns the current value of the global step counter.
    fn global_step(&self) -> u64;

    /// Serializes the algorithm state for checkpointing.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    fn export_state(&self) -> LoopResult<Vec<u8>>;

    /// Restores algorithm state from a checkpoint blob.
    ///
    /// After a successful import, `global_step()` must report `step`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be applied.
    fn import_state(&mut self, state: &[u8], step: u64) -> LoopResult<()>;

    /// Releases external resources (environment processes, device handles).
    ///
    /// Called once when the loop shuts down. Default is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails; the loop logs and ignores it.
    fn close(&mut self) -> LoopResult<()> {
        Ok(())
    }
}
