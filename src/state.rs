//! Run bookkeeping: driver state machine and observable counters.
//!
//! The loop holds no scheduling state between iterations — phase and
//! signals are re-derived from the global step every time. What it does
//! track is the driver state machine and a small set of counters useful for
//! monitoring a long run (how many reports, checkpoints, summaries so far).

use serde::{Deserialize, Serialize};

/// Driver loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Iterating: the step budget is not yet exhausted.
    Running,
    /// Budget reached (or stop requested); cleanup in progress.
    Stopping,
    /// Cleanup done; the score stream is exhausted.
    Stopped,
}

/// Observable counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Global step as of the latest batch.
    pub global_step: u64,
    /// Batches executed by this process (not counting restored progress).
    pub iterations: u64,
    /// Scores yielded to the caller.
    pub reports: u64,
    /// Checkpoints written by this replica.
    pub checkpoints_written: u64,
    /// Summaries recorded by this replica.
    pub summaries_written: u64,
    /// Most recent mean score, if any batch has run.
    pub last_score: Option<f32>,
}
