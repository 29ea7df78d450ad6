//! Error types for the phase-scheduled training loop.
//!
//! Errors fall into three behavioral classes, matching how the driver
//! treats them:
//!
//! - **Fatal at startup**: configuration and resume errors abort before any
//!   work starts. A misconfigured schedule or a corrupt checkpoint is not
//!   something the loop can run through.
//! - **Propagated**: compute-engine failures surface to the caller through
//!   the score stream and stop the loop. Retries, if any, belong to the
//!   engine, not the scheduler.
//! - **Transient**: checkpoint and summary write failures mid-run are logged
//!   and skipped. Losing one checkpoint is recoverable; aborting a long
//!   training run over it is not.

use thiserror::Error;

/// The error type for all training-loop operations.
#[derive(Debug, Error)]
pub enum TrainLoopError {
    /// Invalid configuration, detected at registration or validation time.
    ///
    /// Covers zero-length epochs, duplicate phase names, non-positive step
    /// budgets or batch sizes, and zero-valued cadences.
    #[error("invalid configuration: {detail}")]
    Config {
        /// Description of the validation failure.
        detail: String,
    },

    /// A restored checkpoint is inconsistent with the running process.
    ///
    /// Raised when the engine's counter disagrees with the checkpointed step
    /// after restore. Modular phase resolution cannot itself fail, so this
    /// indicates corrupted or mismatched persisted state.
    #[error("cannot resume from checkpoint at step {step}: {detail}")]
    ResumeInconsistency {
        /// The step recorded in the checkpoint.
        step: u64,
        /// Description of the inconsistency.
        detail: String,
    },

    /// Checkpoint persistence failed (I/O or serialization).
    #[error("checkpoint error: {reason}")]
    Checkpoint {
        /// Description of the failure.
        reason: String,
    },

    /// A summary sink rejected a write.
    #[error("summary write error: {reason}")]
    Summary {
        /// Description of the failure.
        reason: String,
    },

    /// The compute engine failed while executing a batch.
    #[error("compute engine failure: {reason}")]
    Engine {
        /// Description of the failure, as reported by the engine.
        reason: String,
    },

    /// The compute engine violated its contract.
    ///
    /// The global step must be non-decreasing across calls and every call
    /// must make at least one step of progress.
    #[error("compute engine contract violation: {detail}")]
    EngineContract {
        /// Description of the violated contract clause.
        detail: String,
    },
}

impl TrainLoopError {
    /// Convenience constructor for configuration errors.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Convenience constructor for engine failures.
    pub fn engine(reason: impl Into<String>) -> Self {
        Self::Engine {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type LoopResult<T> = Result<T, TrainLoopError>;
