//! # phase-loop-trainer-rs
//!
//! A phase-scheduled training loop: alternates named phases of work
//! (typically "train" and "eval") over one shared, monotonically increasing
//! global step, with per-phase cadences for logging, score reporting, and
//! checkpointing. The loop survives process restarts mid-epoch, and in
//! multi-replica deployments gates all persistence behind a single chief
//! replica.
//!
//! ## Overview
//!
//! The loop itself computes nothing. A [`ComputeEngine`] executes one batch
//! of the active phase per iteration and advances the global step as a side
//! effect; the loop's job is to decide, for every iteration:
//!
//! - which phase is active and how far into it the run is (pure modular
//!   arithmetic over the step — no hidden counters);
//! - whether this batch should log a summary, report a score, or trigger a
//!   checkpoint (cadence predicates over the batch window);
//! - whether episode-local state must be reset (the previous batch crossed
//!   a phase boundary);
//! - whether this replica is even allowed to write (chief gating).
//!
//! Scores flow out through a lazy iterator, one value per report event,
//! until the step budget is exhausted.
//!
//! ```text
//!            ┌────────────────────────────────────────┐
//!            │                TrainLoop               │
//!            │  resolve(step) ─▶ phase, epoch, offset │
//!            │  signals ─▶ {reset, log, report}       │
//!            └──────┬──────────────────────▲──────────┘
//!                   │ feed + signals       │ score / step / summary
//!            ┌──────▼──────────────────────┴──────────┐
//!            │              ComputeEngine             │
//!            └────────────────────────────────────────┘
//!                   │ chief only
//!            ┌──────▼──────────┐   ┌──────────────────┐
//!            │ CheckpointManager│  │  SummaryWriter   │
//!            └─────────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use phase_loop_trainer_rs::prelude::*;
//!
//! let schedule = PhaseSchedule::builder()
//!     .phase("train", 1000, |p| {
//!         p.batch_size(25)
//!             .report_every(1000)
//!             .log_every(500)
//!             .feed("is_training", FeedValue::Bool(true))
//!     })
//!     .phase("eval", 250, |p| {
//!         p.batch_size(25)
//!             .report_every(250)
//!             .checkpoint_every(2500)
//!             .feed("is_training", FeedValue::Bool(false))
//!     })
//!     .build()?;
//!
//! let config = LoopConfig::builder()
//!     .total_steps(50_000)
//!     .checkpoint_dir("run/checkpoints")
//!     .build();
//!
//! let mut train_loop = TrainLoop::new(engine, schedule, config)?;
//! for score in train_loop.scores() {
//!     println!("score: {}", score?);
//! }
//! ```
//!
//! ## Restart semantics
//!
//! The global step is the only persisted scheduling state. On startup the
//! loop restores the latest checkpoint (if any), hands the engine its state
//! blob, and resumes at exactly the checkpointed step — which may land
//! mid-phase. Because phase, offset, and signals are pure functions of the
//! step, a resumed run emits the same sequence as an uninterrupted one,
//! including the reset at the next phase boundary that reinitializes the
//! episode-local environment state a restore cannot carry over.
//!
//! ## Distributed runs
//!
//! Every replica runs its own loop over the same step sequence (the
//! engine's aggregation keeps counters in lockstep), so decisions agree
//! without coordination. Only the chief writes checkpoints and summaries;
//! see [`cluster`].

pub mod cadence;
pub mod checkpoint;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod phases;
pub mod state;
pub mod summary;

pub use checkpoint::{CheckpointManager, CheckpointMetadata, TrainingCheckpoint};
pub use cluster::{ReplicaRole, SingleProcess, StaticCluster};
pub use config::LoopConfig;
pub use engine::{BatchOutcome, ComputeEngine};
pub use error::{LoopResult, TrainLoopError};
pub use phases::{Feed, FeedValue, Phase, PhaseSchedule, PhaseSignals, Resolved};
pub use state::{LoopStats, RunState};
pub use summary::{JsonlSummaryWriter, Summary, SummaryWriter};

/// Commonly used types, for glob import in binaries and tests.
pub mod prelude {
    pub use crate::checkpoint::{CheckpointManager, TrainingCheckpoint};
    pub use crate::cluster::{ReplicaRole, SingleProcess, StaticCluster};
    pub use crate::config::LoopConfig;
    pub use crate::engine::{BatchOutcome, ComputeEngine};
    pub use crate::error::{LoopResult, TrainLoopError};
    pub use crate::phases::{Feed, FeedValue, PhaseSchedule, PhaseSignals};
    pub use crate::state::{LoopStats, RunState};
    pub use crate::summary::{JsonlSummaryWriter, Summary, SummaryWriter};
    pub use crate::TrainLoop;
}

/// The driver loop: schedules phases and streams scores.
///
/// Construction restores the latest checkpoint when a checkpoint directory
/// is configured, so a crashed process picks up exactly where the chief
/// last persisted. Iteration happens through [`TrainLoop::scores`].
#[derive(Debug)]
pub struct TrainLoop<E, R = SingleProcess> {
    engine: E,
    schedule: PhaseSchedule,
    config: LoopConfig,
    role: R,
    checkpoint_manager: Option<CheckpointManager>,
    run_state: RunState,
    stats: LoopStats,
    global_step: u64,
    /// Steps advanced by the previous batch. Starts at 1 so the first
    /// iteration raises the reset signal exactly when it begins at a phase
    /// boundary: always for a fresh run, and after a restore only when the
    /// checkpointed step landed on one.
    steps_made: u64,
}

impl<E: ComputeEngine> TrainLoop<E, SingleProcess> {
    /// Creates a single-process loop (always chief).
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid [`LoopConfig`], a
    /// checkpoint error if the checkpoint directory is unusable, or a
    /// resume error if a restored checkpoint is inconsistent.
    pub fn new(engine: E, schedule: PhaseSchedule, config: LoopConfig) -> LoopResult<Self> {
        Self::with_role(engine, schedule, config, SingleProcess)
    }
}

impl<E: ComputeEngine, R: ReplicaRole> TrainLoop<E, R> {
    /// Creates a loop with an explicit replica role.
    ///
    /// All replicas restore from the shared checkpoint directory; only the
    /// chief will ever write to it.
    ///
    /// # Errors
    ///
    /// Same as [`TrainLoop::new`].
    pub fn with_role(
        engine: E,
        schedule: PhaseSchedule,
        config: LoopConfig,
        role: R,
    ) -> LoopResult<Self> {
        config.validate()?;

        let checkpoint_manager = match &config.checkpoint_dir {
            Some(dir) => Some(CheckpointManager::new(dir, config.keep_last_n)?),
            None => None,
        };

        let mut this = Self {
            engine,
            schedule,
            config,
            role,
            checkpoint_manager,
            run_state: RunState::Running,
            stats: LoopStats::default(),
            global_step: 0,
            steps_made: 1,
        };
        this.restore_latest()?;
        this.global_step = this.engine.global_step();
        this.stats.global_step = this.global_step;
        Ok(this)
    }

    fn restore_latest(&mut self) -> LoopResult<()> {
        let Some(manager) = &self.checkpoint_manager else {
            return Ok(());
        };
        let Some(checkpoint) = manager.load_latest()? else {
            return Ok(());
        };

        self.engine
            .import_state(&checkpoint.engine_state, checkpoint.step)?;
        let engine_step = self.engine.global_step();
        if engine_step != checkpoint.step {
            return Err(TrainLoopError::ResumeInconsistency {
                step: checkpoint.step,
                detail: format!("engine reports step {engine_step} after restore"),
            });
        }
        tracing::info!(
            step = checkpoint.step,
            path = %manager
                .latest_checkpoint_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "resumed from checkpoint"
        );
        Ok(())
    }

    /// Returns the lazy score stream.
    ///
    /// Each item is one report event's mean score. The stream ends when the
    /// total step budget is reached; the budget check before each iteration
    /// is the loop's only cancellation point, so a batch in flight always
    /// completes. An engine failure is yielded as an `Err` and terminates
    /// the stream after cleanup.
    pub fn scores(&mut self) -> Scores<'_, E, R> {
        Scores { train_loop: self }
    }

    /// Requests a cooperative stop before the next iteration.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Running {
            self.run_state = RunState::Stopping;
        }
    }

    /// Returns the current driver state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Returns the run counters.
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Returns the global step as of the latest batch.
    #[must_use]
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Returns the name of the phase the current step falls into.
    #[must_use]
    pub fn current_phase_name(&self) -> &str {
        let resolved = self.schedule.resolve(self.global_step);
        self.schedule.phase(resolved.phase_index).name()
    }

    /// Returns the registered schedule.
    #[must_use]
    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Returns the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Executes one iteration: resolve, run, persist, record.
    ///
    /// Returns the mean score when this was a report iteration.
    fn iterate(&mut self) -> LoopResult<Option<f32>> {
        let resolved = self.schedule.resolve(self.global_step);
        let signals = self.schedule.signals(resolved, self.steps_made);
        let checkpoint_due = self.schedule.checkpoint_due(resolved);
        let phase = self.schedule.phase(resolved.phase_index);

        if signals.reset {
            // Banner on phase entry, in phase-local step terms.
            let phase_step = self.schedule.phase_step(resolved);
            tracing::info!(
                phase = phase.name(),
                phase_step,
                global_step = self.global_step,
                "entering phase"
            );
        }

        let outcome = self.engine.run_batch(phase.feed(), signals)?;
        if outcome.global_step < self.global_step {
            return Err(TrainLoopError::EngineContract {
                detail: format!(
                    "global step went backwards: {} -> {}",
                    self.global_step, outcome.global_step
                ),
            });
        }
        if outcome.steps_made == 0 {
            return Err(TrainLoopError::EngineContract {
                detail: "batch made no progress (steps_made == 0)".to_string(),
            });
        }

        self.global_step = outcome.global_step;
        self.steps_made = outcome.steps_made;
        self.stats.global_step = outcome.global_step;
        self.stats.iterations += 1;
        self.stats.last_score = Some(outcome.mean_score);

        if checkpoint_due && self.role.is_chief() {
            self.store_checkpoint();
        }

        if let Some(summary) = &outcome.summary {
            self.record_summary(resolved, summary);
        }

        if signals.should_report {
            self.stats.reports += 1;
            return Ok(Some(outcome.mean_score));
        }
        Ok(None)
    }

    /// Persists a checkpoint at the current step.
    ///
    /// Write failures are logged and skipped: losing one checkpoint is
    /// recoverable, aborting the run mid-training is not.
    fn store_checkpoint(&mut self) {
        let Some(manager) = &mut self.checkpoint_manager else {
            return;
        };
        let checkpoint = match self.engine.export_state() {
            Ok(engine_state) => TrainingCheckpoint::new(self.global_step, engine_state),
            Err(e) => {
                tracing::warn!(error = %e, "skipping checkpoint: state export failed");
                return;
            }
        };
        match manager.save(&checkpoint) {
            Ok(path) => {
                self.stats.checkpoints_written += 1;
                tracing::info!(step = checkpoint.step, path = %path.display(), "saved checkpoint");
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping checkpoint: save failed");
            }
        }
    }

    /// Records a summary on the phase's writer, chief only.
    ///
    /// The write step aligns unequal-length phases: shorter phases catch up
    /// at the beginning of each epoch so their curves stay comparable.
    fn record_summary(&mut self, resolved: Resolved, summary: &Summary) {
        if !self.config.log_summaries || !self.role.is_chief() {
            return;
        }
        let summary_step = resolved.epoch * self.schedule.longest_phase() + resolved.steps_into_phase;
        let phase = self.schedule.phase_mut(resolved.phase_index);
        let Some(writer) = phase.writer_mut() else {
            return;
        };
        match writer.write(summary, summary_step) {
            Ok(()) => self.stats.summaries_written += 1,
            Err(e) => {
                tracing::warn!(error = %e, step = summary_step, "skipping summary write");
            }
        }
    }

    /// Final cleanup: close the engine and flush writers.
    fn shutdown(&mut self) {
        if let Err(e) = self.engine.close() {
            tracing::warn!(error = %e, "engine close failed");
        }
        for phase in 0..self.schedule.phases().len() {
            if let Some(writer) = self.schedule.phase_mut(phase).writer_mut() {
                if let Err(e) = writer.flush() {
                    tracing::warn!(error = %e, "summary flush failed");
                }
            }
        }
        self.run_state = RunState::Stopped;
        tracing::info!(
            global_step = self.global_step,
            reports = self.stats.reports,
            "training loop stopped"
        );
    }
}

/// Lazy score stream over a running loop.
///
/// Created by [`TrainLoop::scores`]. Yields one `LoopResult<f32>` per
/// report event; driving it forward executes iterations.
pub struct Scores<'a, E, R> {
    train_loop: &'a mut TrainLoop<E, R>,
}

impl<E: ComputeEngine, R: ReplicaRole> Iterator for Scores<'_, E, R> {
    type Item = LoopResult<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        let this = &mut *self.train_loop;
        loop {
            match this.run_state {
                RunState::Stopped => return None,
                RunState::Stopping => {
                    this.shutdown();
                    return None;
                }
                RunState::Running => {}
            }
            if this.global_step >= this.config.total_steps {
                this.run_state = RunState::Stopping;
                continue;
            }
            match this.iterate() {
                Ok(Some(score)) => return Some(Ok(score)),
                Ok(None) => {}
                Err(e) => {
                    // The failed iteration is over; stop rather than retry.
                    // Clean up now — the caller may drop the stream after
                    // seeing the error instead of polling again.
                    this.run_state = RunState::Stopping;
                    this.shutdown();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<E: ComputeEngine, R: ReplicaRole> std::iter::FusedIterator for Scores<'_, E, R> {}
