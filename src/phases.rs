//! Phase registration and schedule resolution.
//!
//! A training run is organized as repeated epochs, each visiting an ordered
//! list of named phases (typically "train" then "eval") exactly once. Every
//! phase carries its own step budget, batch size, and cadences for logging,
//! reporting, and checkpointing. The schedule holds no mutable state of its
//! own: which phase is active, how deep into it the run is, and which
//! signals fire this iteration are all pure functions of the externally
//! advanced global step. That purity is what makes resume-from-checkpoint
//! exact — a process restarted at step S derives the same phase, offset, and
//! signal sequence as one that reached S without interruption.
//!
//! # Example
//!
//! ```rust
//! use phase_loop_trainer_rs::phases::{FeedValue, PhaseSchedule};
//!
//! let schedule = PhaseSchedule::builder()
//!     .phase("train", 100, |p| {
//!         p.batch_size(5)
//!             .report_every(100)
//!             .log_every(50)
//!             .feed("is_training", FeedValue::Bool(true))
//!     })
//!     .phase("eval", 20, |p| {
//!         p.batch_size(5)
//!             .report_every(20)
//!             .checkpoint_every(200)
//!             .feed("is_training", FeedValue::Bool(false))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let resolved = schedule.resolve(100);
//! assert_eq!(schedule.phase(resolved.phase_index).name(), "eval");
//! assert_eq!(resolved.epoch, 0);
//! assert_eq!(resolved.steps_into_phase, 0);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cadence;
use crate::error::{LoopResult, TrainLoopError};
use crate::summary::SummaryWriter;

/// A value passed to the compute engine through a phase's feed.
///
/// The original design threaded these through a mutable feed dictionary;
/// here they are plain data cloned into each batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedValue {
    /// Boolean flag (e.g. training-mode switch).
    Bool(bool),
    /// Integer parameter.
    Int(i64),
    /// Floating-point parameter.
    Float(f64),
    /// Free-form text parameter.
    Text(String),
}

/// Per-phase configuration passed into each unit of work.
///
/// A `BTreeMap` keeps iteration order deterministic across replicas.
pub type Feed = BTreeMap<String, FeedValue>;

/// Control signals computed for one iteration and handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSignals {
    /// The previous unit of work ended a different phase or epoch; any
    /// episode-local state must be reinitialized.
    pub reset: bool,
    /// The engine should emit a summary this batch.
    pub should_log: bool,
    /// The engine's mean score will be reported to the caller this batch.
    pub should_report: bool,
}

/// A named stretch of work with its own step budget and cadences.
pub struct Phase {
    name: String,
    steps: u64,
    batch_size: u64,
    report_every: Option<u64>,
    log_every: Option<u64>,
    checkpoint_every: Option<u64>,
    feed: Feed,
    writer: Option<Box<dyn SummaryWriter>>,
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("batch_size", &self.batch_size)
            .field("report_every", &self.report_every)
            .field("log_every", &self.log_every)
            .field("checkpoint_every", &self.checkpoint_every)
            .field("feed", &self.feed)
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

impl Phase {
    /// Returns the phase name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the per-epoch step budget.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns the number of steps one unit of work advances the counter.
    #[must_use]
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Returns the feed parameters passed to every batch of this phase.
    #[must_use]
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Returns whether this phase records summaries.
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    pub(crate) fn writer_mut(&mut self) -> Option<&mut Box<dyn SummaryWriter>> {
        self.writer.as_mut()
    }
}

/// Builder for a single phase inside [`PhaseScheduleBuilder::phase`].
pub struct PhaseBuilder {
    name: String,
    steps: u64,
    batch_size: u64,
    report_every: Option<u64>,
    log_every: Option<u64>,
    checkpoint_every: Option<u64>,
    feed: Feed,
    writer: Option<Box<dyn SummaryWriter>>,
}

impl PhaseBuilder {
    fn new(name: &str, steps: u64) -> Self {
        Self {
            name: name.to_string(),
            steps,
            batch_size: 1,
            report_every: None,
            log_every: None,
            checkpoint_every: None,
            feed: Feed::new(),
            writer: None,
        }
    }

    /// Sets how many steps each unit of work advances the counter.
    #[must_use]
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Reports the mean score every `every` phase steps.
    #[must_use]
    pub fn report_every(mut self, every: u64) -> Self {
        self.report_every = Some(every);
        self
    }

    /// Requests an engine summary every `every` phase steps.
    #[must_use]
    pub fn log_every(mut self, every: u64) -> Self {
        self.log_every = Some(every);
        self
    }

    /// Persists a checkpoint every `every` phase steps (chief only).
    #[must_use]
    pub fn checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = Some(every);
        self
    }

    /// Adds a feed parameter passed into every batch of this phase.
    #[must_use]
    pub fn feed(mut self, key: impl Into<String>, value: FeedValue) -> Self {
        self.feed.insert(key.into(), value);
        self
    }

    /// Attaches a summary sink. Phases without one silently skip summary
    /// emission and never set `should_log`.
    #[must_use]
    pub fn writer(mut self, writer: Box<dyn SummaryWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    fn build(self) -> LoopResult<Phase> {
        if self.name.is_empty() {
            return Err(TrainLoopError::config("phase name must be non-empty"));
        }
        if self.steps == 0 {
            return Err(TrainLoopError::config(format!(
                "phase '{}' must have a positive step budget",
                self.name
            )));
        }
        if self.batch_size == 0 {
            return Err(TrainLoopError::config(format!(
                "phase '{}' must have a positive batch size",
                self.name
            )));
        }
        for (label, every) in [
            ("report_every", self.report_every),
            ("log_every", self.log_every),
            ("checkpoint_every", self.checkpoint_every),
        ] {
            if every == Some(0) {
                return Err(TrainLoopError::config(format!(
                    "phase '{}': {label} must be positive (omit it to disable)",
                    self.name
                )));
            }
        }
        Ok(Phase {
            name: self.name,
            steps: self.steps,
            batch_size: self.batch_size,
            report_every: self.report_every,
            log_every: self.log_every,
            checkpoint_every: self.checkpoint_every,
            feed: self.feed,
            writer: self.writer,
        })
    }
}

/// A phase resolved from a global step value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Index into the schedule's phase list.
    pub phase_index: usize,
    /// Which repetition of the schedule this step falls in.
    pub epoch: u64,
    /// Offset within the phase, always in `[0, phase.steps)`.
    pub steps_into_phase: u64,
}

/// An immutable, ordered list of phases with pure resolution operations.
///
/// Registered once at startup via [`PhaseSchedule::builder`]; validation
/// failures (empty schedule, duplicate names, zero budgets or batch sizes,
/// zero cadences) are fatal configuration errors raised at `build()` time,
/// never per-iteration.
pub struct PhaseSchedule {
    phases: Vec<Phase>,
    epoch_length: u64,
    longest_phase: u64,
}

impl std::fmt::Debug for PhaseSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSchedule")
            .field("phases", &self.phases)
            .field("epoch_length", &self.epoch_length)
            .finish()
    }
}

impl PhaseSchedule {
    /// Creates a new schedule builder.
    #[must_use]
    pub fn builder() -> PhaseScheduleBuilder {
        PhaseScheduleBuilder::default()
    }

    /// Returns the phase at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; indices come from [`Resolved`],
    /// which only produces valid ones.
    #[must_use]
    pub fn phase(&self, index: usize) -> &Phase {
        &self.phases[index]
    }

    pub(crate) fn phase_mut(&mut self, index: usize) -> &mut Phase {
        &mut self.phases[index]
    }

    /// Returns the registered phases in order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Returns the total step budget of one epoch.
    #[must_use]
    pub fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    /// Returns the largest per-phase step budget.
    ///
    /// Used to align summary steps of unequal-length phases across epochs:
    /// shorter phases catch up at the start of each epoch so their curves
    /// stay comparable.
    #[must_use]
    pub fn longest_phase(&self) -> u64 {
        self.longest_phase
    }

    /// Resolves which phase a global step falls into.
    ///
    /// Pure in `global_step`: any step value, including ones far beyond the
    /// configured budget, maps to a valid phase and offset.
    #[must_use]
    pub fn resolve(&self, global_step: u64) -> Resolved {
        let epoch = global_step / self.epoch_length;
        let mut offset = global_step % self.epoch_length;
        for (phase_index, phase) in self.phases.iter().enumerate() {
            if offset < phase.steps {
                return Resolved {
                    phase_index,
                    epoch,
                    steps_into_phase: offset,
                };
            }
            offset -= phase.steps;
        }
        // offset < epoch_length = sum of phase budgets, so the walk above
        // always terminates inside some phase.
        unreachable!("global step {global_step} not covered by any phase");
    }

    /// Returns the cumulative phase step: how many steps this phase has run
    /// across all epochs so far.
    ///
    /// Cadences are measured against this value rather than the per-epoch
    /// offset, so an interval longer than the phase itself (say, a
    /// checkpoint every tenth eval pass) fires on schedule instead of every
    /// epoch.
    #[must_use]
    pub fn phase_step(&self, resolved: Resolved) -> u64 {
        let phase = &self.phases[resolved.phase_index];
        resolved.epoch * phase.steps + resolved.steps_into_phase
    }

    /// Computes the control signals for one iteration.
    ///
    /// `steps_made` is how many steps the previous unit of work advanced the
    /// counter; the reset signal fires exactly when that advance crossed a
    /// phase boundary.
    #[must_use]
    pub fn signals(&self, resolved: Resolved, steps_made: u64) -> PhaseSignals {
        let phase = &self.phases[resolved.phase_index];
        let phase_step = self.phase_step(resolved);
        PhaseSignals {
            reset: resolved.steps_into_phase < steps_made,
            should_log: phase.writer.is_some()
                && cadence::is_due(phase_step, phase.batch_size, phase.log_every),
            should_report: cadence::is_due(phase_step, phase.batch_size, phase.report_every),
        }
    }

    /// Returns whether a checkpoint is due at this point of the phase.
    ///
    /// The caller must additionally gate the actual write on being the chief
    /// replica.
    #[must_use]
    pub fn checkpoint_due(&self, resolved: Resolved) -> bool {
        let phase = &self.phases[resolved.phase_index];
        cadence::is_due(
            self.phase_step(resolved),
            phase.batch_size,
            phase.checkpoint_every,
        )
    }
}

/// Builder collecting phases in registration order.
#[derive(Default)]
pub struct PhaseScheduleBuilder {
    phases: Vec<LoopResult<Phase>>,
}

impl PhaseScheduleBuilder {
    /// Registers a phase with the given name and per-epoch step budget.
    ///
    /// The closure configures batch size, cadences, feed, and writer;
    /// defaults are batch size 1 and all cadences disabled.
    #[must_use]
    pub fn phase(
        mut self,
        name: &str,
        steps: u64,
        configure: impl FnOnce(PhaseBuilder) -> PhaseBuilder,
    ) -> Self {
        self.phases
            .push(configure(PhaseBuilder::new(name, steps)).build());
        self
    }

    /// Validates and finalizes the schedule.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty schedule, duplicate phase
    /// names, or any invalid phase parameter.
    pub fn build(self) -> LoopResult<PhaseSchedule> {
        let phases: Vec<Phase> = self
            .phases
            .into_iter()
            .collect::<LoopResult<Vec<Phase>>>()?;
        if phases.is_empty() {
            return Err(TrainLoopError::config(
                "schedule must register at least one phase",
            ));
        }
        for (i, phase) in phases.iter().enumerate() {
            if phases[..i].iter().any(|p| p.name == phase.name) {
                return Err(TrainLoopError::config(format!(
                    "duplicate phase name '{}'",
                    phase.name
                )));
            }
        }
        let epoch_length = phases.iter().map(|p| p.steps).sum();
        let longest_phase = phases.iter().map(|p| p.steps).max().unwrap_or(0);
        // Positive per-phase budgets make a zero epoch impossible here, but
        // the invariant is load-bearing enough to assert on its own.
        if epoch_length == 0 {
            return Err(TrainLoopError::config("epoch length must be positive"));
        }
        Ok(PhaseSchedule {
            phases,
            epoch_length,
            longest_phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_eval() -> PhaseSchedule {
        PhaseSchedule::builder()
            .phase("train", 100, |p| p.batch_size(5).report_every(100))
            .phase("eval", 20, |p| p.batch_size(5).report_every(20))
            .build()
            .unwrap()
    }

    #[test]
    fn epoch_coverage() {
        let schedule = train_eval();
        assert_eq!(schedule.epoch_length(), 120);

        let r = schedule.resolve(0);
        assert_eq!(schedule.phase(r.phase_index).name(), "train");
        assert_eq!((r.epoch, r.steps_into_phase), (0, 0));

        let r = schedule.resolve(100);
        assert_eq!(schedule.phase(r.phase_index).name(), "eval");
        assert_eq!((r.epoch, r.steps_into_phase), (0, 0));

        let r = schedule.resolve(119);
        assert_eq!(schedule.phase(r.phase_index).name(), "eval");
        assert_eq!((r.epoch, r.steps_into_phase), (0, 19));

        let r = schedule.resolve(120);
        assert_eq!(schedule.phase(r.phase_index).name(), "train");
        assert_eq!((r.epoch, r.steps_into_phase), (1, 0));
    }

    #[test]
    fn resolution_is_deterministic() {
        let schedule = train_eval();
        for step in [0u64, 7, 99, 100, 119, 120, 1_000_003] {
            assert_eq!(schedule.resolve(step), schedule.resolve(step));
        }
    }

    #[test]
    fn offset_always_within_phase() {
        let schedule = train_eval();
        for step in 0..1000 {
            let r = schedule.resolve(step);
            assert!(r.steps_into_phase < schedule.phase(r.phase_index).steps());
        }
    }

    #[test]
    fn reset_fires_only_on_boundary() {
        let schedule = train_eval();
        // Phase step sequence 0, 5, ..., 95 inside train, then into eval.
        let steps_made = 5;
        for step in (0..240).step_by(5) {
            let r = schedule.resolve(step);
            let signals = schedule.signals(r, steps_made);
            let expected = r.steps_into_phase < steps_made;
            assert_eq!(signals.reset, expected, "step={step}");
        }
        // Boundaries land at train step 0 and eval step 0 of each epoch.
        assert!(schedule.signals(schedule.resolve(0), 5).reset);
        assert!(schedule.signals(schedule.resolve(100), 5).reset);
        assert!(schedule.signals(schedule.resolve(120), 5).reset);
        assert!(!schedule.signals(schedule.resolve(50), 5).reset);
    }

    #[test]
    fn should_log_requires_writer() {
        // No writer attached, so should_log stays false even with log_every.
        let schedule = PhaseSchedule::builder()
            .phase("train", 10, |p| p.log_every(1))
            .build()
            .unwrap();
        let signals = schedule.signals(schedule.resolve(0), 1);
        assert!(!signals.should_log);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = PhaseSchedule::builder()
            .phase("train", 10, |p| p)
            .phase("train", 5, |p| p)
            .build()
            .unwrap_err();
        assert!(matches!(err, TrainLoopError::Config { .. }));
    }

    #[test]
    fn rejects_zero_budget_and_batch() {
        assert!(PhaseSchedule::builder()
            .phase("train", 0, |p| p)
            .build()
            .is_err());
        assert!(PhaseSchedule::builder()
            .phase("train", 10, |p| p.batch_size(0))
            .build()
            .is_err());
        assert!(PhaseSchedule::builder().build().is_err());
    }

    #[test]
    fn rejects_zero_cadence() {
        assert!(PhaseSchedule::builder()
            .phase("train", 10, |p| p.report_every(0))
            .build()
            .is_err());
    }

    #[test]
    fn longest_phase_tracks_maximum() {
        assert_eq!(train_eval().longest_phase(), 100);
    }

    #[test]
    fn cadence_accumulates_across_epochs() {
        // Eval checkpoints every 200 phase steps with a 20-step budget per
        // epoch: due on the first batch ever, then again once ten epochs of
        // eval have accumulated.
        let schedule = PhaseSchedule::builder()
            .phase("train", 100, |p| p.batch_size(5))
            .phase("eval", 20, |p| p.batch_size(5).checkpoint_every(200))
            .build()
            .unwrap();

        let mut due_steps = Vec::new();
        let mut step = 0;
        while step < 120 * 12 {
            let r = schedule.resolve(step);
            if schedule.phase(r.phase_index).name() == "eval" && schedule.checkpoint_due(r) {
                due_steps.push(schedule.phase_step(r));
            }
            step += 5;
        }
        // Fires at cumulative eval step 0 (first batch) and at 195, whose
        // batch completes the 200th eval step.
        assert_eq!(due_steps, vec![0, 195]);
    }
}
