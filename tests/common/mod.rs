//! Shared fixtures: a scripted compute engine and an in-memory summary sink.

use std::sync::{Arc, Mutex};

use phase_loop_trainer_rs::prelude::*;

/// One recorded `run_batch` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub step_before: u64,
    pub signals: PhaseSignals,
    pub is_training: Option<bool>,
}

/// Deterministic engine: advances the counter by a fixed batch size and
/// scores each batch with its resulting step value.
#[derive(Debug)]
pub struct ScriptedEngine {
    step: u64,
    batch: u64,
    pub fail_at_step: Option<u64>,
    pub calls: Vec<CallRecord>,
    pub closed: bool,
}

impl ScriptedEngine {
    pub fn new(batch: u64) -> Self {
        Self {
            step: 0,
            batch,
            fail_at_step: None,
            calls: Vec::new(),
            closed: false,
        }
    }
}

impl ComputeEngine for ScriptedEngine {
    fn run_batch(&mut self, feed: &Feed, signals: PhaseSignals) -> LoopResult<BatchOutcome> {
        if self.fail_at_step == Some(self.step) {
            return Err(TrainLoopError::engine("scripted failure"));
        }
        let is_training = match feed.get("is_training") {
            Some(FeedValue::Bool(b)) => Some(*b),
            _ => None,
        };
        self.calls.push(CallRecord {
            step_before: self.step,
            signals,
            is_training,
        });
        self.step += self.batch;
        let summary = signals
            .should_log
            .then(|| Summary::new().scalar("score", self.step as f64));
        Ok(BatchOutcome {
            summary,
            mean_score: self.step as f32,
            global_step: self.step,
            steps_made: self.batch,
        })
    }

    fn global_step(&self) -> u64 {
        self.step
    }

    fn export_state(&self) -> LoopResult<Vec<u8>> {
        Ok(self.step.to_le_bytes().to_vec())
    }

    fn import_state(&mut self, state: &[u8], _step: u64) -> LoopResult<()> {
        let bytes: [u8; 8] = state
            .try_into()
            .map_err(|_| TrainLoopError::engine("bad state blob"))?;
        self.step = u64::from_le_bytes(bytes);
        Ok(())
    }

    fn close(&mut self) -> LoopResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Summary sink that collects writes into shared memory for assertions.
pub struct VecWriter {
    records: Arc<Mutex<Vec<(u64, Summary)>>>,
}

impl VecWriter {
    pub fn new() -> (Box<Self>, Arc<Mutex<Vec<(u64, Summary)>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Self {
                records: Arc::clone(&records),
            }),
            records,
        )
    }
}

impl SummaryWriter for VecWriter {
    fn write(&mut self, summary: &Summary, step: u64) -> LoopResult<()> {
        self.records.lock().unwrap().push((step, summary.clone()));
        Ok(())
    }

    fn flush(&mut self) -> LoopResult<()> {
        Ok(())
    }
}
