//! Basic training-loop example with a mock compute engine.
//!
//! Demonstrates registering a train/eval schedule, streaming scores, and
//! automatic checkpointing in a temporary directory.
//!
//! # Running
//!
//! ```bash
//! cargo run --example basic_training
//! ```

use phase_loop_trainer_rs::prelude::*;

/// Mock engine: advances the counter by a fixed batch size and produces a
/// slowly improving score so the report stream shows convergent behavior.
struct MockEngine {
    step: u64,
    batch: u64,
}

impl MockEngine {
    fn new(batch: u64) -> Self {
        Self { step: 0, batch }
    }

    fn score(&self) -> f32 {
        // Rises toward 100 with a little noise.
        let t = self.step as f32;
        100.0 * (1.0 - (-t * 0.001).exp()) + (t * 0.05).sin()
    }
}

impl ComputeEngine for MockEngine {
    fn run_batch(&mut self, feed: &Feed, signals: PhaseSignals) -> LoopResult<BatchOutcome> {
        if signals.reset {
            // A real engine would reinitialize episode-local state here.
            let mode = feed.get("is_training");
            println!("  (reset; is_training = {mode:?})");
        }
        self.step += self.batch;
        let summary = signals
            .should_log
            .then(|| Summary::new().scalar("mean_score", f64::from(self.score())));
        Ok(BatchOutcome {
            summary,
            mean_score: self.score(),
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
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let run_dir = std::env::temp_dir().join("phase-loop-demo");
    std::fs::create_dir_all(&run_dir)?;
    let summaries = JsonlSummaryWriter::create(run_dir.join("eval.jsonl"))?;

    let schedule = PhaseSchedule::builder()
        .phase("train", 1000, |p| {
            p.batch_size(25)
                .report_every(1000)
                .feed("is_training", FeedValue::Bool(true))
        })
        .phase("eval", 250, |p| {
            p.batch_size(25)
                .report_every(250)
                .log_every(125)
                .checkpoint_every(2500)
                .writer(Box::new(summaries))
                .feed("is_training", FeedValue::Bool(false))
        })
        .build()?;

    let config = LoopConfig::builder()
        .total_steps(12_500)
        .checkpoint_dir(run_dir.join("checkpoints"))
        .keep_last_n(3)
        .build();

    let mut train_loop = TrainLoop::new(MockEngine::new(25), schedule, config)?;
    println!("starting in phase '{}'", train_loop.current_phase_name());

    for (i, score) in train_loop.scores().enumerate() {
        println!("report {:>3}: mean score {:.2}", i, score?);
    }

    let stats = train_loop.stats();
    println!(
        "done: {} batches, {} reports, {} checkpoints, {} summaries (in {})",
        stats.iterations,
        stats.reports,
        stats.checkpoints_written,
        stats.summaries_written,
        run_dir.display()
    );
    Ok(())
}
