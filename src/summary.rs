//! Summary records and sinks.
//!
//! A summary is a small bundle of tagged scalars produced by the compute
//! engine when a phase's `should_log` signal fires. The loop writes it to
//! the phase's sink at an aligned step index so that curves from phases of
//! unequal length stay comparable across epochs. Sinks are trait objects:
//! the loop does not care whether the destination is a JSONL file, a metrics
//! service, or a test buffer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoopResult, TrainLoopError};

/// A bundle of tagged scalar values emitted by one logged batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    values: Vec<(String, f64)>,
}

impl Summary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tagged scalar.
    #[must_use]
    pub fn scalar(mut self, tag: impl Into<String>, value: f64) -> Self {
        self.values.push((tag.into(), value));
        self
    }

    /// Returns the tagged scalars in insertion order.
    #[must_use]
    pub fn values(&self) -> &[(String, f64)] {
        &self.values
    }

    /// Returns whether the summary carries no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Destination for a phase's summaries.
///
/// Implementations receive the aligned summary step, not the raw global
/// step; the loop computes `epoch * longest_phase + steps_into_phase` so
/// shorter phases catch up at the start of each epoch.
pub trait SummaryWriter: Send {
    /// Records one summary at the given aligned step.
    fn write(&mut self, summary: &Summary, step: u64) -> LoopResult<()>;

    /// Flushes any buffered records to the underlying sink.
    fn flush(&mut self) -> LoopResult<()>;
}

/// One line of a JSONL summary file.
#[derive(Debug, Serialize)]
struct SummaryRecord<'a> {
    step: u64,
    values: &'a [(String, f64)],
}

/// Append-only JSON-lines summary sink.
///
/// Each write appends one `{"step": N, "values": [["tag", v], ...]}` line.
/// Buffered; the loop flushes on shutdown.
#[derive(Debug)]
pub struct JsonlSummaryWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonlSummaryWriter {
    /// Opens (or creates) a summary file in append mode.
    ///
    /// # Errors
    ///
    /// Returns a summary error if the file cannot be opened.
    pub fn create(path: impl AsRef<Path>) -> LoopResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrainLoopError::Summary {
                reason: format!("failed to open {}: {e}", path.display()),
            })?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SummaryWriter for JsonlSummaryWriter {
    fn write(&mut self, summary: &Summary, step: u64) -> LoopResult<()> {
        let record = SummaryRecord {
            step,
            values: &summary.values,
        };
        serde_json::to_writer(&mut self.out, &record).map_err(|e| TrainLoopError::Summary {
            reason: format!("failed to serialize summary: {e}"),
        })?;
        self.out
            .write_all(b"\n")
            .map_err(|e| TrainLoopError::Summary {
                reason: format!("failed to write {}: {e}", self.path.display()),
            })?;
        Ok(())
    }

    fn flush(&mut self) -> LoopResult<()> {
        self.out.flush().map_err(|e| TrainLoopError::Summary {
            reason: format!("failed to flush {}: {e}", self.path.display()),
        })
    }
}
