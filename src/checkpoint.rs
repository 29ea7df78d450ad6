//! Checkpoint save/restore for the training loop.
//!
//! A checkpoint is the one piece of state that must survive a process
//! crash: the global step counter plus the engine's opaque algorithm blob.
//! Everything else the loop works with (resolved phase, offsets, signals)
//! is derived from the step on demand, so restoring the step restores the
//! whole schedule position exactly — a resumed run produces the same
//! phase/offset/signal sequence as an uninterrupted one.
//!
//! # Format
//!
//! Checkpoints are JSON files named `checkpoint_step_NNNNNNNN.json`. Writes
//! go to a temporary file first and are renamed into place, so a crash
//! mid-write never leaves a truncated checkpoint where a reader might find
//! it. The manager keeps the newest `keep_last_n` files and deletes the
//! rest.
//!
//! Only the chief replica may write checkpoints; that gate lives in the
//! driver, not here.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoopResult, TrainLoopError};

/// Current checkpoint format version.
const CHECKPOINT_VERSION: u32 = 1;

/// Persisted snapshot of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingCheckpoint {
    /// Checkpoint format version, checked on load.
    pub version: u32,

    /// Global step at the time of the snapshot.
    pub step: u64,

    /// Opaque algorithm state exported by the compute engine.
    pub engine_state: Vec<u8>,

    /// Provenance metadata.
    pub metadata: CheckpointMetadata,
}

impl TrainingCheckpoint {
    /// Creates a checkpoint for the given step and engine state.
    #[must_use]
    pub fn new(step: u64, engine_state: Vec<u8>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            step,
            engine_state,
            metadata: CheckpointMetadata::new(step),
        }
    }

    /// Saves the checkpoint to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if writing or renaming fails.
    pub fn save(&self, path: &Path) -> LoopResult<()> {
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|e| TrainLoopError::Checkpoint {
            reason: format!("failed to create {}: {e}", tmp.display()),
        })?;
        let mut writer = BufWriter::new(file);
        if let Err(e) = serde_json::to_writer(&mut writer, self) {
            let _ = std::fs::remove_file(&tmp);
            return Err(TrainLoopError::Checkpoint {
                reason: format!("failed to serialize checkpoint: {e}"),
            });
        }
        // Flush before the rename; a late I/O error (disk full) must fail
        // the save, not install a truncated file as the live checkpoint.
        if let Err(e) = writer.flush() {
            let _ = std::fs::remove_file(&tmp);
            return Err(TrainLoopError::Checkpoint {
                reason: format!("failed to write {}: {e}", tmp.display()),
            });
        }
        drop(writer);
        std::fs::rename(&tmp, path).map_err(|e| TrainLoopError::Checkpoint {
            reason: format!("failed to move checkpoint into place: {e}"),
        })?;
        Ok(())
    }

    /// Loads a checkpoint from `path`.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if the file is missing, unreadable, or
    /// carries an incompatible version.
    pub fn load(path: &Path) -> LoopResult<Self> {
        let file = File::open(path).map_err(|e| TrainLoopError::Checkpoint {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;
        let reader = BufReader::new(file);
        let checkpoint: Self =
            serde_json::from_reader(reader).map_err(|e| TrainLoopError::Checkpoint {
                reason: format!("failed to deserialize checkpoint: {e}"),
            })?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(TrainLoopError::Checkpoint {
                reason: format!(
                    "incompatible checkpoint version {} (expected {})",
                    checkpoint.version, CHECKPOINT_VERSION
                ),
            });
        }
        Ok(checkpoint)
    }
}

/// Provenance recorded alongside every checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Global step at save time.
    pub step: u64,

    /// Wall-clock timestamp, RFC 3339.
    pub timestamp: String,

    /// Hostname of the writing (chief) replica.
    pub hostname: String,

    /// Free-form notes.
    pub notes: String,
}

impl CheckpointMetadata {
    /// Creates metadata with the current timestamp and hostname.
    #[must_use]
    pub fn new(step: u64) -> Self {
        Self {
            step,
            timestamp: chrono::Utc::now().to_rfc3339(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            notes: String::new(),
        }
    }

    /// Sets free-form notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Manages a directory of rotating checkpoints.
#[derive(Debug)]
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
    keep_last_n: usize,
    checkpoints: Vec<PathBuf>,
}

impl CheckpointManager {
    /// Opens a checkpoint directory, creating it if needed, and indexes any
    /// checkpoints already present.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if the directory cannot be created or
    /// scanned.
    pub fn new(checkpoint_dir: impl AsRef<Path>, keep_last_n: usize) -> LoopResult<Self> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&checkpoint_dir).map_err(|e| TrainLoopError::Checkpoint {
            reason: format!(
                "failed to create checkpoint directory {}: {e}",
                checkpoint_dir.display()
            ),
        })?;
        let checkpoints = Self::scan_checkpoints(&checkpoint_dir)?;
        Ok(Self {
            checkpoint_dir,
            keep_last_n,
            checkpoints,
        })
    }

    /// Saves a checkpoint and rotates old ones out.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if saving or rotation fails.
    pub fn save(&mut self, checkpoint: &TrainingCheckpoint) -> LoopResult<PathBuf> {
        let filename = format!("checkpoint_step_{:08}.json", checkpoint.step);
        let path = self.checkpoint_dir.join(filename);
        checkpoint.save(&path)?;
        // Saving again at the same step overwrites in place.
        if !self.checkpoints.contains(&path) {
            self.checkpoints.push(path.clone());
        }
        self.rotate_checkpoints()?;
        Ok(path)
    }

    /// Loads the most recent checkpoint, or `None` if the directory holds
    /// no checkpoints.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if the newest file exists but cannot be
    /// loaded.
    pub fn load_latest(&self) -> LoopResult<Option<TrainingCheckpoint>> {
        match self.checkpoints.last() {
            Some(path) => Ok(Some(TrainingCheckpoint::load(path)?)),
            None => Ok(None),
        }
    }

    /// Returns the path of the most recent checkpoint.
    #[must_use]
    pub fn latest_checkpoint_path(&self) -> Option<&Path> {
        self.checkpoints.last().map(PathBuf::as_path)
    }

    /// Returns the number of checkpoints currently on disk.
    #[must_use]
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    fn scan_checkpoints(dir: &Path) -> LoopResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| TrainLoopError::Checkpoint {
            reason: format!("failed to read checkpoint directory: {e}"),
        })?;

        let mut checkpoints = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TrainLoopError::Checkpoint {
                reason: format!("failed to read directory entry: {e}"),
            })?;
            let path = entry.path();
            let is_checkpoint = path.extension().and_then(|s| s.to_str()) == Some("json")
                && path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.starts_with("checkpoint_step_"));
            if is_checkpoint {
                checkpoints.push(path);
            }
        }

        checkpoints.sort_by_key(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("checkpoint_step_"))
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0)
        });
        Ok(checkpoints)
    }

    fn rotate_checkpoints(&mut self) -> LoopResult<()> {
        while self.checkpoints.len() > self.keep_last_n {
            let old = self.checkpoints.remove(0);
            std::fs::remove_file(&old).map_err(|e| TrainLoopError::Checkpoint {
                reason: format!("failed to delete old checkpoint {}: {e}", old.display()),
            })?;
        }
        Ok(())
    }
}
