//! Run configuration for the training loop.
//!
//! Phase structure is registered programmatically through
//! [`crate::phases::PhaseSchedule`]; this module covers the run-level knobs
//! around it — total step budget, checkpoint location and retention — plus
//! TOML load/save so deployments can keep them in a file.
//!
//! # Example
//!
//! ```rust
//! use phase_loop_trainer_rs::config::LoopConfig;
//!
//! let config = LoopConfig::builder()
//!     .total_steps(30_000)
//!     .checkpoint_dir("/tmp/run-7/checkpoints")
//!     .keep_last_n(3)
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoopResult, TrainLoopError};

/// Run-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Total step budget; the loop stops once the global step reaches it.
    #[serde(default = "default_total_steps")]
    pub total_steps: u64,

    /// Directory for rotating checkpoints. `None` disables persistence
    /// entirely (useful for tests and throwaway runs).
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,

    /// How many checkpoints to keep on disk.
    #[serde(default = "default_keep_last_n")]
    pub keep_last_n: usize,

    /// Master switch for summary recording. When false, the chief skips
    /// writing summaries to phase sinks; useful for throwaway runs where
    /// the score stream is all that matters. Phase `log_every` cadences
    /// still fire (the engine may use the signal internally).
    #[serde(default = "default_log_summaries")]
    pub log_summaries: bool,
}

// Default value functions for serde
fn default_total_steps() -> u64 {
    100_000
}
fn default_keep_last_n() -> usize {
    5
}
fn default_log_summaries() -> bool {
    true
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            total_steps: default_total_steps(),
            checkpoint_dir: None,
            keep_last_n: default_keep_last_n(),
            log_summaries: default_log_summaries(),
        }
    }
}

impl LoopConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LoopConfigBuilder {
        LoopConfigBuilder::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> LoopResult<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| TrainLoopError::Config {
                detail: format!("failed to read config file: {e}"),
            })?;
        toml::from_str(&content).map_err(|e| TrainLoopError::Config {
            detail: format!("failed to parse config: {e}"),
        })
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization or writing fails.
    pub fn to_file(&self, path: impl AsRef<Path>) -> LoopResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TrainLoopError::Config {
            detail: format!("failed to serialize config: {e}"),
        })?;
        std::fs::write(path.as_ref(), content).map_err(|e| TrainLoopError::Config {
            detail: format!("failed to write config file: {e}"),
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when any parameter is out of range.
    pub fn validate(&self) -> LoopResult<()> {
        if self.total_steps == 0 {
            return Err(TrainLoopError::config("total_steps must be > 0"));
        }
        if self.keep_last_n == 0 {
            return Err(TrainLoopError::config("keep_last_n must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`LoopConfig`].
#[derive(Debug, Default)]
pub struct LoopConfigBuilder {
    total_steps: Option<u64>,
    checkpoint_dir: Option<PathBuf>,
    keep_last_n: Option<usize>,
    log_summaries: Option<bool>,
}

impl LoopConfigBuilder {
    /// Sets the total step budget.
    #[must_use]
    pub fn total_steps(mut self, steps: u64) -> Self {
        self.total_steps = Some(steps);
        self
    }

    /// Sets the checkpoint directory.
    #[must_use]
    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Sets checkpoint retention.
    #[must_use]
    pub fn keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = Some(n);
        self
    }

    /// Enables or disables summary recording for the whole run.
    #[must_use]
    pub fn log_summaries(mut self, enabled: bool) -> Self {
        self.log_summaries = Some(enabled);
        self
    }

    /// Builds the configuration, falling back to defaults for unset fields.
    #[must_use]
    pub fn build(self) -> LoopConfig {
        let defaults = LoopConfig::default();
        LoopConfig {
            total_steps: self.total_steps.unwrap_or(defaults.total_steps),
            checkpoint_dir: self.checkpoint_dir,
            keep_last_n: self.keep_last_n.unwrap_or(defaults.keep_last_n),
            log_summaries: self.log_summaries.unwrap_or(defaults.log_summaries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        assert!(LoopConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_budget_and_retention() {
        let config = LoopConfig::builder().total_steps(0).build();
        assert!(config.validate().is_err());

        let config = LoopConfig::builder().keep_last_n(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.toml");

        let config = LoopConfig::builder()
            .total_steps(12_345)
            .checkpoint_dir(dir.path().join("ckpt"))
            .keep_last_n(2)
            .build();
        config.to_file(&path).unwrap();

        let loaded = LoopConfig::from_file(&path).unwrap();
        assert_eq!(loaded.total_steps, 12_345);
        assert_eq!(loaded.keep_last_n, 2);
        assert_eq!(loaded.checkpoint_dir, config.checkpoint_dir);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.toml");
        std::fs::write(&path, "total_steps = 500\n").unwrap();

        let loaded = LoopConfig::from_file(&path).unwrap();
        assert_eq!(loaded.total_steps, 500);
        assert_eq!(loaded.keep_last_n, default_keep_last_n());
        assert!(loaded.checkpoint_dir.is_none());
        assert!(loaded.log_summaries);
    }

    #[test]
    fn summaries_enabled_by_default() {
        assert!(LoopConfig::default().log_summaries);
        let config = LoopConfig::builder().log_summaries(false).build();
        assert!(!config.log_summaries);
    }
}
