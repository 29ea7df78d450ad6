//! Replica role query for distributed runs.
//!
//! Every replica runs its own copy of the loop over the same global step
//! sequence, so scheduling decisions need no coordination — the engine's
//! gradient aggregation already keeps the counters in lockstep. The one
//! thing that must be coordinated is who writes: exactly one replica (the
//! chief) persists checkpoints and records summaries, so concurrent writers
//! can never corrupt shared state. The loop consults [`ReplicaRole`] once
//! per iteration, before any side-effecting write.

use crate::error::{LoopResult, TrainLoopError};

/// Identifies this replica's place in a distributed run.
pub trait ReplicaRole: Send {
    /// Returns whether this replica is allowed to persist checkpoints and
    /// write summaries.
    fn is_chief(&self) -> bool;

    /// Returns this replica's index within the cluster.
    fn replica_index(&self) -> usize;

    /// Returns the total number of replicas.
    fn replica_count(&self) -> usize;
}

/// Single-process role: always chief.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ReplicaRole for SingleProcess {
    fn is_chief(&self) -> bool {
        true
    }

    fn replica_index(&self) -> usize {
        0
    }

    fn replica_count(&self) -> usize {
        1
    }
}

/// Fixed cluster membership known at startup.
///
/// Replica 0 is the chief, mirroring the usual task-index convention of
/// cluster runtimes.
#[derive(Debug, Clone, Copy)]
pub struct StaticCluster {
    task_index: usize,
    num_replicas: usize,
}

impl StaticCluster {
    /// Creates a role for `task_index` within a cluster of `num_replicas`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cluster is empty or the index
    /// is out of range.
    pub fn new(task_index: usize, num_replicas: usize) -> LoopResult<Self> {
        if num_replicas == 0 {
            return Err(TrainLoopError::config(
                "cluster must have at least one replica",
            ));
        }
        if task_index >= num_replicas {
            return Err(TrainLoopError::config(format!(
                "task index {task_index} out of range for {num_replicas} replicas"
            )));
        }
        Ok(Self {
            task_index,
            num_replicas,
        })
    }
}

impl ReplicaRole for StaticCluster {
    fn is_chief(&self) -> bool {
        self.task_index == 0
    }

    fn replica_index(&self) -> usize {
        self.task_index
    }

    fn replica_count(&self) -> usize {
        self.num_replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_is_chief() {
        assert!(SingleProcess.is_chief());
        assert_eq!(SingleProcess.replica_count(), 1);
    }

    #[test]
    fn only_task_zero_is_chief() {
        assert!(StaticCluster::new(0, 4).unwrap().is_chief());
        for task in 1..4 {
            assert!(!StaticCluster::new(task, 4).unwrap().is_chief());
        }
    }

    #[test]
    fn rejects_invalid_membership() {
        assert!(StaticCluster::new(0, 0).is_err());
        assert!(StaticCluster::new(4, 4).is_err());
    }
}
