// src/dag/scheduler_step.rs

//! Result type of one cascade pass.

use crate::types::TaskKey;

/// A task skipped by the cascade, with the dependencies that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub key: TaskKey,
    pub blocked_by: Vec<TaskKey>,
}

/// Structured result of a single cascade pass (run to a fixed point).
///
/// Useful for tests that want to step the scheduler manually and assert on
/// exactly what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeStep {
    /// Tasks that moved `Pending -> Ready`, in the order they were promoted.
    pub newly_ready: Vec<TaskKey>,
    /// Tasks that moved `Pending -> Skipped`, in the order they were skipped.
    pub newly_skipped: Vec<SkippedTask>,
    /// Number of sweeps over the task list until nothing changed.
    pub rounds: usize,
}

impl CascadeStep {
    pub fn is_empty(&self) -> bool {
        self.newly_ready.is_empty() && self.newly_skipped.is_empty()
    }
}
