// src/dag/summary.rs

//! End-of-run summary for a swarm.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dag::task_info::TaskState;
use crate::engine::integrate::IntegrationReport;
use crate::types::{RunId, TaskKey, TaskStatus};

/// Outcome of one task as reported in a [`SwarmSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub key: TaskKey,
    pub title: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub run_id: Option<RunId>,
    pub error: Option<String>,
    pub outputs: BTreeMap<String, String>,
    pub blocked_by: Vec<TaskKey>,
    /// `None` for tasks that never started (skipped/cancelled before dispatch).
    pub duration_ms: Option<u64>,
}

impl From<&TaskState> for TaskResult {
    fn from(task: &TaskState) -> Self {
        Self {
            key: task.key.clone(),
            title: task.title.clone(),
            task_id: task.task_id.clone(),
            status: task.status,
            run_id: task.run_id.clone(),
            error: task.error.clone(),
            outputs: task.outputs.clone(),
            blocked_by: task.blocked_by.clone(),
            duration_ms: task.duration_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// `true` iff nothing failed, was skipped or was cancelled.
    pub success: bool,
    /// Wall-clock time of the whole session.
    pub duration_ms: u64,
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub integration: Option<IntegrationReport>,
}

impl SwarmSummary {
    pub fn from_tasks(tasks: &[TaskState], duration_ms: u64) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();

        let completed = count(TaskStatus::Completed);
        let failed = count(TaskStatus::Failed);
        let skipped = count(TaskStatus::Skipped);
        let cancelled = count(TaskStatus::Cancelled);

        Self {
            total: tasks.len(),
            completed,
            failed,
            skipped,
            cancelled,
            success: failed == 0 && skipped == 0 && cancelled == 0,
            duration_ms,
            results: tasks.iter().map(TaskResult::from).collect(),
            integration: None,
        }
    }

    pub fn result(&self, key: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.key == key)
    }
}
