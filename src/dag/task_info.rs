// src/dag/task_info.rs

//! Per-task mutable state and the transition rules that guard it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{RunId, TaskDefinition, TaskKey, TaskStatus};

/// Mutable state of one task, owned by the scheduler of its swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub key: TaskKey,
    pub title: String,
    pub task_id: String,
    pub project_id: String,
    pub status: TaskStatus,
    pub dependencies: Vec<TaskKey>,
    /// Executor handle, set once the spawn call succeeded.
    #[serde(default)]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Dependencies whose outcome caused this task to be skipped.
    #[serde(default)]
    pub blocked_by: Vec<TaskKey>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskState {
    /// Initial state: `Ready` when the task has no dependencies, else `Pending`.
    pub fn from_definition(def: &TaskDefinition) -> Self {
        let status = if def.dependencies.is_empty() {
            TaskStatus::Ready
        } else {
            TaskStatus::Pending
        };

        Self {
            key: def.key.clone(),
            title: def.title.clone(),
            task_id: def.task_id.clone(),
            project_id: def.project_id.clone(),
            status,
            dependencies: def.dependencies.clone(),
            run_id: None,
            outputs: BTreeMap::new(),
            error: None,
            blocked_by: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next` if the lattice allows it.
    ///
    /// Returns `false` (and leaves the task untouched) for any other move;
    /// in particular terminal states never change again.
    pub(crate) fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                task = %self.key,
                from = %self.status,
                to = %next,
                "rejected illegal task status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Wall-clock time between dispatch and completion, in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        let ms = (completed - started).num_milliseconds();
        Some(ms.max(0) as u64)
    }
}
