// src/engine/state.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::{SwarmSummary, TaskState};
use crate::types::{SwarmId, SwarmStatus, TaskStatus};

/// Externally visible snapshot of one swarm session.
///
/// This is what gets persisted after every loop iteration and what
/// `Orchestrator::get_state` hands out while the session is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmSessionState {
    pub swarm_id: SwarmId,
    pub agent_id: String,
    pub status: SwarmStatus,
    /// Every task, in definition order.
    pub tasks: Vec<TaskState>,
    pub max_concurrent: usize,
    pub running_count: usize,
    pub global_timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Present once the session has finished.
    #[serde(default)]
    pub summary: Option<SwarmSummary>,
}

impl SwarmSessionState {
    pub fn task(&self, key: &str) -> Option<&TaskState> {
        self.tasks.iter().find(|t| t.key == key)
    }

    pub fn status_of(&self, key: &str) -> Option<TaskStatus> {
        self.task(key).map(|t| t.status)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}
