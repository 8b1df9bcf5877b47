use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-chosen identifier of a swarm.
pub type SwarmId = String;

/// Key of a task, unique within its swarm.
pub type TaskKey = String;

/// Opaque handle returned by the executor when a task is spawned.
pub type RunId = String;

pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_GLOBAL_TIMEOUT_SECONDS: u64 = 1800;

/// Immutable description of one unit of work in a swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub key: TaskKey,
    pub title: String,
    /// External work-item reference. Several keys may share one `task_id`
    /// when variants of the same unit are dispatched in parallel.
    pub task_id: String,
    pub project_id: String,
    /// Handed to the executor verbatim; never interpreted here.
    pub execution_prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Passed through to the executor only. The scheduler does not enforce it.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub dependencies: Vec<TaskKey>,
}

/// A batch of interdependent tasks submitted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmRequest {
    pub agent_id: String,
    pub tasks: Vec<TaskDefinition>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_global_timeout_seconds")]
    pub global_timeout_seconds: u64,
    /// Opaque; forwarded unchanged with every spawn call.
    #[serde(default)]
    pub deviation_rules: String,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_global_timeout_seconds() -> u64 {
    DEFAULT_GLOBAL_TIMEOUT_SECONDS
}

impl SwarmRequest {
    pub fn new(agent_id: impl Into<String>, tasks: Vec<TaskDefinition>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tasks,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            global_timeout_seconds: DEFAULT_GLOBAL_TIMEOUT_SECONDS,
            deviation_rules: String::new(),
        }
    }
}

/// Status of a single task.
///
/// `Pending -> Ready -> Running -> Completed | Failed`, with `Pending`/`Ready`
/// also able to drop straight to `Skipped` or `Cancelled`. The last four are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }

    /// Terminal states that block dependents (everything but `Completed`).
    pub fn blocks_dependents(self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the status lattice.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Ready | Skipped | Cancelled) => true,
            (Ready, Running | Failed | Skipped | Cancelled) => true,
            (Running, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Cancelled => "cancelled",
        };
        f.pad(s)
    }
}

/// Overall status of a swarm session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SwarmStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, SwarmStatus::Running)
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwarmStatus::Running => "running",
            SwarmStatus::Completed => "completed",
            SwarmStatus::Failed => "failed",
            SwarmStatus::Cancelled => "cancelled",
        };
        f.pad(s)
    }
}
