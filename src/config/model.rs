// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::SessionOptions;
use crate::types::{
    DEFAULT_GLOBAL_TIMEOUT_SECONDS, DEFAULT_MAX_CONCURRENT, SwarmRequest, TaskDefinition,
};

/// Swarm file as read from TOML, before any semantic checks.
///
/// ```toml
/// [swarm]
/// agent_id = "planner"
/// max_concurrent = 2
///
/// [scheduler]
/// poll_interval_ms = 1000
///
/// [worker]
/// cmd = "./run-agent.sh"
///
/// [[task]]
/// key = "schema"
/// title = "Design schema"
/// task_id = "T-1"
/// project_id = "P-1"
/// execution_prompt = "..."
///
/// [[task]]
/// key = "api"
/// title = "Build API"
/// task_id = "T-2"
/// project_id = "P-1"
/// execution_prompt = "..."
/// dependencies = ["schema"]
/// ```
///
/// `[[task]]` is an array so that definition order survives parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSwarmFile {
    #[serde(default)]
    pub swarm: SwarmSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    pub worker: WorkerSection,

    #[serde(default)]
    pub task: Vec<TaskDefinition>,
}

/// `[swarm]` section: the request-level parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SwarmSection {
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_global_timeout_seconds")]
    pub global_timeout_seconds: u64,

    #[serde(default)]
    pub deviation_rules: String,
}

fn default_agent_id() -> String {
    "swarmdag".to_string()
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_global_timeout_seconds() -> u64 {
    DEFAULT_GLOBAL_TIMEOUT_SECONDS
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            max_concurrent: default_max_concurrent(),
            global_timeout_seconds: default_global_timeout_seconds(),
            deviation_rules: String::new(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Directory the JSON snapshots are written to.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_poll_interval_ms() -> u64 {
    2500
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".swarmdag")
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            state_dir: default_state_dir(),
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Shell command started once per task.
    pub cmd: String,
}

/// A swarm file that passed validation.
///
/// Only constructible through `TryFrom<RawSwarmFile>` (or `new_unchecked`
/// inside the crate), so holders can rely on a valid DAG.
#[derive(Debug, Clone)]
pub struct SwarmFile {
    pub swarm: SwarmSection,
    pub scheduler: SchedulerSection,
    pub worker: WorkerSection,
    pub tasks: Vec<TaskDefinition>,
}

impl SwarmFile {
    pub(crate) fn new_unchecked(raw: RawSwarmFile) -> Self {
        Self {
            swarm: raw.swarm,
            scheduler: raw.scheduler,
            worker: raw.worker,
            tasks: raw.task,
        }
    }

    /// The request this file describes.
    pub fn to_request(&self) -> SwarmRequest {
        SwarmRequest {
            agent_id: self.swarm.agent_id.clone(),
            tasks: self.tasks.clone(),
            max_concurrent: self.swarm.max_concurrent,
            global_timeout_seconds: self.swarm.global_timeout_seconds,
            deviation_rules: self.swarm.deviation_rules.clone(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.scheduler.poll_interval_ms),
        }
    }
}
