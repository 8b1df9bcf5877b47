// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The session talks to an `ExecutorBackend` instead of a concrete worker.
//! That keeps the scheduling loop independent of how work is actually run and
//! lets tests substitute a scripted fake.
//!
//! - [`ProcessExecutor`](super::ProcessExecutor) runs each task as a local
//!   shell process and is what the `swarmdag` binary uses.
//! - Tests provide their own backend that records spawns and answers polls
//!   from a script.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::types::{RunId, SwarmId, TaskDefinition, TaskKey};

/// Everything the worker needs to start one task.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub swarm_id: SwarmId,
    pub agent_id: String,
    pub task_key: TaskKey,
    pub title: String,
    pub task_id: String,
    pub project_id: String,
    /// Opaque; forwarded as-is.
    pub execution_prompt: String,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    /// Opaque; identical for every task of the swarm.
    pub deviation_rules: String,
    /// Fires when the owning session is cancelled or times out.
    ///
    /// Backends may use it to abandon work early. The scheduler never waits
    /// on it: it sweeps the task on its next iteration either way.
    pub cancel: CancellationToken,
}

impl SpawnRequest {
    pub fn for_task(
        swarm_id: &str,
        agent_id: &str,
        deviation_rules: &str,
        def: &TaskDefinition,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            swarm_id: swarm_id.to_string(),
            agent_id: agent_id.to_string(),
            task_key: def.key.clone(),
            title: def.title.clone(),
            task_id: def.task_id.clone(),
            project_id: def.project_id.clone(),
            execution_prompt: def.execution_prompt.clone(),
            model: def.model.clone(),
            timeout_seconds: def.timeout_seconds,
            deviation_rules: deviation_rules.to_string(),
            cancel,
        }
    }
}

/// Status of a run as reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Queued,
    Running,
    Completed,
    Failed,
    /// Anything the worker reports that we don't recognise.
    #[serde(other)]
    Unknown,
}

/// Answer to a single poll call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    pub status: RemoteStatus,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PollResult {
    pub fn running() -> Self {
        Self {
            status: RemoteStatus::Running,
            outputs: BTreeMap::new(),
            error: None,
        }
    }

    pub fn completed(outputs: BTreeMap<String, String>) -> Self {
        Self {
            status: RemoteStatus::Completed,
            outputs,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            outputs: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

/// Trait abstracting the external worker that actually performs tasks.
///
/// Calls for different tasks are issued concurrently, so implementations take
/// `&self` and must be `Sync`.
pub trait ExecutorBackend: Send + Sync {
    /// Start a task and return the worker's handle for it.
    ///
    /// An `Err` fails the task immediately; it is not retried.
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RunId>> + Send + '_>>;

    /// Query the current status of a run.
    ///
    /// An `Err` is treated as transient: the task stays running and is polled
    /// again on the next iteration.
    fn poll(
        &self,
        run_id: RunId,
    ) -> Pin<Box<dyn Future<Output = Result<PollResult>> + Send + '_>>;
}
