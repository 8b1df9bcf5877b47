use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::CascadeStep;
use crate::dag::state_manager::StateManager;
use crate::dag::summary::SwarmSummary;
use crate::dag::task_info::TaskState;
use crate::dag::validate::validate_tasks;
use crate::errors::Result;
use crate::exec::{PollResult, RemoteStatus};
use crate::types::{RunId, TaskDefinition, TaskKey, TaskStatus};

/// Result of applying one poll response to a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTransition {
    /// Task moved to `Completed`.
    Completed,
    /// Task moved to `Failed`.
    Failed,
    /// Worker reported anything else; task stays `Running`.
    Unchanged,
}

/// Scheduler holds one swarm's immutable DAG plus the mutable task states.
///
/// It is synchronous and performs no IO; the async session loop drives it.
/// It is responsible for:
/// - picking ready tasks for dispatch in definition order, bounded by slots
/// - recording dispatch outcomes and poll results
/// - cascading readiness and skips to a fixed point
/// - sweeping leftovers to `Cancelled` when the run ends early
#[derive(Debug, Clone)]
pub struct Scheduler {
    graph: DagGraph,
    definitions: Vec<TaskDefinition>,
    /// Same order as `definitions`.
    tasks: Vec<TaskState>,
}

impl Scheduler {
    /// Validate the definitions and build the initial task states.
    ///
    /// Tasks without dependencies start `Ready`; all others start `Pending`.
    pub fn new(definitions: Vec<TaskDefinition>) -> Result<Self> {
        validate_tasks(&definitions)?;

        let graph = DagGraph::from_definitions(&definitions);
        let tasks = definitions.iter().map(TaskState::from_definition).collect();

        debug!(
            tasks = definitions.len(),
            roots = ?graph.roots(),
            "scheduler: built task graph"
        );

        Ok(Self {
            graph,
            definitions,
            tasks,
        })
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// All task states in definition order.
    pub fn tasks(&self) -> &[TaskState] {
        &self.tasks
    }

    pub fn task(&self, key: &str) -> Option<&TaskState> {
        let idx = self.graph.index_of(key)?;
        self.tasks.get(idx)
    }

    pub fn status_of(&self, key: &str) -> Option<TaskStatus> {
        self.task(key).map(|t| t.status)
    }

    pub fn definition(&self, key: &str) -> Option<&TaskDefinition> {
        let idx = self.graph.index_of(key)?;
        self.definitions.get(idx)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn running_count(&self) -> usize {
        self.count(TaskStatus::Running)
    }

    /// `max_concurrent - running`, never negative.
    pub fn available_slots(&self, max_concurrent: usize) -> usize {
        max_concurrent.saturating_sub(self.running_count())
    }

    /// Up to `available_slots` ready tasks, in definition order.
    ///
    /// Does not change any state; call [`Scheduler::mark_running`] or
    /// [`Scheduler::mark_dispatch_failed`] with the outcome of each spawn.
    pub fn next_dispatch_batch(&self, max_concurrent: usize) -> Vec<TaskDefinition> {
        let slots = self.available_slots(max_concurrent);
        if slots == 0 {
            return Vec::new();
        }

        self.tasks
            .iter()
            .zip(self.definitions.iter())
            .filter(|(state, _)| state.status == TaskStatus::Ready)
            .take(slots)
            .map(|(_, def)| def.clone())
            .collect()
    }

    /// `Ready -> Running` after a successful spawn.
    pub fn mark_running(&mut self, key: &str, run_id: RunId, now: DateTime<Utc>) -> bool {
        let Some(task) = self.task_mut(key) else {
            warn!(task = %key, "spawn result for unknown task; ignoring");
            return false;
        };

        if !task.advance(TaskStatus::Running) {
            return false;
        }

        info!(task = %task.key, run_id = %run_id, "task dispatched; marking Running");
        task.run_id = Some(run_id);
        task.started_at = Some(now);
        true
    }

    /// `Ready -> Failed` after the spawn call itself errored. No retry.
    pub fn mark_dispatch_failed(&mut self, key: &str, error: String, now: DateTime<Utc>) -> bool {
        let Some(task) = self.task_mut(key) else {
            warn!(task = %key, "spawn failure for unknown task; ignoring");
            return false;
        };

        if !task.advance(TaskStatus::Failed) {
            return false;
        }

        warn!(task = %task.key, error = %error, "spawn failed; marking task Failed");
        task.error = Some(error);
        task.started_at = Some(now);
        task.completed_at = Some(now);
        true
    }

    /// Running tasks and their executor handles, in definition order.
    pub fn running_runs(&self) -> Vec<(TaskKey, RunId)> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .filter_map(|t| t.run_id.clone().map(|run| (t.key.clone(), run)))
            .collect()
    }

    /// Apply a poll response to a running task.
    ///
    /// Only `completed` and `failed` change anything; every other remote
    /// status means the task is still in flight.
    pub fn apply_poll(
        &mut self,
        key: &str,
        result: PollResult,
        now: DateTime<Utc>,
    ) -> PollTransition {
        let Some(task) = self.task_mut(key) else {
            warn!(task = %key, "poll result for unknown task; ignoring");
            return PollTransition::Unchanged;
        };

        if task.status != TaskStatus::Running {
            debug!(task = %task.key, status = %task.status, "poll result for non-running task; ignoring");
            return PollTransition::Unchanged;
        }

        match result.status {
            RemoteStatus::Completed => {
                task.advance(TaskStatus::Completed);
                task.outputs = result.outputs;
                task.completed_at = Some(now);
                info!(task = %task.key, duration_ms = ?task.duration_ms(), "task completed");
                PollTransition::Completed
            }
            RemoteStatus::Failed => {
                task.advance(TaskStatus::Failed);
                task.outputs = result.outputs;
                task.error = Some(
                    result
                        .error
                        .unwrap_or_else(|| "worker reported failure".to_string()),
                );
                task.completed_at = Some(now);
                warn!(task = %task.key, error = ?task.error, "task failed");
                PollTransition::Failed
            }
            other => {
                debug!(task = %task.key, remote = ?other, "task still in flight");
                PollTransition::Unchanged
            }
        }
    }

    /// Propagate readiness and skips to a fixed point.
    pub fn cascade(&mut self, now: DateTime<Utc>) -> CascadeStep {
        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        manager.cascade(now)
    }

    /// Move every non-terminal task to `Cancelled`.
    pub fn sweep_cancelled(&mut self, now: DateTime<Utc>) -> Vec<TaskKey> {
        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        manager.sweep_cancelled(now)
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.is_terminal())
    }

    pub fn summary(&self, duration_ms: u64) -> SwarmSummary {
        SwarmSummary::from_tasks(&self.tasks, duration_ms)
    }

    fn task_mut(&mut self, key: &str) -> Option<&mut TaskState> {
        let idx = self.graph.index_of(key)?;
        self.tasks.get_mut(idx)
    }
}
