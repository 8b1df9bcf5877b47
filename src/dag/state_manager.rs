// src/dag/state_manager.rs

//! Status propagation for tasks in the scheduler (the cascade engine).

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::dag::DagGraph;
use crate::dag::scheduler_step::{CascadeStep, SkippedTask};
use crate::dag::task_info::TaskState;
use crate::types::{TaskKey, TaskStatus};

/// What the cascade decided for one pending task.
enum Decision {
    Wait,
    Promote,
    Skip(Vec<TaskKey>),
}

/// Applies dependency-driven transitions to a swarm's tasks.
///
/// `tasks` is indexed in definition order, matching [`DagGraph::index_of`].
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut [TaskState],
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, tasks: &'a mut [TaskState]) -> Self {
        Self { graph, tasks }
    }

    /// Promote and skip pending tasks until nothing changes.
    ///
    /// - `Pending` with every dependency `Completed` becomes `Ready`.
    /// - `Pending` with any dependency `Failed`/`Skipped`/`Cancelled` becomes
    ///   `Skipped`, recording the blocking dependencies.
    ///
    /// Sweeps repeat until a fixed point, so a skip propagates through an
    /// entire chain of dependents within one call regardless of the order the
    /// tasks were defined in.
    pub fn cascade(&mut self, now: DateTime<Utc>) -> CascadeStep {
        let mut step = CascadeStep::default();

        loop {
            step.rounds += 1;
            let mut changed = false;

            for idx in 0..self.tasks.len() {
                if self.tasks[idx].status != TaskStatus::Pending {
                    continue;
                }

                match self.decide(idx) {
                    Decision::Wait => {}
                    Decision::Promote => {
                        let task = &mut self.tasks[idx];
                        if task.advance(TaskStatus::Ready) {
                            debug!(task = %task.key, "dependencies completed; marking Ready");
                            step.newly_ready.push(task.key.clone());
                            changed = true;
                        }
                    }
                    Decision::Skip(blocked_by) => {
                        let task = &mut self.tasks[idx];
                        if task.advance(TaskStatus::Skipped) {
                            info!(
                                task = %task.key,
                                blocked_by = ?blocked_by,
                                "upstream dependency did not complete; skipping task"
                            );
                            task.error = Some(format!(
                                "skipped: dependency {} did not complete",
                                blocked_by.join(", ")
                            ));
                            task.blocked_by = blocked_by.clone();
                            task.completed_at = Some(now);
                            step.newly_skipped.push(SkippedTask {
                                key: task.key.clone(),
                                blocked_by,
                            });
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                break;
            }
        }

        step
    }

    fn decide(&self, idx: usize) -> Decision {
        let key = &self.tasks[idx].key;
        let mut blockers = Vec::new();
        let mut all_completed = true;

        for dep in self.graph.dependencies_of(key) {
            let status = self
                .graph
                .index_of(dep)
                .and_then(|i| self.tasks.get(i))
                .map(|t| t.status);

            match status {
                Some(s) if s.blocks_dependents() => blockers.push(dep.clone()),
                Some(TaskStatus::Completed) => {}
                // Validated graphs never reference unknown keys; treat one as
                // unsatisfied rather than guessing.
                _ => all_completed = false,
            }
        }

        if !blockers.is_empty() {
            Decision::Skip(blockers)
        } else if all_completed {
            Decision::Promote
        } else {
            Decision::Wait
        }
    }

    /// Move every non-terminal task to `Cancelled`. Returns the swept keys.
    pub fn sweep_cancelled(&mut self, now: DateTime<Utc>) -> Vec<TaskKey> {
        let mut swept = Vec::new();
        for task in self.tasks.iter_mut() {
            if task.is_terminal() {
                continue;
            }
            if task.advance(TaskStatus::Cancelled) {
                task.completed_at = Some(now);
                swept.push(task.key.clone());
            }
        }
        if !swept.is_empty() {
            info!(tasks = ?swept, "cancelled remaining non-terminal tasks");
        }
        swept
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.is_terminal())
    }
}
