// src/engine/integrate.rs

//! Post-success reconciliation of parallel task variants.
//!
//! Several task keys may share one external `task_id` when variants of the
//! same unit of work were run side by side. After a fully successful swarm,
//! each such group's branches are merged through a [`BranchIntegrator`] and,
//! optionally, a pull request is opened. Integration is advisory: conflicts
//! and errors are reported and logged but never change the swarm's status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dag::TaskState;
use crate::errors::Result;
use crate::types::{TaskKey, TaskStatus};

/// Answer of the external merge call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub merged: Vec<String>,
    pub conflicts: Vec<String>,
    pub pushed: bool,
    #[serde(default)]
    pub push_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

/// External capability that merges branches and opens pull requests.
pub trait BranchIntegrator: Send + Sync {
    fn merge_branches(
        &self,
        project_id: String,
        target_branch: String,
        branches: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<MergeResult>> + Send + '_>>;

    /// `Ok(None)` means the integrator declined to open one.
    fn open_pull_request(
        &self,
        project_id: String,
        task_id: String,
        title: String,
        body: String,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PullRequest>>> + Send + '_>>;
}

/// Maps a task to the branch its worker produced.
pub trait BranchNamer: Send + Sync {
    fn branch_name(&self, base_ref: &str, task_key: &str) -> String;
}

/// `{base_ref}-{task_key}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashedBranchNamer;

impl BranchNamer for DashedBranchNamer {
    fn branch_name(&self, base_ref: &str, task_key: &str) -> String {
        format!("{base_ref}-{task_key}")
    }
}

impl<F> BranchNamer for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn branch_name(&self, base_ref: &str, task_key: &str) -> String {
        self(base_ref, task_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationSettings {
    /// Prefix for per-task branch names. Defaults to the swarm id.
    pub base_ref: Option<String>,
    /// Branch the variants are merged into.
    pub target_branch: String,
    pub open_pull_request: bool,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            base_ref: None,
            target_branch: "main".to_string(),
            open_pull_request: false,
        }
    }
}

/// What happened to one group of variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub task_id: String,
    pub project_id: String,
    pub task_keys: Vec<TaskKey>,
    pub branches: Vec<String>,
    #[serde(default)]
    pub merge: Option<MergeResult>,
    #[serde(default)]
    pub pull_request: Option<PullRequest>,
    /// Error text from the merge or pull-request call, if one failed.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationReport {
    pub groups: Vec<GroupOutcome>,
}

impl IntegrationReport {
    pub fn has_conflicts(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.merge.as_ref().is_some_and(|m| !m.conflicts.is_empty()))
    }
}

/// Integrator plus the naming and target settings it runs with.
#[derive(Clone)]
pub struct Integration {
    integrator: Arc<dyn BranchIntegrator>,
    namer: Arc<dyn BranchNamer>,
    settings: IntegrationSettings,
}

impl Integration {
    pub fn new(integrator: Arc<dyn BranchIntegrator>, settings: IntegrationSettings) -> Self {
        Self {
            integrator,
            namer: Arc::new(DashedBranchNamer),
            settings,
        }
    }

    pub fn with_namer(mut self, namer: Arc<dyn BranchNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn settings(&self) -> &IntegrationSettings {
        &self.settings
    }

    /// Merge every group of completed variants that has more than one member.
    pub async fn integrate(&self, swarm_id: &str, tasks: &[TaskState]) -> IntegrationReport {
        let base_ref = self.settings.base_ref.as_deref().unwrap_or(swarm_id);
        let mut report = IntegrationReport::default();

        for group in group_variants(tasks) {
            if group.len() < 2 {
                continue;
            }
            let outcome = self.integrate_group(swarm_id, base_ref, &group).await;
            report.groups.push(outcome);
        }

        report
    }

    async fn integrate_group(
        &self,
        swarm_id: &str,
        base_ref: &str,
        group: &[&TaskState],
    ) -> GroupOutcome {
        let first = group[0];
        let task_keys: Vec<TaskKey> = group.iter().map(|t| t.key.clone()).collect();
        let branches: Vec<String> = group
            .iter()
            .map(|t| self.namer.branch_name(base_ref, &t.key))
            .collect();

        let mut outcome = GroupOutcome {
            task_id: first.task_id.clone(),
            project_id: first.project_id.clone(),
            task_keys,
            branches: branches.clone(),
            merge: None,
            pull_request: None,
            error: None,
        };

        info!(
            swarm_id = %swarm_id,
            task_id = %outcome.task_id,
            branches = ?branches,
            target = %self.settings.target_branch,
            "merging parallel task variants"
        );

        let merge = match self
            .integrator
            .merge_branches(
                outcome.project_id.clone(),
                self.settings.target_branch.clone(),
                branches,
            )
            .await
        {
            Ok(merge) => merge,
            Err(e) => {
                warn!(swarm_id = %swarm_id, task_id = %outcome.task_id, error = %e, "branch merge call failed");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        if !merge.conflicts.is_empty() {
            warn!(
                swarm_id = %swarm_id,
                task_id = %outcome.task_id,
                conflicts = ?merge.conflicts,
                "merge conflicts while integrating variants"
            );
        }
        if let Some(push_error) = &merge.push_error {
            warn!(swarm_id = %swarm_id, task_id = %outcome.task_id, error = %push_error, "merged branch was not pushed");
        }

        let merged_ok = merge.success;
        let merged_count = merge.merged.len();
        outcome.merge = Some(merge);

        if merged_ok && self.settings.open_pull_request {
            let title = format!("{} ({} variants)", first.title, merged_count);
            let body = format!(
                "Integrates variants {} of task {} from swarm {}.",
                outcome.task_keys.join(", "),
                outcome.task_id,
                swarm_id
            );
            match self
                .integrator
                .open_pull_request(outcome.project_id.clone(), outcome.task_id.clone(), title, body)
                .await
            {
                Ok(pr) => {
                    if let Some(pr) = &pr {
                        info!(swarm_id = %swarm_id, task_id = %outcome.task_id, pr = pr.number, url = %pr.url, "opened pull request");
                    }
                    outcome.pull_request = pr;
                }
                Err(e) => {
                    warn!(swarm_id = %swarm_id, task_id = %outcome.task_id, error = %e, "opening pull request failed");
                    outcome.error = Some(e.to_string());
                }
            }
        }

        outcome
    }
}

/// Completed tasks grouped by `task_id`, groups in order of first appearance.
pub fn group_variants(tasks: &[TaskState]) -> Vec<Vec<&TaskState>> {
    let mut groups: Vec<Vec<&TaskState>> = Vec::new();

    for task in tasks.iter().filter(|t| t.status == TaskStatus::Completed) {
        match groups.iter_mut().find(|g| g[0].task_id == task.task_id) {
            Some(group) => group.push(task),
            None => groups.push(vec![task]),
        }
    }

    groups
}
