//! Recording stand-ins for the session's side-channel collaborators.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use swarmdag::engine::{
    BranchIntegrator, EventPublisher, MergeResult, PullRequest, SnapshotStore, SwarmEvent,
    SwarmSessionState,
};
use swarmdag::errors::{Result, SwarmError};
use swarmdag::types::SwarmId;

/// Publisher that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<(SwarmId, SwarmEvent)>>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record events but report every publish as failed.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<SwarmEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Event kinds in publish order, e.g. `"task_started"`.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.kind())
            .collect()
    }

    /// Kinds of the events about `key`, in publish order.
    pub fn kinds_for(&self, key: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.task_key() == Some(key))
            .map(|(_, e)| e.kind())
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(
        &self,
        swarm_id: SwarmId,
        event: SwarmEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.events.lock().unwrap().push((swarm_id, event));
            if self.fail {
                return Err(SwarmError::Other(anyhow::anyhow!("publisher offline")));
            }
            Ok(())
        })
    }
}

/// Store whose every write fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

impl SnapshotStore for FailingStore {
    fn persist(
        &self,
        _snapshot: SwarmSessionState,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Err(SwarmError::Other(anyhow::anyhow!("disk full"))) })
    }
}

/// One recorded `merge_branches` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub project_id: String,
    pub target_branch: String,
    pub branches: Vec<String>,
}

/// Branch integrator that records calls and answers with canned results.
#[derive(Debug, Clone, Default)]
pub struct FakeIntegrator {
    merges: Arc<Mutex<Vec<MergeCall>>>,
    prs: Arc<Mutex<Vec<(String, String)>>>,
    conflicts: Vec<String>,
    merge_error: Option<String>,
}

impl FakeIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every merge reports these conflicts (and `success = false`).
    pub fn with_conflicts(mut self, conflicts: &[&str]) -> Self {
        self.conflicts = conflicts.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Every merge call errors.
    pub fn with_merge_error(mut self, error: &str) -> Self {
        self.merge_error = Some(error.to_string());
        self
    }

    pub fn merge_calls(&self) -> Vec<MergeCall> {
        self.merges.lock().unwrap().clone()
    }

    /// `(project_id, task_id)` of every pull request opened.
    pub fn pull_requests(&self) -> Vec<(String, String)> {
        self.prs.lock().unwrap().clone()
    }
}

impl BranchIntegrator for FakeIntegrator {
    fn merge_branches(
        &self,
        project_id: String,
        target_branch: String,
        branches: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<MergeResult>> + Send + '_>> {
        Box::pin(async move {
            self.merges.lock().unwrap().push(MergeCall {
                project_id,
                target_branch,
                branches: branches.clone(),
            });

            if let Some(error) = &self.merge_error {
                return Err(SwarmError::Other(anyhow::anyhow!(error.clone())));
            }

            Ok(MergeResult {
                success: self.conflicts.is_empty(),
                merged: branches,
                conflicts: self.conflicts.clone(),
                pushed: self.conflicts.is_empty(),
                push_error: None,
            })
        })
    }

    fn open_pull_request(
        &self,
        project_id: String,
        task_id: String,
        _title: String,
        _body: String,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PullRequest>>> + Send + '_>> {
        Box::pin(async move {
            let mut prs = self.prs.lock().unwrap();
            prs.push((project_id, task_id));
            Ok(Some(PullRequest {
                number: prs.len() as u64,
                url: format!("https://example.invalid/pr/{}", prs.len()),
            }))
        })
    }
}
