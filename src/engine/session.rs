// src/engine/session.rs

//! The per-swarm scheduling loop.
//!
//! A [`Session`] owns one swarm's [`Scheduler`] and drives it through
//! dispatch -> poll -> cascade -> persist until every task is terminal or the
//! session is cancelled (explicitly or by the global timeout). Iterations are
//! strictly sequential; spawn and poll calls inside one step are fanned out
//! concurrently and joined before the next step starts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{PollTransition, Scheduler, SwarmSummary};
use crate::engine::events::{EventPublisher, SwarmEvent};
use crate::engine::integrate::Integration;
use crate::engine::state::SwarmSessionState;
use crate::engine::store::SnapshotStore;
use crate::errors::{Result, SwarmError};
use crate::exec::{ExecutorBackend, SpawnRequest};
use crate::types::{SwarmId, SwarmRequest, SwarmStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Deadline used when `global_timeout_seconds` is too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Knobs for the scheduling loop that are not part of a request.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Pause between loop iterations.
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// External services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn ExecutorBackend>,
    pub publisher: Arc<dyn EventPublisher>,
    pub store: Arc<dyn SnapshotStore>,
    /// Post-success branch integration; skipped when `None`.
    pub integration: Option<Integration>,
}

impl Collaborators {
    pub fn new(
        executor: Arc<dyn ExecutorBackend>,
        publisher: Arc<dyn EventPublisher>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            executor,
            publisher,
            store,
            integration: None,
        }
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = Some(integration);
        self
    }
}

/// Request parameters that stay fixed for the lifetime of a session.
#[derive(Debug, Clone)]
struct SessionMeta {
    swarm_id: SwarmId,
    agent_id: String,
    max_concurrent: usize,
    global_timeout_seconds: u64,
    deviation_rules: String,
    created_at: DateTime<Utc>,
}

/// One swarm's scheduling loop and everything it owns.
pub struct Session {
    meta: SessionMeta,
    scheduler: Scheduler,
    collab: Collaborators,
    options: SessionOptions,
    cancel: CancellationToken,
    started: Instant,
    deadline: Instant,
    timed_out: bool,
    status: SwarmStatus,
    finished_at: Option<DateTime<Utc>>,
    summary: Option<SwarmSummary>,
    state_tx: watch::Sender<SwarmSessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("meta", &self.meta)
            .field("scheduler", &self.scheduler)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate `request` and build the initial task states.
    ///
    /// Fails without side effects on an invalid DAG or `max_concurrent == 0`.
    /// The global timeout starts counting here.
    pub fn new(
        swarm_id: impl Into<SwarmId>,
        request: SwarmRequest,
        collab: Collaborators,
        options: SessionOptions,
    ) -> Result<Self> {
        if request.max_concurrent == 0 {
            return Err(SwarmError::ConfigError(
                "max_concurrent must be >= 1 (got 0)".to_string(),
            ));
        }

        let scheduler = Scheduler::new(request.tasks)?;
        let meta = SessionMeta {
            swarm_id: swarm_id.into(),
            agent_id: request.agent_id,
            max_concurrent: request.max_concurrent,
            global_timeout_seconds: request.global_timeout_seconds,
            deviation_rules: request.deviation_rules,
            created_at: Utc::now(),
        };

        let started = Instant::now();
        let deadline = started
            .checked_add(Duration::from_secs(meta.global_timeout_seconds))
            .unwrap_or_else(|| started + FAR_FUTURE);
        let initial = build_snapshot(&meta, &scheduler, SwarmStatus::Running, None, None);
        let (state_tx, _) = watch::channel(initial);

        Ok(Self {
            meta,
            scheduler,
            collab,
            options,
            cancel: CancellationToken::new(),
            started,
            deadline,
            timed_out: false,
            status: SwarmStatus::Running,
            finished_at: None,
            summary: None,
            state_tx,
        })
    }

    pub fn swarm_id(&self) -> &str {
        &self.meta.swarm_id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Token that requests cooperative cancellation when fired.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver that sees every snapshot the session publishes.
    pub fn subscribe(&self) -> watch::Receiver<SwarmSessionState> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> SwarmSessionState {
        let mut snapshot = build_snapshot(
            &self.meta,
            &self.scheduler,
            self.status,
            self.finished_at,
            self.summary.clone(),
        );
        snapshot.updated_at = Utc::now();
        snapshot
    }

    /// Publish the current snapshot to subscribers and the store.
    ///
    /// Store failures are logged and otherwise ignored.
    pub async fn persist(&self) {
        let snapshot = self.snapshot();
        self.state_tx.send_replace(snapshot.clone());

        if let Err(e) = self.collab.store.persist(snapshot).await {
            warn!(swarm_id = %self.meta.swarm_id, error = %e, "failed to persist swarm snapshot");
        }
    }

    /// Run the loop to completion and return the final summary.
    pub async fn execute(mut self) -> SwarmSummary {
        info!(
            swarm_id = %self.meta.swarm_id,
            tasks = self.scheduler.tasks().len(),
            max_concurrent = self.meta.max_concurrent,
            global_timeout_seconds = self.meta.global_timeout_seconds,
            "swarm session started"
        );

        let mut cancelled = false;

        loop {
            if self.cancellation_requested() {
                cancelled = true;
                break;
            }

            self.dispatch().await;
            self.poll().await;
            self.cascade().await;
            self.persist().await;

            if self.scheduler.all_terminal() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                _ = tokio::time::sleep_until(self.deadline) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        self.finish(cancelled).await
    }

    /// Checked once at the top of every iteration.
    fn cancellation_requested(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            info!(swarm_id = %self.meta.swarm_id, "cancellation observed; stopping swarm");
            return true;
        }

        if Instant::now() >= self.deadline {
            warn!(
                swarm_id = %self.meta.swarm_id,
                global_timeout_seconds = self.meta.global_timeout_seconds,
                "global timeout reached; cancelling swarm"
            );
            self.timed_out = true;
            self.cancel.cancel();
            return true;
        }

        false
    }

    async fn dispatch(&mut self) {
        let batch = self.scheduler.next_dispatch_batch(self.meta.max_concurrent);
        if batch.is_empty() {
            return;
        }

        debug!(
            swarm_id = %self.meta.swarm_id,
            tasks = ?batch.iter().map(|d| d.key.as_str()).collect::<Vec<_>>(),
            running = self.scheduler.running_count(),
            "dispatching ready tasks"
        );

        let spawns = batch.iter().map(|def| {
            let request = SpawnRequest::for_task(
                &self.meta.swarm_id,
                &self.meta.agent_id,
                &self.meta.deviation_rules,
                def,
                self.cancel.child_token(),
            );
            let executor = Arc::clone(&self.collab.executor);
            async move {
                let key = request.task_key.clone();
                let result = executor.spawn(request).await;
                (key, result)
            }
        });
        let results = join_all(spawns).await;

        let now = Utc::now();
        for (key, result) in results {
            let title = self.title_of(&key);
            match result {
                Ok(run_id) => {
                    if self.scheduler.mark_running(&key, run_id.clone(), now) {
                        self.publish(SwarmEvent::TaskStarted { key, title, run_id })
                            .await;
                    }
                }
                Err(e) => {
                    let error = e.to_string();
                    if self.scheduler.mark_dispatch_failed(&key, error.clone(), now) {
                        self.publish(SwarmEvent::TaskFailed {
                            key,
                            title,
                            run_id: None,
                            error,
                            duration_ms: 0,
                        })
                        .await;
                    }
                }
            }
        }
    }

    async fn poll(&mut self) {
        let runs = self.scheduler.running_runs();
        if runs.is_empty() {
            return;
        }

        let polls = runs.into_iter().map(|(key, run_id)| {
            let executor = Arc::clone(&self.collab.executor);
            async move {
                let result = executor.poll(run_id.clone()).await;
                (key, run_id, result)
            }
        });
        let results = join_all(polls).await;

        let now = Utc::now();
        for (key, run_id, result) in results {
            let result = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!(
                        swarm_id = %self.meta.swarm_id,
                        task = %key,
                        run_id = %run_id,
                        error = %e,
                        "poll failed; retrying next iteration"
                    );
                    continue;
                }
            };

            match self.scheduler.apply_poll(&key, result, now) {
                PollTransition::Completed => {
                    let event = match self.scheduler.task(&key) {
                        Some(task) => SwarmEvent::TaskCompleted {
                            key: task.key.clone(),
                            title: task.title.clone(),
                            run_id,
                            outputs: task.outputs.clone(),
                            duration_ms: task.duration_ms().unwrap_or(0),
                        },
                        None => continue,
                    };
                    self.publish(event).await;
                }
                PollTransition::Failed => {
                    let event = match self.scheduler.task(&key) {
                        Some(task) => SwarmEvent::TaskFailed {
                            key: task.key.clone(),
                            title: task.title.clone(),
                            run_id: Some(run_id),
                            error: task.error.clone().unwrap_or_default(),
                            duration_ms: task.duration_ms().unwrap_or(0),
                        },
                        None => continue,
                    };
                    self.publish(event).await;
                }
                PollTransition::Unchanged => {}
            }
        }
    }

    async fn cascade(&mut self) {
        let step = self.scheduler.cascade(Utc::now());
        if step.is_empty() {
            return;
        }

        debug!(
            swarm_id = %self.meta.swarm_id,
            ready = ?step.newly_ready,
            skipped = step.newly_skipped.len(),
            rounds = step.rounds,
            "cascade reached fixed point"
        );

        for skipped in step.newly_skipped {
            let title = self.title_of(&skipped.key);
            self.publish(SwarmEvent::TaskSkipped {
                key: skipped.key,
                title,
                blocked_by: skipped.blocked_by,
            })
            .await;
        }
    }

    async fn finish(mut self, cancelled: bool) -> SwarmSummary {
        let now = Utc::now();
        self.scheduler.sweep_cancelled(now);

        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut summary = self.scheduler.summary(duration_ms);

        self.status = if cancelled {
            SwarmStatus::Cancelled
        } else if summary.success {
            SwarmStatus::Completed
        } else {
            SwarmStatus::Failed
        };

        if self.status == SwarmStatus::Completed {
            if let Some(integration) = &self.collab.integration {
                let report = integration
                    .integrate(&self.meta.swarm_id, self.scheduler.tasks())
                    .await;
                summary.integration = Some(report);
            }
        }

        self.summary = Some(summary.clone());
        self.finished_at = Some(now);

        let event = if self.status == SwarmStatus::Completed {
            SwarmEvent::SwarmCompleted {
                summary: summary.clone(),
            }
        } else {
            SwarmEvent::SwarmFailed {
                status: self.status,
                summary: summary.clone(),
            }
        };
        self.publish(event).await;
        self.persist().await;

        info!(
            swarm_id = %self.meta.swarm_id,
            status = %self.status,
            timed_out = self.timed_out,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "swarm session finished"
        );

        summary
    }

    async fn publish(&self, event: SwarmEvent) {
        let kind = event.kind();
        if let Err(e) = self
            .collab
            .publisher
            .publish(self.meta.swarm_id.clone(), event)
            .await
        {
            warn!(swarm_id = %self.meta.swarm_id, event = kind, error = %e, "failed to publish event");
        }
    }

    fn title_of(&self, key: &str) -> String {
        self.scheduler
            .task(key)
            .map(|t| t.title.clone())
            .unwrap_or_default()
    }
}

fn build_snapshot(
    meta: &SessionMeta,
    scheduler: &Scheduler,
    status: SwarmStatus,
    finished_at: Option<DateTime<Utc>>,
    summary: Option<SwarmSummary>,
) -> SwarmSessionState {
    SwarmSessionState {
        swarm_id: meta.swarm_id.clone(),
        agent_id: meta.agent_id.clone(),
        status,
        tasks: scheduler.tasks().to_vec(),
        max_concurrent: meta.max_concurrent,
        running_count: scheduler.running_count(),
        global_timeout_seconds: meta.global_timeout_seconds,
        created_at: meta.created_at,
        updated_at: meta.created_at,
        finished_at,
        summary,
    }
}
