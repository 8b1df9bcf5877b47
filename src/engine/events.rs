// src/engine/events.rs

//! Typed notifications emitted by a session, and the sinks that receive them.
//!
//! Events are a side channel: publishing is best-effort and a failed publish
//! never changes scheduling state. The persisted snapshot is authoritative.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::SwarmSummary;
use crate::errors::{Result, SwarmError};
use crate::types::{RunId, SwarmId, SwarmStatus, TaskKey};

/// One event per task transition, plus the final swarm outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SwarmEvent {
    #[serde(rename = "task_started")]
    TaskStarted {
        key: TaskKey,
        title: String,
        run_id: RunId,
    },
    #[serde(rename = "task_completed")]
    TaskCompleted {
        key: TaskKey,
        title: String,
        run_id: RunId,
        outputs: BTreeMap<String, String>,
        duration_ms: u64,
    },
    #[serde(rename = "task_failed")]
    TaskFailed {
        key: TaskKey,
        title: String,
        run_id: Option<RunId>,
        error: String,
        duration_ms: u64,
    },
    #[serde(rename = "task_skipped")]
    TaskSkipped {
        key: TaskKey,
        title: String,
        blocked_by: Vec<TaskKey>,
    },
    #[serde(rename = "swarm:completed")]
    SwarmCompleted { summary: SwarmSummary },
    #[serde(rename = "swarm:failed")]
    SwarmFailed {
        status: SwarmStatus,
        summary: SwarmSummary,
    },
}

impl SwarmEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SwarmEvent::TaskStarted { .. } => "task_started",
            SwarmEvent::TaskCompleted { .. } => "task_completed",
            SwarmEvent::TaskFailed { .. } => "task_failed",
            SwarmEvent::TaskSkipped { .. } => "task_skipped",
            SwarmEvent::SwarmCompleted { .. } => "swarm:completed",
            SwarmEvent::SwarmFailed { .. } => "swarm:failed",
        }
    }

    /// Task the event is about, if any.
    pub fn task_key(&self) -> Option<&str> {
        match self {
            SwarmEvent::TaskStarted { key, .. }
            | SwarmEvent::TaskCompleted { key, .. }
            | SwarmEvent::TaskFailed { key, .. }
            | SwarmEvent::TaskSkipped { key, .. } => Some(key),
            SwarmEvent::SwarmCompleted { .. } | SwarmEvent::SwarmFailed { .. } => None,
        }
    }
}

/// Destination for session events (pub-sub transport, UI push, logs...).
pub trait EventPublisher: Send + Sync {
    fn publish(
        &self,
        swarm_id: SwarmId,
        event: SwarmEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<(SwarmId, SwarmEvent)>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::Sender<(SwarmId, SwarmEvent)>) -> Self {
        Self { tx }
    }

    /// Create a publisher together with the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<(SwarmId, SwarmEvent)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(
        &self,
        swarm_id: SwarmId,
        event: SwarmEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            tx.send((swarm_id, event))
                .await
                .map_err(|e| SwarmError::Other(anyhow::anyhow!("event channel closed: {e}")))
        })
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(
        &self,
        swarm_id: SwarmId,
        event: SwarmEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match &event {
                SwarmEvent::SwarmCompleted { summary } => info!(
                    swarm_id = %swarm_id,
                    event = event.kind(),
                    completed = summary.completed,
                    duration_ms = summary.duration_ms,
                    "swarm event"
                ),
                SwarmEvent::SwarmFailed { status, summary } => warn!(
                    swarm_id = %swarm_id,
                    event = event.kind(),
                    status = %status,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    cancelled = summary.cancelled,
                    "swarm event"
                ),
                _ => info!(
                    swarm_id = %swarm_id,
                    event = event.kind(),
                    task = event.task_key().unwrap_or_default(),
                    "swarm event"
                ),
            }
            Ok(())
        })
    }
}

/// Delivers each event to several publishers.
///
/// Every sink is attempted; the first error (if any) is returned afterwards.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventPublisher>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventPublisher for FanoutPublisher {
    fn publish(
        &self,
        swarm_id: SwarmId,
        event: SwarmEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut first_err = None;
            for sink in &self.sinks {
                if let Err(e) = sink.publish(swarm_id.clone(), event.clone()).await {
                    first_err.get_or_insert(e);
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}
