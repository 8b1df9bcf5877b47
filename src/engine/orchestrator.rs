// src/engine/orchestrator.rs

//! Registry of live swarm sessions.
//!
//! The orchestrator validates and starts sessions, runs each one as an owned
//! background task, and forgets it once its loop returns. After that, the
//! snapshot store is the only record of the swarm.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::session::{Collaborators, Session, SessionOptions};
use crate::engine::state::SwarmSessionState;
use crate::errors::{Result, SwarmError};
use crate::types::{SwarmId, SwarmRequest};

/// Handles kept for a running session.
struct LiveSession {
    cancel: CancellationToken,
    state_rx: watch::Receiver<SwarmSessionState>,
    join: Option<JoinHandle<()>>,
}

enum Slot {
    /// Id reserved while the request is validated and first persisted.
    Starting,
    Live(LiveSession),
}

type Registry = Arc<Mutex<HashMap<SwarmId, Slot>>>;

/// Removes a session from the registry when its background task ends,
/// including by panic.
struct Deregister {
    registry: Registry,
    swarm_id: SwarmId,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.swarm_id);
        debug!(swarm_id = %self.swarm_id, "session removed from registry");
    }
}

/// Holds a `Slot::Starting` reservation until `start` either registers the
/// session or gives up. Dropping it armed, including when the caller drops
/// the `start` future mid-await, frees the id again.
struct Reservation {
    registry: Registry,
    swarm_id: SwarmId,
    armed: bool,
}

impl Reservation {
    /// Called with the registry lock held once the slot is `Live`.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut sessions = lock(&self.registry);
        if matches!(sessions.get(&self.swarm_id), Some(Slot::Starting)) {
            sessions.remove(&self.swarm_id);
            debug!(swarm_id = %self.swarm_id, "start abandoned; reservation released");
        }
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<SwarmId, Slot>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point for callers: start, cancel, inspect and await swarms.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Orchestrator {
    collab: Collaborators,
    options: SessionOptions,
    sessions: Registry,
}

impl Orchestrator {
    pub fn new(collab: Collaborators, options: SessionOptions) -> Self {
        Self {
            collab,
            options,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate `request`, persist its initial state and run it in the
    /// background.
    ///
    /// Fails if `swarm_id` already has a live session or the request is
    /// invalid; in both cases nothing new is registered or persisted.
    pub async fn start(
        &self,
        swarm_id: impl Into<SwarmId>,
        request: SwarmRequest,
    ) -> Result<SwarmSessionState> {
        let swarm_id = swarm_id.into();

        {
            let mut sessions = lock(&self.sessions);
            if sessions.contains_key(&swarm_id) {
                warn!(swarm_id = %swarm_id, "rejecting start: swarm already has a live session");
                return Err(SwarmError::SwarmAlreadyRunning(swarm_id));
            }
            sessions.insert(swarm_id.clone(), Slot::Starting);
        }
        let reservation = Reservation {
            registry: Arc::clone(&self.sessions),
            swarm_id: swarm_id.clone(),
            armed: true,
        };

        let session = match Session::new(
            swarm_id.clone(),
            request,
            self.collab.clone(),
            self.options.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                drop(reservation);
                warn!(swarm_id = %swarm_id, error = %e, "rejecting start: invalid swarm request");
                return Err(e);
            }
        };

        session.persist().await;
        let initial = session.snapshot();
        let cancel = session.cancel_token();
        let state_rx = session.subscribe();

        let deregister = Deregister {
            registry: Arc::clone(&self.sessions),
            swarm_id: swarm_id.clone(),
        };

        // Registered under the lock before the task can observe the registry,
        // so the task's own removal always happens after this insert.
        let mut sessions = lock(&self.sessions);
        let join = tokio::spawn(async move {
            let _deregister = deregister;
            let swarm_id = session.swarm_id().to_string();
            let summary = session.execute().await;
            if summary.success {
                info!(swarm_id = %swarm_id, "swarm session ended successfully");
            } else {
                warn!(
                    swarm_id = %swarm_id,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    cancelled = summary.cancelled,
                    "swarm session ended unsuccessfully"
                );
            }
        });
        sessions.insert(
            swarm_id.clone(),
            Slot::Live(LiveSession {
                cancel,
                state_rx,
                join: Some(join),
            }),
        );
        reservation.disarm();
        drop(sessions);

        info!(swarm_id = %swarm_id, "swarm session registered");
        Ok(initial)
    }

    /// Request cooperative cancellation. Returns `false` if no live session
    /// has this id.
    pub fn cancel(&self, swarm_id: &str) -> bool {
        match lock(&self.sessions).get(swarm_id) {
            Some(Slot::Live(live)) => {
                info!(swarm_id = %swarm_id, "cancellation requested");
                live.cancel.cancel();
                true
            }
            _ => {
                debug!(swarm_id = %swarm_id, "cancel for unknown or finished swarm; ignoring");
                false
            }
        }
    }

    /// Latest in-memory snapshot of a live session.
    pub fn get_state(&self, swarm_id: &str) -> Option<SwarmSessionState> {
        match lock(&self.sessions).get(swarm_id) {
            Some(Slot::Live(live)) => Some(live.state_rx.borrow().clone()),
            _ => None,
        }
    }

    pub fn is_live(&self, swarm_id: &str) -> bool {
        matches!(lock(&self.sessions).get(swarm_id), Some(Slot::Live(_)))
    }

    /// Ids of all live sessions, sorted.
    pub fn active_swarms(&self) -> Vec<SwarmId> {
        let mut ids: Vec<SwarmId> = lock(&self.sessions)
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Wait for a live session to finish and return its final snapshot.
    ///
    /// Returns `None` if no live session has this id.
    pub async fn wait(&self, swarm_id: &str) -> Option<SwarmSessionState> {
        let mut rx = match lock(&self.sessions).get(swarm_id) {
            Some(Slot::Live(live)) => live.state_rx.clone(),
            _ => return None,
        };

        loop {
            {
                let state = rx.borrow_and_update();
                if state.status.is_finished() {
                    return Some(state.clone());
                }
            }
            if rx.changed().await.is_err() {
                return Some(rx.borrow().clone());
            }
        }
    }

    /// Cancel every live session and wait for their loops to exit.
    pub async fn shutdown(&self) {
        let joins: Vec<(SwarmId, JoinHandle<()>)> = {
            let mut sessions = lock(&self.sessions);
            sessions
                .iter_mut()
                .filter_map(|(id, slot)| match slot {
                    Slot::Live(live) => {
                        live.cancel.cancel();
                        live.join.take().map(|j| (id.clone(), j))
                    }
                    Slot::Starting => None,
                })
                .collect()
        };

        info!(sessions = joins.len(), "orchestrator shutting down");

        for (swarm_id, join) in joins {
            if let Err(e) = join.await {
                warn!(swarm_id = %swarm_id, error = %e, "session task ended abnormally");
            }
        }
    }
}
