// src/engine/store.rs

//! Snapshot persistence.
//!
//! The session writes its [`SwarmSessionState`] after every loop iteration
//! and once more when it finishes. Failures are logged by the caller and never
//! affect scheduling.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;

use crate::engine::state::SwarmSessionState;
use crate::errors::Result;
use crate::types::SwarmId;

/// Durable home for session snapshots.
pub trait SnapshotStore: Send + Sync {
    fn persist(
        &self,
        snapshot: SwarmSessionState,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Keeps the latest snapshot per swarm in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<SwarmId, StoredSnapshot>>>,
}

#[derive(Debug, Clone)]
struct StoredSnapshot {
    latest: SwarmSessionState,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, swarm_id: &str) -> Option<SwarmSessionState> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(swarm_id).map(|s| s.latest.clone())
    }

    /// How many times a snapshot for `swarm_id` has been written.
    pub fn writes(&self, swarm_id: &str) -> usize {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(swarm_id).map(|s| s.writes).unwrap_or(0)
    }
}

impl SnapshotStore for MemoryStore {
    fn persist(
        &self,
        snapshot: SwarmSessionState,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = guard
                .entry(snapshot.swarm_id.clone())
                .or_insert_with(|| StoredSnapshot {
                    latest: snapshot.clone(),
                    writes: 0,
                });
            entry.latest = snapshot;
            entry.writes += 1;
            Ok(())
        })
    }
}

/// Writes one pretty-printed JSON file per swarm into a directory.
///
/// Files are written to a temporary sibling and renamed into place, so a
/// reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the snapshot for `swarm_id`.
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are percent-encoded, so distinct ids
    /// always map to distinct file names.
    pub fn path_for(&self, swarm_id: &str) -> PathBuf {
        let mut name = String::with_capacity(swarm_id.len() + 5);
        for b in swarm_id.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                name.push(char::from(b));
            } else {
                name.push_str(&format!("%{b:02X}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    /// Reload the last persisted snapshot, if one exists.
    ///
    /// A file holding another swarm's snapshot is an error.
    pub async fn load(&self, swarm_id: &str) -> Result<Option<SwarmSessionState>> {
        let path = self.path_for(swarm_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: SwarmSessionState = serde_json::from_str(&contents)?;
        if snapshot.swarm_id != swarm_id {
            return Err(anyhow::anyhow!(
                "snapshot {:?} belongs to swarm '{}', not '{}'",
                path,
                snapshot.swarm_id,
                swarm_id
            )
            .into());
        }
        Ok(Some(snapshot))
    }
}

impl SnapshotStore for JsonFileStore {
    fn persist(
        &self,
        snapshot: SwarmSessionState,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .with_context(|| format!("creating state dir {:?}", self.dir))?;

            let path = self.path_for(&snapshot.swarm_id);
            let tmp = path.with_extension("json.tmp");
            let body = serde_json::to_vec_pretty(&snapshot)?;

            tokio::fs::write(&tmp, body)
                .await
                .with_context(|| format!("writing snapshot {:?}", tmp))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("moving snapshot into place at {:?}", path))?;
            Ok(())
        })
    }
}
