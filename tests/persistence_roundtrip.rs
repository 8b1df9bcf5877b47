// tests/persistence_roundtrip.rs

use std::error::Error;
use std::sync::Arc;

use swarmdag::engine::{
    Collaborators, JsonFileStore, Session, SessionOptions, SnapshotStore, SwarmSessionState,
};
use swarmdag::types::{SwarmStatus, TaskStatus};
use swarmdag_test_utils::builders::SwarmRequestBuilder;
use swarmdag_test_utils::fake_executor::{Script, ScriptedExecutor};
use swarmdag_test_utils::fakes::RecordingPublisher;
use swarmdag_test_utils::{FAST_POLL, init_tracing, with_timeout};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn final_snapshot_reloads_identically() -> TestResult {
    init_tracing();

    let tmp = TempDir::new()?;
    let store = JsonFileStore::new(tmp.path().join("state"));
    let executor = ScriptedExecutor::new()
        .with_script("A", Script::succeed_with(&[("commit", "abc123")]))
        .with_script("B", Script::fail("lint failed"));

    let collab = Collaborators::new(
        Arc::new(executor),
        Arc::new(RecordingPublisher::new()),
        Arc::new(store.clone()),
    );
    let req = SwarmRequestBuilder::new()
        .task("A", &[])
        .task("B", &["A"])
        .task("C", &["B"])
        .build();
    let session = Session::new(
        "swarm/json 1",
        req,
        collab,
        SessionOptions {
            poll_interval: FAST_POLL,
        },
    )?;
    let rx = session.subscribe();

    with_timeout(session.execute()).await;

    let published: SwarmSessionState = rx.borrow().clone();
    let reloaded = store
        .load("swarm/json 1")
        .await?
        .ok_or("snapshot file missing")?;

    assert_eq!(reloaded, published);
    assert_eq!(reloaded.status, SwarmStatus::Failed);
    assert_eq!(reloaded.status_of("C"), Some(TaskStatus::Skipped));
    assert_eq!(
        reloaded.task("A").and_then(|t| t.outputs.get("commit").cloned()),
        Some("abc123".to_string())
    );
    let summary = reloaded.summary.ok_or("summary missing")?;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);

    // Ids are encoded into a single file name inside the state dir.
    let path = store.path_for("swarm/json 1");
    assert_eq!(path.parent(), Some(store.dir()));
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn missing_snapshot_loads_as_none() -> TestResult {
    let tmp = TempDir::new()?;
    let store = JsonFileStore::new(tmp.path());

    assert!(store.load("never-ran").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn persist_overwrites_previous_snapshot() -> TestResult {
    let tmp = TempDir::new()?;
    let store = JsonFileStore::new(tmp.path());

    let session = Session::new(
        "overwrite",
        SwarmRequestBuilder::new().task("A", &[]).build(),
        Collaborators::new(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(RecordingPublisher::new()),
            Arc::new(store.clone()),
        ),
        SessionOptions::default(),
    )?;

    let mut snapshot = session.snapshot();
    store.persist(snapshot.clone()).await?;

    snapshot.running_count = 7;
    store.persist(snapshot.clone()).await?;

    let reloaded = store.load("overwrite").await?.ok_or("snapshot file missing")?;
    assert_eq!(reloaded, snapshot);
    Ok(())
}

fn snapshot_for(swarm_id: &str, store: &JsonFileStore) -> Result<SwarmSessionState, Box<dyn Error>> {
    let session = Session::new(
        swarm_id,
        SwarmRequestBuilder::new().task("A", &[]).build(),
        Collaborators::new(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(RecordingPublisher::new()),
            Arc::new(store.clone()),
        ),
        SessionOptions::default(),
    )?;
    Ok(session.snapshot())
}

#[tokio::test]
async fn similar_ids_get_separate_files() -> TestResult {
    let tmp = TempDir::new()?;
    let store = JsonFileStore::new(tmp.path());
    let ids = ["team/a", "team_a", "team.a", "team a", "team%2Fa"];

    for (i, id) in ids.iter().enumerate() {
        let mut snapshot = snapshot_for(id, &store)?;
        snapshot.running_count = i;
        store.persist(snapshot).await?;
    }

    let mut paths: Vec<_> = ids.iter().map(|id| store.path_for(id)).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), ids.len());

    for (i, id) in ids.iter().enumerate() {
        let reloaded = store.load(id).await?.ok_or("snapshot file missing")?;
        assert_eq!(reloaded.swarm_id, *id);
        assert_eq!(reloaded.running_count, i);
    }
    Ok(())
}

#[tokio::test]
async fn load_rejects_a_snapshot_of_another_swarm() -> TestResult {
    let tmp = TempDir::new()?;
    let store = JsonFileStore::new(tmp.path());

    store.persist(snapshot_for("team/a", &store)?).await?;
    std::fs::copy(store.path_for("team/a"), store.path_for("team_a"))?;

    assert!(store.load("team_a").await.is_err());
    assert!(store.load("team/a").await?.is_some());
    Ok(())
}
