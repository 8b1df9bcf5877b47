// tests/event_delivery.rs

use std::error::Error;
use std::sync::Arc;

use swarmdag::engine::{
    ChannelPublisher, Collaborators, EventPublisher, FanoutPublisher, MemoryStore, Session,
    SessionOptions, SwarmEvent, TracingPublisher,
};
use swarmdag_test_utils::builders::SwarmRequestBuilder;
use swarmdag_test_utils::fake_executor::ScriptedExecutor;
use swarmdag_test_utils::fakes::RecordingPublisher;
use swarmdag_test_utils::{FAST_POLL, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn channel_publisher_delivers_in_order() -> TestResult {
    init_tracing();

    let (publisher, mut rx) = ChannelPublisher::channel(64);
    let collab = Collaborators::new(
        Arc::new(ScriptedExecutor::new()),
        Arc::new(publisher),
        Arc::new(MemoryStore::new()),
    );
    let req = SwarmRequestBuilder::new().task("A", &[]).task("B", &["A"]).build();
    let session = Session::new(
        "swarm-chan",
        req,
        collab,
        SessionOptions {
            poll_interval: FAST_POLL,
        },
    )?;

    with_timeout(session.execute()).await;

    let mut kinds = Vec::new();
    while let Ok((swarm_id, event)) = rx.try_recv() {
        assert_eq!(swarm_id, "swarm-chan");
        kinds.push(event.kind());
    }
    assert_eq!(
        kinds,
        vec![
            "task_started",
            "task_completed",
            "task_started",
            "task_completed",
            "swarm:completed"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn closed_channel_is_a_publish_error() {
    let (publisher, rx) = ChannelPublisher::channel(1);
    drop(rx);

    let event = SwarmEvent::TaskSkipped {
        key: "A".into(),
        title: "A".into(),
        blocked_by: vec!["B".into()],
    };
    assert!(publisher.publish("s".into(), event).await.is_err());
}

#[tokio::test]
async fn fanout_reaches_every_sink_even_after_a_failure() {
    let failing = RecordingPublisher::failing();
    let healthy = RecordingPublisher::new();
    let fanout = FanoutPublisher::new()
        .with(Arc::new(failing.clone()))
        .with(Arc::new(TracingPublisher))
        .with(Arc::new(healthy.clone()));

    let event = SwarmEvent::TaskStarted {
        key: "A".into(),
        title: "Task A".into(),
        run_id: "run-1".into(),
    };
    let result = fanout.publish("s".into(), event).await;

    assert!(result.is_err());
    assert_eq!(failing.kinds(), vec!["task_started"]);
    assert_eq!(healthy.kinds(), vec!["task_started"]);
}

#[test]
fn events_serialize_with_wire_names() -> TestResult {
    let event = SwarmEvent::TaskFailed {
        key: "A".into(),
        title: "Task A".into(),
        run_id: None,
        error: "boom".into(),
        duration_ms: 0,
    };
    let json = serde_json::to_value(&event)?;
    assert_eq!(json["type"], "task_failed");
    assert_eq!(json["key"], "A");
    assert_eq!(event.task_key(), Some("A"));
    Ok(())
}
