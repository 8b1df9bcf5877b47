// tests/branch_integration.rs

use std::error::Error;
use std::sync::Arc;

use swarmdag::engine::{
    Collaborators, Integration, IntegrationSettings, MemoryStore, Session, SessionOptions,
};
use swarmdag::engine::integrate::group_variants;
use swarmdag::types::{SwarmRequest, SwarmStatus};
use swarmdag_test_utils::builders::{SwarmRequestBuilder, TaskDefinitionBuilder};
use swarmdag_test_utils::fake_executor::{Script, ScriptedExecutor};
use swarmdag_test_utils::fakes::{FakeIntegrator, RecordingPublisher};
use swarmdag_test_utils::{FAST_POLL, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Two variants of T-1, one standalone task T-2.
fn variants_request() -> SwarmRequest {
    SwarmRequestBuilder::new()
        .with_task(TaskDefinitionBuilder::new("v1").task_id("T-1").project_id("web").build())
        .with_task(TaskDefinitionBuilder::new("v2").task_id("T-1").project_id("web").build())
        .with_task(TaskDefinitionBuilder::new("solo").task_id("T-2").build())
        .build()
}

async fn run_with(
    executor: ScriptedExecutor,
    integration: Integration,
    swarm_id: &str,
    req: SwarmRequest,
) -> (swarmdag::dag::SwarmSummary, MemoryStore) {
    let store = MemoryStore::new();
    let collab = Collaborators::new(
        Arc::new(executor),
        Arc::new(RecordingPublisher::new()),
        Arc::new(store.clone()),
    )
    .with_integration(integration);
    let session = Session::new(
        swarm_id,
        req,
        collab,
        SessionOptions {
            poll_interval: FAST_POLL,
        },
    )
    .expect("valid request");
    let summary = with_timeout(session.execute()).await;
    (summary, store)
}

#[tokio::test]
async fn variants_sharing_task_id_are_merged() -> TestResult {
    init_tracing();

    let integrator = FakeIntegrator::new();
    let integration = Integration::new(
        Arc::new(integrator.clone()),
        IntegrationSettings {
            open_pull_request: true,
            ..IntegrationSettings::default()
        },
    );

    let (summary, _) = run_with(ScriptedExecutor::new(), integration, "sw1", variants_request()).await;

    let calls = integrator.merge_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].project_id, "web");
    assert_eq!(calls[0].target_branch, "main");
    assert_eq!(calls[0].branches, vec!["sw1-v1", "sw1-v2"]);
    assert_eq!(
        integrator.pull_requests(),
        vec![("web".to_string(), "T-1".to_string())]
    );

    let report = summary.integration.ok_or("no integration report")?;
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].task_keys, vec!["v1", "v2"]);
    assert!(report.groups[0].pull_request.is_some());
    assert!(!report.has_conflicts());
    Ok(())
}

#[tokio::test]
async fn conflicts_are_reported_but_swarm_stays_completed() -> TestResult {
    init_tracing();

    let integrator = FakeIntegrator::new().with_conflicts(&["src/app.ts"]);
    let integration = Integration::new(
        Arc::new(integrator.clone()),
        IntegrationSettings {
            open_pull_request: true,
            ..IntegrationSettings::default()
        },
    );

    let (summary, store) =
        run_with(ScriptedExecutor::new(), integration, "sw2", variants_request()).await;

    assert!(summary.success);
    let report = summary.integration.as_ref().ok_or("no integration report")?;
    assert!(report.has_conflicts());
    // No PR for a failed merge.
    assert!(integrator.pull_requests().is_empty());

    let state = store.load("sw2").ok_or("no snapshot")?;
    assert_eq!(state.status, SwarmStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn merge_errors_are_recorded_not_raised() -> TestResult {
    init_tracing();

    let integrator = FakeIntegrator::new().with_merge_error("git host down");
    let integration = Integration::new(Arc::new(integrator), IntegrationSettings::default());

    let (summary, store) =
        run_with(ScriptedExecutor::new(), integration, "sw3", variants_request()).await;

    let report = summary.integration.ok_or("no integration report")?;
    assert_eq!(report.groups[0].merge, None);
    assert!(report.groups[0].error.as_deref().unwrap_or_default().contains("git host down"));
    assert_eq!(store.load("sw3").map(|s| s.status), Some(SwarmStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn integration_skipped_unless_swarm_completed() -> TestResult {
    init_tracing();

    let integrator = FakeIntegrator::new();
    let integration = Integration::new(Arc::new(integrator.clone()), IntegrationSettings::default());
    let executor = ScriptedExecutor::new().with_script("solo", Script::fail("nope"));

    let (summary, _) = run_with(executor, integration, "sw4", variants_request()).await;

    assert!(!summary.success);
    assert!(summary.integration.is_none());
    assert!(integrator.merge_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn custom_namer_and_base_ref_shape_branch_names() -> TestResult {
    init_tracing();

    let integrator = FakeIntegrator::new();
    let integration = Integration::new(
        Arc::new(integrator.clone()),
        IntegrationSettings {
            base_ref: Some("release".to_string()),
            target_branch: "develop".to_string(),
            open_pull_request: false,
        },
    )
    .with_namer(Arc::new(|base: &str, key: &str| format!("{base}/{key}")));

    run_with(ScriptedExecutor::new(), integration, "sw5", variants_request()).await;

    let calls = integrator.merge_calls();
    assert_eq!(calls[0].branches, vec!["release/v1", "release/v2"]);
    assert_eq!(calls[0].target_branch, "develop");
    assert!(integrator.pull_requests().is_empty());
    Ok(())
}

#[test]
fn grouping_keeps_first_appearance_order_and_ignores_unfinished() -> TestResult {
    let req = SwarmRequestBuilder::new()
        .with_task(TaskDefinitionBuilder::new("b1").task_id("B").build())
        .with_task(TaskDefinitionBuilder::new("a1").task_id("A").build())
        .with_task(TaskDefinitionBuilder::new("b2").task_id("B").build())
        .with_task(TaskDefinitionBuilder::new("a2").task_id("A").build())
        .build();
    let mut scheduler = swarmdag::dag::Scheduler::new(req.tasks)?;
    let now = chrono::Utc::now();
    for key in ["b1", "a1", "b2"] {
        scheduler.mark_running(key, format!("run-{key}"), now);
        scheduler.apply_poll(key, swarmdag::exec::PollResult::completed(Default::default()), now);
    }

    let groups = group_variants(scheduler.tasks());
    let keys: Vec<Vec<&str>> = groups
        .iter()
        .map(|g| g.iter().map(|t| t.key.as_str()).collect())
        .collect();
    assert_eq!(keys, vec![vec!["b1", "b2"], vec!["a1"]]);
    Ok(())
}
