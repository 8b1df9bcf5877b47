// tests/process_executor.rs
#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use swarmdag::engine::{Collaborators, MemoryStore, Session, SessionOptions, TracingPublisher};
use swarmdag::exec::{ExecutorBackend, PollResult, ProcessExecutor, RemoteStatus, SpawnRequest};
use swarmdag::types::TaskStatus;
use swarmdag_test_utils::builders::{SwarmRequestBuilder, TaskDefinitionBuilder};
use swarmdag_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn request(key: &str, cancel: CancellationToken) -> SpawnRequest {
    let def = TaskDefinitionBuilder::new(key)
        .model("opus")
        .prompt("hello from stdin")
        .build();
    SpawnRequest::for_task("swarm-proc", "agent-7", "be careful", &def, cancel)
}

async fn poll_until_done(exec: &ProcessExecutor, run_id: &str) -> PollResult {
    loop {
        let result = exec.poll(run_id.to_string()).await.expect("known run");
        if result.status != RemoteStatus::Running {
            return result;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn set_output_lines_and_env_become_outputs() -> TestResult {
    init_tracing();

    let exec = ProcessExecutor::new(
        r#"read prompt; echo "::set-output prompt=$prompt"; echo "::set-output key=$SWARM_TASK_KEY"; echo "::set-output model=$SWARM_MODEL"; echo "::set-output rules=$SWARM_DEVIATION_RULES"; echo plain line"#,
    )?;

    let run_id = exec.spawn(request("api", CancellationToken::new())).await?;
    let result = with_timeout(poll_until_done(&exec, &run_id)).await;

    assert_eq!(result.status, RemoteStatus::Completed);
    assert_eq!(result.outputs.get("prompt").map(String::as_str), Some("hello from stdin"));
    assert_eq!(result.outputs.get("key").map(String::as_str), Some("api"));
    assert_eq!(result.outputs.get("model").map(String::as_str), Some("opus"));
    assert_eq!(result.outputs.get("rules").map(String::as_str), Some("be careful"));
    assert_eq!(result.outputs.get("exit_code").map(String::as_str), Some("0"));
    assert!(!result.outputs.contains_key("plain"));
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_with_stderr_tail() -> TestResult {
    init_tracing();

    let exec = ProcessExecutor::new("echo 'compile error' >&2; exit 3")?;

    let run_id = exec.spawn(request("build", CancellationToken::new())).await?;
    let result = with_timeout(poll_until_done(&exec, &run_id)).await;

    assert_eq!(result.status, RemoteStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("compile error"));
    assert_eq!(result.outputs.get("exit_code").map(String::as_str), Some("3"));
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_the_process() -> TestResult {
    init_tracing();

    let exec = ProcessExecutor::new("sleep 30")?;
    let cancel = CancellationToken::new();

    let run_id = exec.spawn(request("slow", cancel.clone())).await?;
    assert_eq!(exec.poll(run_id.clone()).await?.status, RemoteStatus::Running);

    cancel.cancel();
    let result = with_timeout(poll_until_done(&exec, &run_id)).await;

    assert_eq!(result.status, RemoteStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    Ok(())
}

#[tokio::test]
async fn finished_run_is_forgotten_after_its_result_is_read() -> TestResult {
    init_tracing();

    let exec = ProcessExecutor::new("cat >/dev/null; true")?;
    let first = exec.spawn(request("one", CancellationToken::new())).await?;
    let second = exec.spawn(request("two", CancellationToken::new())).await?;
    assert_eq!(exec.tracked_runs(), 2);

    let result = with_timeout(poll_until_done(&exec, &first)).await;
    assert_eq!(result.status, RemoteStatus::Completed);
    assert_eq!(exec.tracked_runs(), 1);
    assert!(exec.poll(first).await.is_err());

    with_timeout(poll_until_done(&exec, &second)).await;
    assert_eq!(exec.tracked_runs(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_run_is_an_error() -> TestResult {
    let exec = ProcessExecutor::new("true")?;
    assert!(exec.poll("nope".to_string()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn session_runs_a_chain_of_shell_tasks() -> TestResult {
    init_tracing();

    let exec = Arc::new(ProcessExecutor::new(
        r#"cat >/dev/null; if [ "$SWARM_TASK_KEY" = "bad" ]; then exit 1; fi; echo "::set-output done=$SWARM_TASK_KEY""#,
    )?);
    let store = MemoryStore::new();
    let collab = Collaborators::new(exec.clone(), Arc::new(TracingPublisher), Arc::new(store));

    let req = SwarmRequestBuilder::new()
        .task("first", &[])
        .task("second", &["first"])
        .task("bad", &[])
        .task("after_bad", &["bad"])
        .build();
    let session = Session::new(
        "swarm-shell",
        req,
        collab,
        SessionOptions {
            poll_interval: Duration::from_millis(10),
        },
    )?;

    let summary = with_timeout(session.execute()).await;
    exec.shutdown();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    let second = summary.result("second").ok_or("missing second")?;
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.outputs.get("done").map(String::as_str), Some("second"));
    Ok(())
}
