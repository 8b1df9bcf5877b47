// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use swarmdag::config::{load_and_validate, load_from_path};
use swarmdag::errors::SwarmError;
use swarmdag::types::TaskStatus;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("Swarm.toml");
    fs::write(&path, body).expect("write config");
    path
}

const FULL: &str = r#"
[swarm]
agent_id = "planner"
max_concurrent = 2
global_timeout_seconds = 90
deviation_rules = "stay in scope"

[scheduler]
poll_interval_ms = 250
state_dir = "state"

[worker]
cmd = "./run-agent.sh"

[[task]]
key = "schema"
title = "Design schema"
task_id = "T-1"
project_id = "P-1"
execution_prompt = "design it"

[[task]]
key = "api"
title = "Build API"
task_id = "T-2"
project_id = "P-1"
execution_prompt = "build it"
model = "opus"
timeout_seconds = 600
dependencies = ["schema"]
"#;

#[test]
fn full_file_maps_to_request_and_options() -> TestResult {
    let dir = TempDir::new()?;
    let file = load_and_validate(write_config(&dir, FULL))?;

    let req = file.to_request();
    assert_eq!(req.agent_id, "planner");
    assert_eq!(req.max_concurrent, 2);
    assert_eq!(req.global_timeout_seconds, 90);
    assert_eq!(req.deviation_rules, "stay in scope");

    let keys: Vec<&str> = req.tasks.iter().map(|t| t.key.as_str()).collect();
    assert_eq!(keys, vec!["schema", "api"]);
    assert_eq!(req.tasks[1].model.as_deref(), Some("opus"));
    assert_eq!(req.tasks[1].timeout_seconds, Some(600));
    assert_eq!(req.tasks[1].dependencies, vec!["schema"]);

    assert_eq!(file.session_options().poll_interval, Duration::from_millis(250));
    assert_eq!(file.scheduler.state_dir, PathBuf::from("state"));
    assert_eq!(file.worker.cmd, "./run-agent.sh");

    let scheduler = swarmdag::dag::Scheduler::new(req.tasks)?;
    assert_eq!(scheduler.status_of("schema"), Some(TaskStatus::Ready));
    assert_eq!(scheduler.status_of("api"), Some(TaskStatus::Pending));
    Ok(())
}

#[test]
fn sections_fall_back_to_defaults() -> TestResult {
    let dir = TempDir::new()?;
    let body = r#"
[worker]
cmd = "true"

[[task]]
key = "only"
title = "Only"
task_id = "T-1"
project_id = "P-1"
execution_prompt = "go"
"#;
    let file = load_and_validate(write_config(&dir, body))?;

    assert_eq!(file.swarm.max_concurrent, 3);
    assert_eq!(file.swarm.global_timeout_seconds, 1800);
    assert_eq!(file.scheduler.poll_interval_ms, 2500);
    assert_eq!(file.scheduler.state_dir, PathBuf::from(".swarmdag"));
    assert!(file.swarm.deviation_rules.is_empty());
    Ok(())
}

#[test]
fn empty_task_list_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let err = load_and_validate(write_config(&dir, "[worker]\ncmd = \"true\"\n")).unwrap_err();
    assert!(matches!(err, SwarmError::ConfigError(_)), "got {err:?}");

    // Parsing alone accepts it.
    let raw = load_from_path(dir.path().join("Swarm.toml"))?;
    assert!(raw.task.is_empty());
    Ok(())
}

#[test]
fn zero_concurrency_and_blank_worker_are_rejected() -> TestResult {
    let dir = TempDir::new()?;

    let zero = FULL.replace("max_concurrent = 2", "max_concurrent = 0");
    assert!(matches!(
        load_and_validate(write_config(&dir, &zero)),
        Err(SwarmError::ConfigError(_))
    ));

    let blank = FULL.replace("cmd = \"./run-agent.sh\"", "cmd = \"  \"");
    assert!(matches!(
        load_and_validate(write_config(&dir, &blank)),
        Err(SwarmError::ConfigError(_))
    ));

    let no_poll = FULL.replace("poll_interval_ms = 250", "poll_interval_ms = 0");
    assert!(matches!(
        load_and_validate(write_config(&dir, &no_poll)),
        Err(SwarmError::ConfigError(_))
    ));
    Ok(())
}

#[test]
fn dag_errors_surface_through_the_loader() -> TestResult {
    let dir = TempDir::new()?;

    let missing = FULL.replace(r#"dependencies = ["schema"]"#, r#"dependencies = ["ghost"]"#);
    assert!(matches!(
        load_and_validate(write_config(&dir, &missing)),
        Err(SwarmError::MissingDependency { .. })
    ));

    let cyclic = FULL.replace(
        "execution_prompt = \"design it\"",
        "execution_prompt = \"design it\"\ndependencies = [\"api\"]",
    );
    assert!(matches!(
        load_and_validate(write_config(&dir, &cyclic)),
        Err(SwarmError::DagCycle(_))
    ));
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let dir = TempDir::new()?;
    let err = load_and_validate(write_config(&dir, "[worker\ncmd = 1")).unwrap_err();
    assert!(matches!(err, SwarmError::TomlError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Swarm.toml").unwrap_err();
    assert!(matches!(err, SwarmError::IoError(_)), "got {err:?}");
}
