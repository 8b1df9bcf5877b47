// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cli::CliArgs;
use crate::config::{SwarmFile, load_and_validate};
use crate::dag::{Scheduler, SwarmSummary};
use crate::engine::{Collaborators, JsonFileStore, Orchestrator, SwarmSessionState, TracingPublisher};
use crate::exec::ProcessExecutor;
use crate::types::SwarmStatus;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - swarm file loading
/// - process executor, tracing event sink and JSON snapshot store
/// - the orchestrator running one session
/// - Ctrl-C handling
///
/// Returns `true` when the swarm completed successfully.
pub async fn run(args: CliArgs) -> Result<bool> {
    let file = load_and_validate(&args.config)
        .with_context(|| format!("loading swarm file {}", args.config))?;

    if args.dry_run {
        print_dry_run(&file)?;
        return Ok(true);
    }

    let swarm_id = args
        .swarm_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let executor = Arc::new(ProcessExecutor::new(file.worker.cmd.clone())?);
    let store = JsonFileStore::new(file.scheduler.state_dir.clone());
    let collab = Collaborators::new(
        executor.clone(),
        Arc::new(TracingPublisher),
        Arc::new(store.clone()),
    );
    let orchestrator = Orchestrator::new(collab, file.session_options());

    orchestrator.start(swarm_id.clone(), file.to_request()).await?;
    info!(swarm_id = %swarm_id, state = ?store.path_for(&swarm_id), "swarm started");

    // Ctrl-C → cooperative cancel of the swarm and its worker processes.
    {
        let orchestrator = orchestrator.clone();
        let executor = executor.clone();
        let swarm_id = swarm_id.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!(swarm_id = %swarm_id, "Ctrl-C received; cancelling swarm");
            orchestrator.cancel(&swarm_id);
            executor.shutdown();
        });
    }

    let final_state = match orchestrator.wait(&swarm_id).await {
        Some(state) => state,
        // The session finished before we subscribed; the store has the record.
        None => store
            .load(&swarm_id)
            .await?
            .with_context(|| format!("no final state recorded for swarm {swarm_id}"))?,
    };

    executor.shutdown();
    print_summary(&final_state);

    Ok(final_state.status == SwarmStatus::Completed)
}

/// Print one line per task plus totals.
fn print_summary(state: &SwarmSessionState) {
    println!("swarm {} finished: {}", state.swarm_id, state.status);

    let Some(summary) = &state.summary else {
        return;
    };

    for result in &summary.results {
        let duration = result
            .duration_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        match &result.error {
            Some(err) => println!(
                "  {:<10} {:<20} {:>8}  {}",
                result.status, result.key, duration, err
            ),
            None => println!("  {:<10} {:<20} {:>8}", result.status, result.key, duration),
        }
    }

    print_totals(summary);
}

fn print_totals(summary: &SwarmSummary) {
    println!(
        "total={} completed={} failed={} skipped={} cancelled={} duration={}ms",
        summary.total,
        summary.completed,
        summary.failed,
        summary.skipped,
        summary.cancelled,
        summary.duration_ms
    );

    if let Some(report) = &summary.integration {
        for group in &report.groups {
            let conflicts = group
                .merge
                .as_ref()
                .map(|m| m.conflicts.len())
                .unwrap_or(0);
            println!(
                "  integrated {} ({} branches, {} conflicts)",
                group.task_id,
                group.branches.len(),
                conflicts
            );
        }
    }
}

/// Print the tasks in definition order with the status each starts in.
fn print_dry_run(file: &SwarmFile) -> Result<()> {
    let scheduler = Scheduler::new(file.tasks.clone())?;

    println!("swarmdag dry-run");
    println!("  swarm.agent_id = {}", file.swarm.agent_id);
    println!("  swarm.max_concurrent = {}", file.swarm.max_concurrent);
    println!(
        "  swarm.global_timeout_seconds = {}",
        file.swarm.global_timeout_seconds
    );
    println!(
        "  scheduler.poll_interval_ms = {}",
        file.scheduler.poll_interval_ms
    );
    println!("  worker.cmd = {}", file.worker.cmd);
    println!();

    println!("tasks ({}):", scheduler.tasks().len());
    for task in scheduler.tasks() {
        println!("  - {} [{}]", task.key, task.status);
        println!("      title: {}", task.title);
        println!("      task_id: {}", task.task_id);
        if !task.dependencies.is_empty() {
            println!("      dependencies: {:?}", task.dependencies);
        }
        if let Some(def) = scheduler.definition(&task.key) {
            if let Some(model) = &def.model {
                println!("      model: {model}");
            }
            if let Some(timeout) = def.timeout_seconds {
                println!("      timeout_seconds: {timeout}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
