// src/exec/process.rs

//! Local worker that runs each task as a shell process.
//!
//! The configured command is started once per task via `sh -c` (or `cmd /C`
//! on Windows). Task parameters are exported as `SWARM_*` environment
//! variables and the execution prompt is written to stdin. Stdout lines of the
//! form `::set-output name=value` become task outputs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{Result, SwarmError};
use crate::exec::backend::{ExecutorBackend, PollResult, SpawnRequest};
use crate::types::RunId;

const OUTPUT_PATTERN: &str = r"^::set-output\s+([A-Za-z0-9_.\-]+)=(.*)$";
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
enum RunSlot {
    Running,
    Finished(PollResult),
}

type RunTable = Arc<Mutex<HashMap<RunId, RunSlot>>>;

/// Executor backend that runs tasks as child processes of this binary.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    cmd: String,
    output_re: Regex,
    runs: RunTable,
    shutdown: CancellationToken,
}

impl ProcessExecutor {
    pub fn new(cmd: impl Into<String>) -> Result<Self> {
        let output_re = Regex::new(OUTPUT_PATTERN).context("compiling output pattern")?;
        Ok(Self {
            cmd: cmd.into(),
            output_re,
            runs: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        })
    }

    /// Runs whose terminal result has not been collected by `poll` yet.
    pub fn tracked_runs(&self) -> usize {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Kill every child process that is still running.
    pub fn shutdown(&self) {
        info!("process executor shutting down; killing live task processes");
        self.shutdown.cancel();
    }

    fn build_command(&self, request: &SpawnRequest) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("SWARM_ID", &request.swarm_id)
            .env("SWARM_AGENT_ID", &request.agent_id)
            .env("SWARM_TASK_KEY", &request.task_key)
            .env("SWARM_TASK_TITLE", &request.title)
            .env("SWARM_TASK_ID", &request.task_id)
            .env("SWARM_PROJECT_ID", &request.project_id)
            .env("SWARM_DEVIATION_RULES", &request.deviation_rules);
        if let Some(model) = &request.model {
            cmd.env("SWARM_MODEL", model);
        }
        if let Some(secs) = request.timeout_seconds {
            cmd.env("SWARM_TIMEOUT_SECONDS", secs.to_string());
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_inner(&self, request: SpawnRequest) -> Result<RunId> {
        let mut child = self
            .build_command(&request)
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", request.task_key))?;

        let run_id = Uuid::new_v4().to_string();
        info!(
            task = %request.task_key,
            run_id = %run_id,
            cmd = %self.cmd,
            "started task process"
        );

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.execution_prompt.clone();
            let task = request.task_key.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(task = %task, error = %e, "could not write prompt to stdin");
                }
            });
        }

        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id.clone(), RunSlot::Running);

        tokio::spawn(supervise(
            child,
            request,
            run_id.clone(),
            Arc::clone(&self.runs),
            self.output_re.clone(),
            self.shutdown.clone(),
        ));

        Ok(run_id)
    }
}

impl ExecutorBackend for ProcessExecutor {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RunId>> + Send + '_>> {
        Box::pin(async move { self.spawn_inner(request) })
    }

    fn poll(
        &self,
        run_id: RunId,
    ) -> Pin<Box<dyn Future<Output = Result<PollResult>> + Send + '_>> {
        let runs = Arc::clone(&self.runs);
        Box::pin(async move {
            let mut guard = runs.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.get(&run_id) {
                Some(RunSlot::Running) => Ok(PollResult::running()),
                // A terminal result is handed out once, then forgotten.
                Some(RunSlot::Finished(_)) => match guard.remove(&run_id) {
                    Some(RunSlot::Finished(result)) => Ok(result),
                    _ => Err(SwarmError::TaskNotFound(format!("unknown run '{run_id}'"))),
                },
                None => Err(SwarmError::TaskNotFound(format!("unknown run '{run_id}'"))),
            }
        })
    }
}

/// Wait for a task process to finish (or be cancelled) and record its result.
async fn supervise(
    mut child: Child,
    request: SpawnRequest,
    run_id: RunId,
    runs: RunTable,
    output_re: Regex,
    shutdown: CancellationToken,
) {
    let stdout_reader = child
        .stdout
        .take()
        .map(|out| tokio::spawn(collect_outputs(out, output_re)));
    let stderr_reader = child
        .stderr
        .take()
        .map(|err| tokio::spawn(collect_tail(err, STDERR_TAIL_LINES)));

    let result = tokio::select! {
        status = child.wait() => {
            let mut outputs = match stdout_reader {
                Some(handle) => handle.await.unwrap_or_default(),
                None => BTreeMap::new(),
            };
            let stderr_tail = match stderr_reader {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };

            match status {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    info!(
                        task = %request.task_key,
                        run_id = %run_id,
                        exit_code = code,
                        success = status.success(),
                        "task process exited"
                    );
                    outputs.insert("exit_code".to_string(), code.to_string());
                    if status.success() {
                        PollResult::completed(outputs)
                    } else {
                        let mut failed = PollResult::failed(if stderr_tail.is_empty() {
                            format!("process exited with code {code}")
                        } else {
                            stderr_tail
                        });
                        failed.outputs = outputs;
                        failed
                    }
                }
                Err(e) => PollResult::failed(format!("waiting for task process: {e}")),
            }
        }

        _ = request.cancel.cancelled() => {
            kill(&mut child, &request.task_key, &run_id).await;
            PollResult::failed("cancelled")
        }

        _ = shutdown.cancelled() => {
            kill(&mut child, &request.task_key, &run_id).await;
            PollResult::failed("executor shut down")
        }
    };

    runs.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(run_id, RunSlot::Finished(result));
}

async fn kill(child: &mut Child, task: &str, run_id: &str) {
    info!(task = %task, run_id = %run_id, "killing task process");
    if let Err(e) = child.kill().await {
        warn!(task = %task, run_id = %run_id, error = %e, "failed to kill task process");
    }
}

async fn collect_outputs<R>(stream: R, output_re: Regex) -> BTreeMap<String, String>
where
    R: AsyncRead + Unpin,
{
    let mut outputs = BTreeMap::new();
    let mut lines = BufReader::new(stream).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(caps) = output_re.captures(&line) {
            outputs.insert(caps[1].to_string(), caps[2].trim_end().to_string());
        } else {
            debug!("stdout: {}", line);
        }
    }

    outputs
}

async fn collect_tail<R>(stream: R, keep: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail: VecDeque<String> = VecDeque::with_capacity(keep);
    let mut lines = BufReader::new(stream).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        debug!("stderr: {}", line);
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}
