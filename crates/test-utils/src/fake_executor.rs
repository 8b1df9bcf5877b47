use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use swarmdag::errors::{Result, SwarmError};
use swarmdag::exec::{ExecutorBackend, PollResult, SpawnRequest};
use swarmdag::types::{RunId, TaskKey};

/// What the fake worker does with one task.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report `running` for `polls` polls, then `completed` with `outputs`.
    Succeed {
        polls: usize,
        outputs: BTreeMap<String, String>,
    },
    /// Report `running` for `polls` polls, then `failed` with `error`.
    Fail { polls: usize, error: String },
    /// The spawn call itself errors.
    SpawnError(String),
    /// Report `running` forever.
    Hang,
}

impl Script {
    pub fn succeed() -> Self {
        Script::Succeed {
            polls: 0,
            outputs: BTreeMap::new(),
        }
    }

    pub fn succeed_with(outputs: &[(&str, &str)]) -> Self {
        Script::Succeed {
            polls: 0,
            outputs: outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn fail(error: &str) -> Self {
        Script::Fail {
            polls: 0,
            error: error.to_string(),
        }
    }
}

#[derive(Debug)]
struct Run {
    key: TaskKey,
    polls_seen: usize,
    poll_errors_left: usize,
    finished: bool,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<TaskKey, Script>,
    poll_errors: HashMap<TaskKey, usize>,
    default_polls: usize,
    runs: HashMap<RunId, Run>,
    spawn_order: Vec<TaskKey>,
    requests: Vec<SpawnRequest>,
    poll_calls: usize,
    running: usize,
    peak_running: usize,
}

/// A fake executor that:
/// - answers spawn and poll calls from a per-task [`Script`]
///   (unscripted tasks succeed)
/// - records spawn order, spawn requests and the peak number of tasks it
///   considered running at once.
///
/// Clones share state, so a test can keep one handle and give another to the
/// session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, key: &str, script: Script) -> Self {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert(key.to_string(), script);
        self
    }

    /// The first `n` polls of `key` error before the script takes over.
    pub fn with_poll_errors(self, key: &str, n: usize) -> Self {
        self.inner
            .lock()
            .unwrap()
            .poll_errors
            .insert(key.to_string(), n);
        self
    }

    /// Number of `running` answers unscripted tasks give before completing.
    pub fn with_default_polls(self, polls: usize) -> Self {
        self.inner.lock().unwrap().default_polls = polls;
        self
    }

    pub fn spawn_order(&self) -> Vec<TaskKey> {
        self.inner.lock().unwrap().spawn_order.clone()
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn request_for(&self, key: &str) -> Option<SpawnRequest> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .find(|r| r.task_key == key)
            .cloned()
    }

    pub fn spawn_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .spawn_order
            .iter()
            .filter(|k| *k == key)
            .count()
    }

    pub fn peak_running(&self) -> usize {
        self.inner.lock().unwrap().peak_running
    }

    pub fn poll_calls(&self) -> usize {
        self.inner.lock().unwrap().poll_calls
    }

    fn script_for(inner: &Inner, key: &str) -> Script {
        inner.scripts.get(key).cloned().unwrap_or(Script::Succeed {
            polls: inner.default_polls,
            outputs: BTreeMap::new(),
        })
    }
}

impl ExecutorBackend for ScriptedExecutor {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RunId>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let key = request.task_key.clone();
            inner.spawn_order.push(key.clone());
            inner.requests.push(request);

            if let Script::SpawnError(msg) = Self::script_for(&inner, &key) {
                return Err(SwarmError::Other(anyhow::anyhow!(msg)));
            }

            let run_id = format!("run-{}-{}", key, inner.spawn_order.len());
            let poll_errors_left = inner.poll_errors.get(&key).copied().unwrap_or(0);
            inner.runs.insert(
                run_id.clone(),
                Run {
                    key,
                    polls_seen: 0,
                    poll_errors_left,
                    finished: false,
                },
            );
            inner.running += 1;
            inner.peak_running = inner.peak_running.max(inner.running);
            Ok(run_id)
        })
    }

    fn poll(&self, run_id: RunId) -> Pin<Box<dyn Future<Output = Result<PollResult>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            inner.poll_calls += 1;

            let Some(run) = inner.runs.get_mut(&run_id) else {
                return Err(SwarmError::TaskNotFound(run_id));
            };

            if run.poll_errors_left > 0 {
                run.poll_errors_left -= 1;
                return Err(SwarmError::Other(anyhow::anyhow!(
                    "worker unreachable while polling {run_id}"
                )));
            }

            let script = inner.scripts.get(&run.key).cloned().unwrap_or(Script::Succeed {
                polls: inner.default_polls,
                outputs: BTreeMap::new(),
            });

            let result = match script {
                Script::Hang | Script::SpawnError(_) => PollResult::running(),
                Script::Succeed { polls, .. } | Script::Fail { polls, .. }
                    if run.polls_seen < polls =>
                {
                    run.polls_seen += 1;
                    PollResult::running()
                }
                Script::Succeed { outputs, .. } => PollResult::completed(outputs),
                Script::Fail { error, .. } => PollResult::failed(error),
            };

            let terminal = !matches!(result.status, swarmdag::exec::RemoteStatus::Running);
            if terminal && !run.finished {
                run.finished = true;
                inner.running -= 1;
            }
            Ok(result)
        })
    }
}
