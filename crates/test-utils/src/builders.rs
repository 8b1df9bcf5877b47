#![allow(dead_code)]

use swarmdag::types::{SwarmRequest, TaskDefinition};

/// Builder for `SwarmRequest` to simplify test setup.
pub struct SwarmRequestBuilder {
    request: SwarmRequest,
}

impl SwarmRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: SwarmRequest::new("test-agent", Vec::new()),
        }
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.request.tasks.push(task);
        self
    }

    /// Shorthand for `with_task(TaskDefinitionBuilder::new(key).after(..).build())`.
    pub fn task(self, key: &str, deps: &[&str]) -> Self {
        let mut builder = TaskDefinitionBuilder::new(key);
        for dep in deps {
            builder = builder.after(dep);
        }
        self.with_task(builder.build())
    }

    pub fn agent_id(mut self, agent_id: &str) -> Self {
        self.request.agent_id = agent_id.to_string();
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.request.max_concurrent = n;
        self
    }

    pub fn global_timeout_seconds(mut self, secs: u64) -> Self {
        self.request.global_timeout_seconds = secs;
        self
    }

    pub fn deviation_rules(mut self, rules: &str) -> Self {
        self.request.deviation_rules = rules.to_string();
        self
    }

    pub fn build(self) -> SwarmRequest {
        self.request
    }
}

impl Default for SwarmRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskDefinition`.
///
/// Defaults: `title = "Task <key>"`, `task_id = "T-<key>"`, `project_id = "P-1"`.
pub struct TaskDefinitionBuilder {
    task: TaskDefinition,
}

impl TaskDefinitionBuilder {
    pub fn new(key: &str) -> Self {
        Self {
            task: TaskDefinition {
                key: key.to_string(),
                title: format!("Task {key}"),
                task_id: format!("T-{key}"),
                project_id: "P-1".to_string(),
                execution_prompt: format!("do {key}"),
                model: None,
                timeout_seconds: None,
                dependencies: vec![],
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn task_id(mut self, task_id: &str) -> Self {
        self.task.task_id = task_id.to_string();
        self
    }

    pub fn project_id(mut self, project_id: &str) -> Self {
        self.task.project_id = project_id.to_string();
        self
    }

    pub fn prompt(mut self, prompt: &str) -> Self {
        self.task.execution_prompt = prompt.to_string();
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.task.model = Some(model.to_string());
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.task.timeout_seconds = Some(secs);
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.task
    }
}
