// src/dag/graph.rs

use std::collections::HashMap;

use crate::types::{TaskDefinition, TaskKey};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Position of the task in the submitted definition list.
    index: usize,
    /// Direct dependencies: tasks that must complete before this one can run.
    deps: Vec<TaskKey>,
    /// Direct dependents: tasks that list this one as a dependency.
    dependents: Vec<TaskKey>,
}

/// In-memory DAG of one swarm, keyed by task key.
///
/// One instance per session; nothing here is shared between swarms. Acyclicity
/// and reference integrity are checked by [`crate::dag::validate`] before a
/// graph is built, so lookups for unknown keys simply return empty slices.
#[derive(Debug, Clone)]
pub struct DagGraph {
    /// Task keys in definition order.
    order: Vec<TaskKey>,
    nodes: HashMap<TaskKey, DagNode>,
}

impl DagGraph {
    /// Build a DAG from validated task definitions.
    pub fn from_definitions(tasks: &[TaskDefinition]) -> Self {
        let mut nodes: HashMap<TaskKey, DagNode> = HashMap::with_capacity(tasks.len());
        let mut order = Vec::with_capacity(tasks.len());

        for (index, task) in tasks.iter().enumerate() {
            order.push(task.key.clone());
            nodes.insert(
                task.key.clone(),
                DagNode {
                    index,
                    deps: task.dependencies.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        // Dependents are filled in definition order so traversal stays
        // deterministic.
        for task in tasks {
            for dep in &task.dependencies {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(task.key.clone());
                }
            }
        }

        Self { order, nodes }
    }

    /// All task keys, in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Position of `key` in the definition list.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.nodes.get(key).map(|n| n.index)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, key: &str) -> &[TaskKey] {
        self.nodes
            .get(key)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, key: &str) -> &[TaskKey] {
        self.nodes
            .get(key)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Keys with no dependencies, in definition order.
    pub fn roots(&self) -> Vec<&str> {
        self.tasks()
            .filter(|key| self.dependencies_of(key).is_empty())
            .collect()
    }
}
