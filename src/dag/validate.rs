// src/dag/validate.rs

//! Construction-time checks for a swarm's task graph.
//!
//! Pure and synchronous. A request that fails here never produces a session.

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, SwarmError};
use crate::types::TaskDefinition;

/// Run every graph check, in order: unique keys, known dependencies, no cycles.
pub fn validate_tasks(tasks: &[TaskDefinition]) -> Result<()> {
    ensure_unique_keys(tasks)?;
    ensure_dependencies_exist(tasks)?;
    ensure_acyclic(tasks)?;
    Ok(())
}

fn ensure_unique_keys(tasks: &[TaskDefinition]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.key.as_str()) {
            return Err(SwarmError::DuplicateTask(task.key.clone()));
        }
    }
    Ok(())
}

fn ensure_dependencies_exist(tasks: &[TaskDefinition]) -> Result<()> {
    let keys: HashSet<&str> = tasks.iter().map(|t| t.key.as_str()).collect();
    for task in tasks {
        for dep in &task.dependencies {
            if !keys.contains(dep.as_str()) {
                return Err(SwarmError::MissingDependency {
                    task: task.key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn ensure_acyclic(tasks: &[TaskDefinition]) -> Result<()> {
    // Edge direction: dep -> task. A task listing itself is a self-loop,
    // which the sort reports like any other cycle.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in tasks {
        graph.add_node(task.key.as_str());
    }

    for task in tasks {
        for dep in &task.dependencies {
            graph.add_edge(dep.as_str(), task.key.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SwarmError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}
