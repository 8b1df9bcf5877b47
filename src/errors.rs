// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    MissingDependency { task: String, dependency: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("duplicate task key '{0}'")]
    DuplicateTask(String),

    #[error("swarm '{0}' already has a live session")]
    SwarmAlreadyRunning(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwarmError {
    /// Errors raised while validating a request, before any session exists.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            SwarmError::ConfigError(_)
                | SwarmError::MissingDependency { .. }
                | SwarmError::DagCycle(_)
                | SwarmError::DuplicateTask(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SwarmError>;
