// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the owned adjacency of one swarm's tasks.
//! - [`validate`] rejects unknown dependencies, duplicate keys and cycles.
//! - [`task_info`] provides the per-task state and its transition rules.
//! - [`state_manager`] is the cascade engine (ready / skip propagation).
//! - [`scheduler`] is the synchronous per-swarm core the session loop drives.
//! - [`scheduler_step`] defines the result type of a cascade pass.
//! - [`summary`] builds the end-of-run report.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod summary;
pub mod task_info;
pub mod validate;

pub use graph::DagGraph;
pub use scheduler::{PollTransition, Scheduler};
pub use scheduler_step::{CascadeStep, SkippedTask};
pub use summary::{SwarmSummary, TaskResult};
pub use task_info::TaskState;
pub use validate::validate_tasks;
