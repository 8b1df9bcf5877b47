// src/config/mod.rs

//! Swarm file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a swarm file from disk (`loader.rs`).
//! - Validate section values and the task DAG (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{RawSwarmFile, SchedulerSection, SwarmFile, SwarmSection, WorkerSection};
pub use validate::validate_swarm_file;
