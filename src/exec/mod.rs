// src/exec/mod.rs

//! Execution layer: the boundary to the worker that actually runs tasks.
//!
//! - [`backend`] provides the `ExecutorBackend` trait plus the spawn/poll
//!   payload types the session exchanges with a worker.
//! - [`process`] provides `ProcessExecutor`, a local worker that runs one
//!   shell process per task.

pub mod backend;
pub mod process;

pub use backend::{ExecutorBackend, PollResult, RemoteStatus, SpawnRequest};
pub use process::ProcessExecutor;
