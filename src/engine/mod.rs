// src/engine/mod.rs

//! Orchestration engine for swarmdag.
//!
//! This module ties together:
//! - the per-swarm scheduling loop ([`session`]) that drives a
//!   [`crate::dag::Scheduler`] against an executor
//! - the event side channel ([`events`])
//! - snapshot persistence ([`store`])
//! - post-success branch integration ([`integrate`])
//! - the registry of live sessions ([`orchestrator`])
//!
//! The scheduling semantics live in the pure `dag` core; everything here is
//! the async/IO shell around it.

pub mod events;
pub mod integrate;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod store;

pub use events::{ChannelPublisher, EventPublisher, FanoutPublisher, SwarmEvent, TracingPublisher};
pub use integrate::{
    BranchIntegrator, BranchNamer, DashedBranchNamer, GroupOutcome, Integration,
    IntegrationReport, IntegrationSettings, MergeResult, PullRequest,
};
pub use orchestrator::Orchestrator;
pub use session::{Collaborators, Session, SessionOptions, DEFAULT_POLL_INTERVAL};
pub use state::SwarmSessionState;
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
