// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `swarmdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "swarmdag",
    version,
    about = "Schedule a DAG of agent tasks onto an external worker.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the swarm file (TOML).
    #[arg(
        long,
        value_name = "PATH",
        env = "SWARMDAG_CONFIG",
        default_value = "Swarm.toml"
    )]
    pub config: String,

    /// Identifier for this swarm run. A random UUID is used when omitted.
    #[arg(long, value_name = "ID")]
    pub swarm_id: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SWARMDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't dispatch anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
