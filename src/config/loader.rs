// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawSwarmFile, SwarmFile};
use crate::errors::Result;

/// Read and deserialize a swarm file without semantic validation.
///
/// Use [`load_and_validate`] to also check the DAG and section values.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSwarmFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawSwarmFile = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a swarm file and run every check a request would face at start.
///
/// - Reads TOML and applies section defaults.
/// - Rejects empty task lists, `max_concurrent == 0`, a zero poll interval
///   and an empty worker command.
/// - Runs the DAG validator (unknown dependencies, duplicate keys, cycles).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SwarmFile> {
    let raw = load_from_path(&path)?;
    let file = SwarmFile::try_from(raw)?;
    Ok(file)
}

/// `Swarm.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Swarm.toml")
}
