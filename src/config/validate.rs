// src/config/validate.rs

use crate::config::model::{RawSwarmFile, SwarmFile};
use crate::dag::validate_tasks;
use crate::errors::{Result, SwarmError};

impl TryFrom<RawSwarmFile> for SwarmFile {
    type Error = SwarmError;

    fn try_from(raw: RawSwarmFile) -> std::result::Result<Self, Self::Error> {
        validate_swarm_file(&raw)?;
        Ok(SwarmFile::new_unchecked(raw))
    }
}

/// Section checks first, then the DAG validator.
pub fn validate_swarm_file(raw: &RawSwarmFile) -> Result<()> {
    ensure_has_tasks(raw)?;
    validate_sections(raw)?;
    validate_tasks(&raw.task)?;
    Ok(())
}

fn ensure_has_tasks(raw: &RawSwarmFile) -> Result<()> {
    if raw.task.is_empty() {
        return Err(SwarmError::ConfigError(
            "swarm file must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_sections(raw: &RawSwarmFile) -> Result<()> {
    if raw.swarm.max_concurrent == 0 {
        return Err(SwarmError::ConfigError(
            "[swarm].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }

    if raw.scheduler.poll_interval_ms == 0 {
        return Err(SwarmError::ConfigError(
            "[scheduler].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if raw.worker.cmd.trim().is_empty() {
        return Err(SwarmError::ConfigError(
            "[worker].cmd must not be empty".to_string(),
        ));
    }

    Ok(())
}
