//! Runner configuration from environment variables

use crate::error::ControllerError;
use std::env;
use std::path::PathBuf;
use taskgraph::{DEFAULT_MAX_WORKERS, TargetKind};

/// Settings for one convergence pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the topology YAML document
    pub topology: PathBuf,
    pub target: TargetKind,
    /// Where declarative documents are written
    pub output_dir: PathBuf,
    pub max_workers: usize,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    ///
    /// - `CLOUDUP_TOPOLOGY` (required)
    /// - `CLOUDUP_TARGET`: `direct`, `dryrun`, `terraform` or `cloudformation` (default `dryrun`)
    /// - `CLOUDUP_OUTPUT_DIR` (default `out`)
    /// - `CLOUDUP_MAX_WORKERS` (default 8)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let topology = lookup("CLOUDUP_TOPOLOGY")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ControllerError::InvalidConfig("CLOUDUP_TOPOLOGY environment variable is required".to_string())
            })?;

        let target = match lookup("CLOUDUP_TARGET") {
            Some(value) => value.parse().map_err(|e: String| {
                ControllerError::InvalidConfig(format!("CLOUDUP_TARGET: {}", e))
            })?,
            None => TargetKind::DryRun,
        };

        let output_dir = lookup("CLOUDUP_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("out"));

        let max_workers = match lookup("CLOUDUP_MAX_WORKERS") {
            Some(value) => match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "CLOUDUP_MAX_WORKERS must be a positive integer, got {:?}",
                        value
                    )));
                }
            },
            None => DEFAULT_MAX_WORKERS,
        };

        Ok(Self {
            topology,
            target,
            output_dir,
            max_workers,
        })
    }
}
