//! Controller-specific error types.
//!
//! Engine and EC2 errors are wrapped here so `main` has one error type to
//! report.

use ec2_client::Ec2Error;
use taskgraph::EngineError;
use thiserror::Error;

/// Errors that can occur in the cloudup runner.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Topology file could not be loaded
    #[error("Invalid topology: {0:#}")]
    Topology(#[from] anyhow::Error),

    /// Seeding the in-memory backend failed
    #[error("EC2 error: {0}")]
    Ec2(#[from] Ec2Error),

    /// Planning or running the convergence pass failed
    #[error("Convergence error: {0}")]
    Engine(#[from] EngineError),

    /// Writing a declarative document failed
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
