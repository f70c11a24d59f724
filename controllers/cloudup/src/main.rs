//! cloudup
//!
//! Converges a VPC / VPN gateway topology in one pass. The pass runs against
//! an in-memory EC2 backend seeded from the topology's `existing` section and
//! renders to the target named by `CLOUDUP_TARGET`: applied directly, planned
//! (dry run), or written as Terraform JSON or a CloudFormation template.

mod config;
mod controller;
mod error;
mod topology;

use crate::config::Config;
use crate::error::ControllerError;
use crate::topology::Topology;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting cloudup");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Topology: {}", config.topology.display());
    info!("  Target: {}", config.target);
    info!("  Output directory: {}", config.output_dir.display());
    info!("  Max workers: {}", config.max_workers);

    let topology = Topology::load(&config.topology)?;
    let controller = Controller::new(config, &topology.region);
    controller.run(&topology).await?;

    Ok(())
}
