//! One convergence pass
//!
//! Loads the topology, seeds the in-memory EC2 backend with the resources it
//! lists as existing, runs every task against the configured target and
//! writes the resulting documents.

use crate::config::Config;
use crate::error::ControllerError;
use crate::topology::Topology;
use awstasks::Cloud;
use ec2_client::MockEc2Client;
use std::sync::Arc;
use taskgraph::{Context, EngineError, RunOptions, RunReport, Target};
use tracing::{error, info, warn};

/// Runs a topology against one target
#[derive(Debug)]
pub struct Controller {
    config: Config,
    client: Arc<MockEc2Client>,
}

impl Controller {
    pub fn new(config: Config, region: &str) -> Self {
        Self {
            config,
            client: Arc::new(MockEc2Client::new(region)),
        }
    }

    /// Backend the pass runs against
    pub fn client(&self) -> &Arc<MockEc2Client> {
        &self.client
    }

    /// Seed the backend and run one pass over the topology's tasks
    pub async fn run(&self, topology: &Topology) -> Result<RunReport, ControllerError> {
        topology.seed(&self.client)?;

        let cloud: Arc<Cloud> = self.client.clone();
        let mut context = Context::new(Target::new(self.config.target), cloud, topology.tasks());
        info!(
            "Running {} task(s) against target {} (run {})",
            topology.tasks.len(),
            self.config.target,
            context.run_id()
        );

        let report = match context.run(RunOptions::with_max_workers(self.config.max_workers)).await {
            Ok(report) => report,
            Err(EngineError::Failed(failure)) => {
                for task in &failure.failures {
                    error!("{}", task);
                }
                for skipped in &failure.skipped {
                    warn!("{} skipped: a dependency failed", skipped);
                }
                return Err(EngineError::Failed(failure).into());
            }
            Err(e) => return Err(e.into()),
        };

        match context.target() {
            Target::DryRun(plan) => print!("{}", plan.summary()),
            target => {
                if let Some(path) = target.write_to(&self.config.output_dir)? {
                    info!("Wrote {}", path.display());
                }
            }
        }

        let changed = report.changed();
        if changed.is_empty() {
            info!("Converged: no changes");
        } else {
            info!("Converged: {} task(s) changed: {}", changed.len(), changed.join(", "));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec2_client::MockCall;
    use std::path::PathBuf;
    use taskgraph::{TargetKind, TERRAFORM_FILE};

    const EXAMPLE: &str = include_str!("../topology.example.yaml");

    fn config(target: TargetKind, output_dir: PathBuf) -> Config {
        Config {
            topology: PathBuf::from("topology.example.yaml"),
            target,
            output_dir,
            max_workers: 2,
        }
    }

    #[tokio::test]
    async fn test_direct_pass_attaches_shared_gateway() {
        let topology = Topology::parse(EXAMPLE).unwrap();
        let controller = Controller::new(config(TargetKind::Direct, PathBuf::from("unused")), &topology.region);

        let report = controller.run(&topology).await.unwrap();
        assert_eq!(report.changed(), vec!["vgw1"]);
        assert_eq!(
            controller.client().call_log(),
            vec![MockCall::AttachVpnGateway {
                vpn_gateway_id: "vgw-1".to_string(),
                vpc_id: "vpc-1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_terraform_pass_writes_document() {
        let topology = Topology::parse(EXAMPLE).unwrap();
        let dir = std::env::temp_dir().join(format!("cloudup-{}", std::process::id()));
        let controller = Controller::new(config(TargetKind::Terraform, dir.clone()), &topology.region);

        controller.run(&topology).await.unwrap();
        let written = std::fs::read_to_string(dir.join(TERRAFORM_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(
            doc["resource"]["aws_vpn_gateway_attachment"]["vgw1"]["vpn_gateway_id"],
            "vgw-1"
        );
        assert!(controller.client().call_log().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_pass_is_an_error() {
        let topology = Topology::parse(
            "tasks:\n  - kind: vpnGateway\n    name: vgw1\n    shared: true\n    id: vgw-404\n",
        )
        .unwrap();
        let controller = Controller::new(config(TargetKind::Direct, PathBuf::from("unused")), &topology.region);

        let err = controller.run(&topology).await.unwrap_err();
        assert!(matches!(err, ControllerError::Engine(EngineError::Failed(_))));
    }
}
