//! Shared setup for the EC2 task tests

#![allow(dead_code)]

use awstasks::Cloud;
use ec2_client::{MockEc2Client, Tag, VpcAttachment};
use std::sync::Arc;
use taskgraph::{Context, EngineError, RunOptions, RunReport, Target, TargetKind, Task};

pub fn mock() -> Arc<MockEc2Client> {
    Arc::new(MockEc2Client::new("us-test-1"))
}

pub fn seed_vpc(mock: &MockEc2Client, id: &str, cidr: &str, name: &str) {
    mock.add_vpc(ec2_client::Vpc {
        vpc_id: id.to_string(),
        cidr_block: cidr.to_string(),
        state: "available".to_string(),
        enable_dns_support: true,
        enable_dns_hostnames: false,
        tags: vec![Tag::new("Name", name)],
    });
}

pub fn seed_vpn_gateway(mock: &MockEc2Client, id: &str, name: Option<&str>, attached_to: Option<&str>) {
    mock.add_vpn_gateway(ec2_client::VpnGateway {
        vpn_gateway_id: id.to_string(),
        state: "available".to_string(),
        gateway_type: "ipsec.1".to_string(),
        vpc_attachments: attached_to
            .map(|vpc_id| VpcAttachment {
                vpc_id: vpc_id.to_string(),
                state: "attached".to_string(),
            })
            .into_iter()
            .collect(),
        tags: name.map(|n| Tag::new("Name", n)).into_iter().collect(),
    });
}

pub fn context(kind: TargetKind, mock: &Arc<MockEc2Client>, tasks: Vec<Arc<dyn Task<Cloud>>>) -> Context<Cloud> {
    let cloud: Arc<Cloud> = mock.clone();
    Context::new(Target::new(kind), cloud, tasks)
}

/// One full pass against the mock
pub async fn converge(
    kind: TargetKind,
    mock: &Arc<MockEc2Client>,
    tasks: Vec<Arc<dyn Task<Cloud>>>,
) -> Result<RunReport, EngineError> {
    context(kind, mock, tasks).run(RunOptions::default()).await
}
