//! Topology documents
//!
//! A topology lists the resources that already exist in the account (used to
//! seed the in-memory EC2 backend) and the desired tasks:
//!
//! ```yaml
//! region: us-east-1
//! existing:
//!   vpcs:
//!     - id: vpc-1
//!       cidr: 172.20.0.0/16
//!       name: ExistingVPC
//!   vpnGateways:
//!     - id: vgw-1
//!       name: ExistingVpnGateway
//! tasks:
//!   - kind: vpc
//!     name: vpc1
//!     shared: true
//!     id: vpc-1
//!   - kind: vpnGateway
//!     name: vgw1
//!     shared: true
//!     id: vgw-1
//!     vpc: vpc1
//! ```

use anyhow::{Context as _, bail};
use awstasks::{Cloud, Vpc, VpnGateway};
use ec2_client::{Ec2Error, MockEc2Client, Tag, VpcAttachment};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use taskgraph::{Lifecycle, Reference, Task};
use tracing::debug;

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Topology {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub existing: Existing,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// Resources present before the pass
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Existing {
    #[serde(default)]
    pub vpcs: Vec<ExistingVpc>,
    #[serde(default)]
    pub vpn_gateways: Vec<ExistingVpnGateway>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExistingVpc {
    pub id: String,
    pub cidr: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExistingVpnGateway {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// VPC the gateway is already attached to
    pub attached_to: Option<String>,
}

/// One desired task
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskSpec {
    Vpc(VpcSpec),
    VpnGateway(VpnGatewaySpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub shared: bool,
    pub id: Option<String>,
    pub cidr: Option<String>,
    pub enable_dns_support: Option<bool>,
    pub enable_dns_hostnames: Option<bool>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnGatewaySpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub shared: bool,
    pub id: Option<String>,
    /// Name of the VPC task to attach to
    pub vpc: Option<String>,
    /// Literal id of a VPC outside the topology
    pub vpc_id: Option<String>,
    #[serde(rename = "type")]
    pub gateway_type: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl VpcSpec {
    fn to_task(&self) -> Vpc {
        let mut vpc = if self.shared {
            Vpc::shared(&self.name, self.id.clone())
        } else {
            Vpc::new(&self.name)
        };
        vpc.lifecycle = self.lifecycle;
        vpc.cidr = self.cidr.clone();
        vpc.enable_dns_support = self.enable_dns_support;
        vpc.enable_dns_hostnames = self.enable_dns_hostnames;
        vpc.tags = self.tags.clone();
        vpc
    }
}

impl VpnGatewaySpec {
    fn to_task(&self) -> VpnGateway {
        let mut vgw = if self.shared {
            VpnGateway::shared(&self.name, self.id.clone())
        } else {
            VpnGateway::new(&self.name)
        };
        vgw.lifecycle = self.lifecycle;
        vgw.vpc = match (&self.vpc, &self.vpc_id) {
            (Some(task), _) => Some(Reference::task(task)),
            (None, Some(id)) => Some(Reference::id(id)),
            (None, None) => None,
        };
        if let Some(gateway_type) = &self.gateway_type {
            vgw.gateway_type = gateway_type.clone();
        }
        vgw.tags = self.tags.clone();
        vgw
    }
}

fn with_name(name: Option<&String>, tags: &BTreeMap<String, String>) -> Vec<Tag> {
    let mut tags = tags.clone();
    if let Some(name) = name {
        tags.insert(ec2_client::NAME_TAG.to_string(), name.clone());
    }
    ec2_client::map_to_tags(&tags)
}

impl Topology {
    /// Parse a YAML topology
    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        let topology: Self = serde_yaml::from_str(yaml).context("failed to parse topology YAML")?;
        topology.check()?;
        Ok(topology)
    }

    /// Read and parse a topology file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topology file {}", path.display()))?;
        Self::parse(&yaml).with_context(|| format!("in topology file {}", path.display()))
    }

    fn check(&self) -> anyhow::Result<()> {
        for spec in &self.tasks {
            if let TaskSpec::VpnGateway(vgw) = spec {
                if vgw.vpc.is_some() && vgw.vpc_id.is_some() {
                    bail!("VPN gateway {} sets both vpc and vpcId", vgw.name);
                }
            }
            if let TaskSpec::Vpc(VpcSpec { name, shared: false, id: Some(_), .. })
            | TaskSpec::VpnGateway(VpnGatewaySpec { name, shared: false, id: Some(_), .. }) = spec
            {
                bail!("task {} sets an id but is not shared", name);
            }
        }
        Ok(())
    }

    /// Load the existing resources into the in-memory backend
    pub fn seed(&self, client: &MockEc2Client) -> Result<(), Ec2Error> {
        for vpc in &self.existing.vpcs {
            debug!("seeding VPC {}", vpc.id);
            client.add_vpc(ec2_client::Vpc {
                vpc_id: vpc.id.clone(),
                cidr_block: vpc.cidr.clone(),
                state: "available".to_string(),
                enable_dns_support: true,
                enable_dns_hostnames: false,
                tags: with_name(vpc.name.as_ref(), &vpc.tags),
            });
        }

        let vpc_ids: HashSet<String> = client.vpc_ids().into_iter().collect();
        for vgw in &self.existing.vpn_gateways {
            debug!("seeding VPN gateway {}", vgw.id);
            let vpc_attachments = match &vgw.attached_to {
                Some(vpc_id) if !vpc_ids.contains(vpc_id) => {
                    return Err(Ec2Error::NotFound(format!(
                        "VPN gateway {} is attached to unknown VPC {}",
                        vgw.id, vpc_id
                    )));
                }
                Some(vpc_id) => vec![VpcAttachment {
                    vpc_id: vpc_id.clone(),
                    state: "attached".to_string(),
                }],
                None => Vec::new(),
            };
            client.add_vpn_gateway(ec2_client::VpnGateway {
                vpn_gateway_id: vgw.id.clone(),
                state: "available".to_string(),
                gateway_type: awstasks::DEFAULT_GATEWAY_TYPE.to_string(),
                vpc_attachments,
                tags: with_name(vgw.name.as_ref(), &vgw.tags),
            });
        }
        Ok(())
    }

    /// Desired tasks, in document order
    pub fn tasks(&self) -> Vec<Arc<dyn Task<Cloud>>> {
        self.tasks
            .iter()
            .map(|spec| match spec {
                TaskSpec::Vpc(vpc) => awstasks::task(vpc.to_task()),
                TaskSpec::VpnGateway(vgw) => awstasks::task(vgw.to_task()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARED: &str = include_str!("../topology.example.yaml");

    #[test]
    fn test_parse_example() {
        let topology = Topology::parse(SHARED).unwrap();
        assert_eq!(topology.region, "us-east-1");
        assert_eq!(topology.existing.vpcs.len(), 1);
        assert_eq!(topology.existing.vpn_gateways.len(), 1);

        let names: Vec<String> = topology.tasks().iter().map(|t| t.task_name().to_string()).collect();
        assert_eq!(names, vec!["vpc1", "vgw1"]);
        assert_eq!(topology.tasks()[1].task_dependencies(), vec!["vpc1"]);
    }

    #[test]
    fn test_seed_keeps_ids_and_names() {
        let topology = Topology::parse(SHARED).unwrap();
        let client = MockEc2Client::new(&topology.region);
        topology.seed(&client).unwrap();

        let vgw = client.find_vpn_gateway("vgw-1").unwrap();
        assert_eq!(vgw.tags, vec![Tag::new("Name", "ExistingVpnGateway")]);
        assert!(vgw.vpc_attachments.is_empty());
        assert_eq!(client.vpc_ids(), vec!["vpc-1"]);
        assert!(client.call_log().is_empty());
    }

    #[test]
    fn test_owned_gateway_defaults() {
        let topology = Topology::parse(
            "tasks:\n  - kind: vpc\n    name: main\n    cidr: 10.0.0.0/16\n  - kind: vpnGateway\n    name: gw\n    vpcId: vpc-9\n",
        )
        .unwrap();
        let TaskSpec::VpnGateway(spec) = &topology.tasks[1] else {
            panic!("expected a VPN gateway");
        };
        let vgw = spec.to_task();
        assert_eq!(vgw.gateway_type, awstasks::DEFAULT_GATEWAY_TYPE);
        assert_eq!(vgw.vpc, Some(Reference::id("vpc-9")));
        assert!(!vgw.ownership.is_shared());
        assert!(topology.tasks()[1].task_dependencies().is_empty());
    }

    #[test]
    fn test_rejects_inconsistent_documents() {
        assert!(Topology::parse("tasks:\n  - kind: subnet\n    name: s\n").is_err());
        assert!(Topology::parse("tasks:\n  - kind: vpc\n    name: v\n    id: vpc-1\n").is_err());
        assert!(
            Topology::parse("tasks:\n  - kind: vpnGateway\n    name: g\n    vpc: v\n    vpcId: vpc-1\n").is_err()
        );
    }

    #[test]
    fn test_attachment_to_unknown_vpc() {
        let topology =
            Topology::parse("existing:\n  vpnGateways:\n    - id: vgw-1\n      attachedTo: vpc-404\n").unwrap();
        let client = MockEc2Client::new("us-east-1");
        assert!(matches!(topology.seed(&client), Err(Ec2Error::NotFound(_))));
    }
}
