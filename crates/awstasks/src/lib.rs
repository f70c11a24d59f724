//! EC2 resource tasks for the cloudup task-graph engine
//!
//! Each type here is a [`taskgraph::Resource`] reconciled against an
//! [`ec2_client::Ec2ClientTrait`] handle:
//!
//! - [`Vpc`]: owned VPCs are created and tagged; shared VPCs are only looked up
//! - [`VpnGateway`]: owned gateways are created; shared gateways are only
//!   attached to the desired VPC, never renamed or re-tagged
//!
//! ```ignore
//! use awstasks::{Vpc, VpnGateway};
//! use taskgraph::{Context, Reference, RunOptions, Target, TargetKind};
//!
//! let tasks = vec![
//!     awstasks::task(Vpc::shared("vpc1", Some("vpc-1".into()))),
//!     awstasks::task(VpnGateway::shared("vgw1", Some("vgw-1".into())).with_vpc(Reference::task("vpc1"))),
//! ];
//! let mut context = Context::new(Target::new(TargetKind::Direct), cloud, tasks);
//! context.run(RunOptions::default()).await?;
//! ```

pub mod cloud;
pub mod vpc;
pub mod vpn_gateway;

use std::sync::Arc;
use taskgraph::{Resource, Task};

pub use cloud::Cloud;
pub use vpc::Vpc;
pub use vpn_gateway::{VpnGateway, DEFAULT_GATEWAY_TYPE};

/// Box a resource as a graph task
pub fn task<R: Resource<Cloud>>(resource: R) -> Arc<dyn Task<Cloud>> {
    Arc::new(resource)
}
