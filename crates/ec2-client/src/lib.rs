//! EC2 API boundary for cloudup
//!
//! Resource tasks talk to the cloud only through [`Ec2ClientTrait`]. The crate
//! ships the models and filter types those calls use, and an in-memory
//! [`MockEc2Client`] (feature `test-util`) that reproduces identifier
//! allocation, tag storage and filter evaluation of the real API.
//!
//! # Example
//!
//! ```ignore
//! use ec2_client::{Ec2ClientTrait, Filter, MockEc2Client};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MockEc2Client::new("us-east-1");
//! let vpc = client.create_vpc("172.20.0.0/16").await?;
//! let vgw = client.create_vpn_gateway("ipsec.1").await?;
//! client.attach_vpn_gateway(&vgw.vpn_gateway_id, &vpc.vpc_id).await?;
//!
//! let attached = client
//!     .describe_vpn_gateways(&[], &[Filter::new("attachment.vpc-id", [vpc.vpc_id.clone()])])
//!     .await?;
//! assert_eq!(attached.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod ec2_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::Ec2Error;
pub use models::*;
pub use ec2_trait::Ec2ClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockEc2Client, MockCall};
