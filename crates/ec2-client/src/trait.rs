//! Ec2ClientTrait for mocking
//!
//! This trait abstracts the EC2 API so resource tasks can run against a real
//! SDK-backed client or the in-memory mock.

use crate::error::Ec2Error;
use crate::models::*;

/// Trait for EC2 API client operations
///
/// Describe calls take explicit ids (an implicit id filter) plus filters.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime,
/// and implementations must tolerate concurrent describe calls.
#[async_trait::async_trait]
pub trait Ec2ClientTrait: Send + Sync {
    /// Region this client talks to
    fn region(&self) -> &str;

    // VPC Operations
    async fn describe_vpcs(&self, vpc_ids: &[String], filters: &[Filter]) -> Result<Vec<Vpc>, Ec2Error>;
    async fn create_vpc(&self, cidr_block: &str) -> Result<Vpc, Ec2Error>;
    async fn modify_vpc_attribute(&self, vpc_id: &str, attribute: VpcAttribute) -> Result<(), Ec2Error>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), Ec2Error>;

    // VPN Gateway Operations
    async fn describe_vpn_gateways(&self, vpn_gateway_ids: &[String], filters: &[Filter]) -> Result<Vec<VpnGateway>, Ec2Error>;
    async fn create_vpn_gateway(&self, gateway_type: &str) -> Result<VpnGateway, Ec2Error>;
    async fn attach_vpn_gateway(&self, vpn_gateway_id: &str, vpc_id: &str) -> Result<VpcAttachment, Ec2Error>;
    async fn detach_vpn_gateway(&self, vpn_gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error>;
    async fn delete_vpn_gateway(&self, vpn_gateway_id: &str) -> Result<(), Ec2Error>;

    // Tag Operations
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), Ec2Error>;
    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), Ec2Error>;
}
