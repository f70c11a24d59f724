//! Mock EC2 client for unit testing
//!
//! This module provides an in-memory implementation of [`Ec2ClientTrait`] that
//! can be used in tests (and offline runs) without AWS credentials.
//!
//! The mock is organized into domain-specific modules:
//! - `vpcs.rs` - VPC operations
//! - `vpn_gateways.rs` - VPN gateway operations (attach/detach included)
//! - `tags.rs` - tag storage and `tag:` filter evaluation
//!
//! Identifiers are allocated per prefix (`vpc-1`, `vpc-2`, `vgw-1`, ...), so
//! tests can predict them.

mod tags;
mod vpcs;
mod vpn_gateways;

use crate::error::Ec2Error;
use crate::models::*;
use crate::ec2_trait::Ec2ClientTrait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mutating call recorded by the mock, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateVpc { vpc_id: String },
    ModifyVpcAttribute { vpc_id: String, attribute: VpcAttribute },
    DeleteVpc { vpc_id: String },
    CreateVpnGateway { vpn_gateway_id: String },
    AttachVpnGateway { vpn_gateway_id: String, vpc_id: String },
    DetachVpnGateway { vpn_gateway_id: String, vpc_id: String },
    DeleteVpnGateway { vpn_gateway_id: String },
    CreateTags { resource_id: String, tags: Vec<Tag> },
    DeleteTags { resource_id: String, keys: Vec<String> },
}

/// Mock EC2 client
///
/// Stores resources in memory. Cloning shares the underlying state, so a test
/// can keep one handle for assertions while tasks use another.
#[derive(Debug, Clone)]
pub struct MockEc2Client {
    pub(crate) region: String,
    // In-memory storage for resources; tags are kept apart, keyed by type and id
    pub(crate) vpcs: Arc<Mutex<HashMap<String, Vpc>>>,
    pub(crate) vpn_gateways: Arc<Mutex<HashMap<String, VpnGateway>>>,
    pub(crate) tags: Arc<Mutex<HashMap<(ResourceType, String), BTreeMap<String, String>>>>,
    // Per-prefix counters for generating IDs
    pub(crate) ids: Arc<Mutex<HashMap<String, u64>>>,
    pub(crate) calls: Arc<Mutex<Vec<MockCall>>>,
}

/// Lock a mutex, recovering the data if a panicking test poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockEc2Client {
    /// Create a new, empty mock client
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            vpcs: Arc::new(Mutex::new(HashMap::new())),
            vpn_gateways: Arc::new(Mutex::new(HashMap::new())),
            tags: Arc::new(Mutex::new(HashMap::new())),
            ids: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a VPC with a fixed id to the mock store (for test setup)
    ///
    /// Tags on the model are moved into the tag store.
    pub fn add_vpc(&self, mut vpc: Vpc) {
        let tags = std::mem::take(&mut vpc.tags);
        self.store_tags(ResourceType::Vpc, &vpc.vpc_id, &tags);
        lock(&self.vpcs).insert(vpc.vpc_id.clone(), vpc);
    }

    /// Add a VPN gateway with a fixed id to the mock store (for test setup)
    pub fn add_vpn_gateway(&self, mut vgw: VpnGateway) {
        let tags = std::mem::take(&mut vgw.tags);
        self.store_tags(ResourceType::VpnGateway, &vgw.vpn_gateway_id, &tags);
        lock(&self.vpn_gateways).insert(vgw.vpn_gateway_id.clone(), vgw);
    }

    /// Look up a VPN gateway by id, with its tags
    pub fn find_vpn_gateway(&self, id: &str) -> Option<VpnGateway> {
        let gateways = lock(&self.vpn_gateways);
        gateways.get(id).map(|vgw| {
            let mut copy = vgw.clone();
            copy.tags = self.get_tags(ResourceType::VpnGateway, id);
            copy
        })
    }

    /// Look up a VPC by id, with its tags
    pub fn find_vpc(&self, id: &str) -> Option<Vpc> {
        let vpcs = lock(&self.vpcs);
        vpcs.get(id).map(|vpc| {
            let mut copy = vpc.clone();
            copy.tags = self.get_tags(ResourceType::Vpc, id);
            copy
        })
    }

    /// Ids of all VPN gateways, sorted
    pub fn vpn_gateway_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.vpn_gateways).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of all VPCs, sorted
    pub fn vpc_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.vpcs).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mutating calls received so far, in order
    pub fn call_log(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Forget recorded calls (state is kept)
    pub fn clear_call_log(&self) {
        lock(&self.calls).clear();
    }

    /// Generate the next free id for a prefix, e.g. `vgw-3`
    pub(crate) fn allocate_id(&self, prefix: &str) -> String {
        let mut ids = lock(&self.ids);
        let counter = ids.entry(prefix.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let id = format!("{}-{}", prefix, counter);
            if !self.id_taken(&id) {
                return id;
            }
        }
    }

    fn id_taken(&self, id: &str) -> bool {
        match ResourceType::from_id(id) {
            Some(ResourceType::Vpc) => lock(&self.vpcs).contains_key(id),
            Some(ResourceType::VpnGateway) => lock(&self.vpn_gateways).contains_key(id),
            None => false,
        }
    }

    pub(crate) fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait::async_trait]
impl Ec2ClientTrait for MockEc2Client {
    fn region(&self) -> &str {
        &self.region
    }

    // VPC Operations - delegated to vpcs module
    async fn describe_vpcs(&self, vpc_ids: &[String], filters: &[Filter]) -> Result<Vec<Vpc>, Ec2Error> {
        vpcs::describe_vpcs(self, vpc_ids, filters)
    }

    async fn create_vpc(&self, cidr_block: &str) -> Result<Vpc, Ec2Error> {
        vpcs::create_vpc(self, cidr_block)
    }

    async fn modify_vpc_attribute(&self, vpc_id: &str, attribute: VpcAttribute) -> Result<(), Ec2Error> {
        vpcs::modify_vpc_attribute(self, vpc_id, attribute)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), Ec2Error> {
        vpcs::delete_vpc(self, vpc_id)
    }

    // VPN Gateway Operations - delegated to vpn_gateways module
    async fn describe_vpn_gateways(&self, vpn_gateway_ids: &[String], filters: &[Filter]) -> Result<Vec<VpnGateway>, Ec2Error> {
        vpn_gateways::describe_vpn_gateways(self, vpn_gateway_ids, filters)
    }

    async fn create_vpn_gateway(&self, gateway_type: &str) -> Result<VpnGateway, Ec2Error> {
        vpn_gateways::create_vpn_gateway(self, gateway_type)
    }

    async fn attach_vpn_gateway(&self, vpn_gateway_id: &str, vpc_id: &str) -> Result<VpcAttachment, Ec2Error> {
        vpn_gateways::attach_vpn_gateway(self, vpn_gateway_id, vpc_id)
    }

    async fn detach_vpn_gateway(&self, vpn_gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error> {
        vpn_gateways::detach_vpn_gateway(self, vpn_gateway_id, vpc_id)
    }

    async fn delete_vpn_gateway(&self, vpn_gateway_id: &str) -> Result<(), Ec2Error> {
        vpn_gateways::delete_vpn_gateway(self, vpn_gateway_id)
    }

    // Tag Operations - delegated to tags module
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), Ec2Error> {
        tags::create_tags(self, resource_id, tags)
    }

    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), Ec2Error> {
        tags::delete_tags(self, resource_id, keys)
    }
}
