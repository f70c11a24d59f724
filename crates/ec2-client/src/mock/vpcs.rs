//! VPC operations for MockEc2Client

use super::{lock, MockCall, MockEc2Client};
use crate::error::Ec2Error;
use crate::models::*;
use tracing::debug;

const KNOWN_FILTERS: &[&str] = &["vpc-id", "cidr", "cidr-block", "state", "tag-key"];

fn check_filters(filters: &[Filter]) -> Result<(), Ec2Error> {
    for filter in filters {
        if filter.tag_key().is_none() && !KNOWN_FILTERS.contains(&filter.name.as_str()) {
            return Err(Ec2Error::UnknownFilter(filter.name.clone()));
        }
    }
    Ok(())
}

fn matches(client: &MockEc2Client, vpc: &Vpc, filter: &Filter) -> bool {
    let any = |value: &str| filter.values.iter().any(|v| v == value);
    match filter.name.as_str() {
        "vpc-id" => any(&vpc.vpc_id),
        "cidr" | "cidr-block" => any(&vpc.cidr_block),
        "state" => any(&vpc.state),
        "tag-key" => client.has_tag_key(ResourceType::Vpc, &vpc.vpc_id, filter),
        _ => client.has_tag(ResourceType::Vpc, &vpc.vpc_id, filter),
    }
}

pub fn describe_vpcs(client: &MockEc2Client, vpc_ids: &[String], filters: &[Filter]) -> Result<Vec<Vpc>, Ec2Error> {
    debug!("DescribeVpcs: ids={:?} filters={:?}", vpc_ids, filters);

    check_filters(filters)?;
    let mut filters = filters.to_vec();
    if !vpc_ids.is_empty() {
        filters.push(Filter::new("vpc-id", vpc_ids.iter().cloned()));
    }

    let vpcs = lock(&client.vpcs);
    let mut results: Vec<Vpc> = vpcs
        .values()
        .filter(|vpc| filters.iter().all(|f| matches(client, vpc, f)))
        .map(|vpc| {
            let mut copy = vpc.clone();
            copy.tags = client.get_tags(ResourceType::Vpc, &vpc.vpc_id);
            copy
        })
        .collect();
    results.sort_by(|a, b| a.vpc_id.cmp(&b.vpc_id));
    Ok(results)
}

pub fn create_vpc(client: &MockEc2Client, cidr_block: &str) -> Result<Vpc, Ec2Error> {
    debug!("CreateVpc: {}", cidr_block);

    if cidr_block.is_empty() {
        return Err(Ec2Error::InvalidRequest("CidrBlock is required".to_string()));
    }

    let id = client.allocate_id("vpc");
    let vpc = Vpc {
        vpc_id: id.clone(),
        cidr_block: cidr_block.to_string(),
        state: "available".to_string(),
        enable_dns_support: true,
        enable_dns_hostnames: false,
        tags: vec![],
    };

    lock(&client.vpcs).insert(id.clone(), vpc.clone());
    client.record(MockCall::CreateVpc { vpc_id: id });
    Ok(vpc)
}

pub fn modify_vpc_attribute(client: &MockEc2Client, vpc_id: &str, attribute: VpcAttribute) -> Result<(), Ec2Error> {
    debug!("ModifyVpcAttribute: {} {:?}", vpc_id, attribute);

    {
        let mut vpcs = lock(&client.vpcs);
        let vpc = vpcs
            .get_mut(vpc_id)
            .ok_or_else(|| Ec2Error::NotFound(format!("VPC {:?} not found", vpc_id)))?;
        match attribute {
            VpcAttribute::EnableDnsSupport(v) => vpc.enable_dns_support = v,
            VpcAttribute::EnableDnsHostnames(v) => vpc.enable_dns_hostnames = v,
        }
    }
    client.record(MockCall::ModifyVpcAttribute {
        vpc_id: vpc_id.to_string(),
        attribute,
    });
    Ok(())
}

pub fn delete_vpc(client: &MockEc2Client, vpc_id: &str) -> Result<(), Ec2Error> {
    debug!("DeleteVpc: {}", vpc_id);

    let attached = lock(&client.vpn_gateways)
        .values()
        .any(|vgw| vgw.attached_vpc_ids().any(|id| id == vpc_id));
    if attached {
        return Err(Ec2Error::Conflict(format!("VPC {:?} has attached VPN gateways", vpc_id)));
    }

    if lock(&client.vpcs).remove(vpc_id).is_none() {
        return Err(Ec2Error::NotFound(format!("VPC {:?} not found", vpc_id)));
    }
    lock(&client.tags).remove(&(ResourceType::Vpc, vpc_id.to_string()));
    client.record(MockCall::DeleteVpc { vpc_id: vpc_id.to_string() });
    Ok(())
}
