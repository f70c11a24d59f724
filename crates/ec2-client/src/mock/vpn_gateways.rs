//! VPN gateway operations for MockEc2Client
//!
//! Handles describe/create/delete plus VPC attachments

use super::{lock, MockCall, MockEc2Client};
use crate::error::Ec2Error;
use crate::models::*;
use tracing::debug;

const KNOWN_FILTERS: &[&str] = &["vpn-gateway-id", "attachment.vpc-id", "state", "type", "tag-key"];

fn check_filters(filters: &[Filter]) -> Result<(), Ec2Error> {
    for filter in filters {
        if filter.tag_key().is_none() && !KNOWN_FILTERS.contains(&filter.name.as_str()) {
            return Err(Ec2Error::UnknownFilter(filter.name.clone()));
        }
    }
    Ok(())
}

fn matches(client: &MockEc2Client, vgw: &VpnGateway, filter: &Filter) -> bool {
    let any = |value: &str| filter.values.iter().any(|v| v == value);
    match filter.name.as_str() {
        "vpn-gateway-id" => any(&vgw.vpn_gateway_id),
        "attachment.vpc-id" => vgw.attached_vpc_ids().any(any),
        "state" => any(&vgw.state),
        "type" => any(&vgw.gateway_type),
        "tag-key" => client.has_tag_key(ResourceType::VpnGateway, &vgw.vpn_gateway_id, filter),
        _ => client.has_tag(ResourceType::VpnGateway, &vgw.vpn_gateway_id, filter),
    }
}

pub fn describe_vpn_gateways(client: &MockEc2Client, vpn_gateway_ids: &[String], filters: &[Filter]) -> Result<Vec<VpnGateway>, Ec2Error> {
    debug!("DescribeVpnGateways: ids={:?} filters={:?}", vpn_gateway_ids, filters);

    check_filters(filters)?;
    let mut filters = filters.to_vec();
    if !vpn_gateway_ids.is_empty() {
        filters.push(Filter::new("vpn-gateway-id", vpn_gateway_ids.iter().cloned()));
    }

    let gateways = lock(&client.vpn_gateways);
    let mut results: Vec<VpnGateway> = gateways
        .values()
        .filter(|vgw| filters.iter().all(|f| matches(client, vgw, f)))
        .map(|vgw| {
            let mut copy = vgw.clone();
            copy.tags = client.get_tags(ResourceType::VpnGateway, &vgw.vpn_gateway_id);
            copy
        })
        .collect();
    results.sort_by(|a, b| a.vpn_gateway_id.cmp(&b.vpn_gateway_id));
    Ok(results)
}

pub fn create_vpn_gateway(client: &MockEc2Client, gateway_type: &str) -> Result<VpnGateway, Ec2Error> {
    debug!("CreateVpnGateway: type={}", gateway_type);

    let id = client.allocate_id("vgw");
    let vgw = VpnGateway {
        vpn_gateway_id: id.clone(),
        state: "available".to_string(),
        gateway_type: gateway_type.to_string(),
        vpc_attachments: vec![],
        tags: vec![],
    };

    lock(&client.vpn_gateways).insert(id.clone(), vgw.clone());
    client.record(MockCall::CreateVpnGateway { vpn_gateway_id: id });
    Ok(vgw)
}

pub fn attach_vpn_gateway(client: &MockEc2Client, vpn_gateway_id: &str, vpc_id: &str) -> Result<VpcAttachment, Ec2Error> {
    debug!("AttachVpnGateway: {} -> {}", vpn_gateway_id, vpc_id);

    if !lock(&client.vpcs).contains_key(vpc_id) {
        return Err(Ec2Error::NotFound(format!("VPC {:?} not found", vpc_id)));
    }

    let attachment = {
        let mut gateways = lock(&client.vpn_gateways);
        let vgw = gateways
            .get_mut(vpn_gateway_id)
            .ok_or_else(|| Ec2Error::NotFound(format!("VpnGateway {:?} not found", vpn_gateway_id)))?;
        if vgw.attached_vpc_ids().any(|id| id == vpc_id) {
            return Err(Ec2Error::Conflict(format!(
                "VpnGateway {:?} is already attached to VPC {:?}",
                vpn_gateway_id, vpc_id
            )));
        }
        let attachment = VpcAttachment {
            vpc_id: vpc_id.to_string(),
            state: "attached".to_string(),
        };
        vgw.vpc_attachments.push(attachment.clone());
        attachment
    };

    client.record(MockCall::AttachVpnGateway {
        vpn_gateway_id: vpn_gateway_id.to_string(),
        vpc_id: vpc_id.to_string(),
    });
    Ok(attachment)
}

pub fn detach_vpn_gateway(client: &MockEc2Client, vpn_gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error> {
    debug!("DetachVpnGateway: {} -/-> {}", vpn_gateway_id, vpc_id);

    {
        let mut gateways = lock(&client.vpn_gateways);
        let vgw = gateways
            .get_mut(vpn_gateway_id)
            .ok_or_else(|| Ec2Error::NotFound(format!("VpnGateway {:?} not found", vpn_gateway_id)))?;
        let before = vgw.vpc_attachments.len();
        vgw.vpc_attachments.retain(|a| a.vpc_id != vpc_id);
        if vgw.vpc_attachments.len() == before {
            return Err(Ec2Error::NotFound(format!("attachment to VPC {:?} not found", vpc_id)));
        }
    }

    client.record(MockCall::DetachVpnGateway {
        vpn_gateway_id: vpn_gateway_id.to_string(),
        vpc_id: vpc_id.to_string(),
    });
    Ok(())
}

pub fn delete_vpn_gateway(client: &MockEc2Client, vpn_gateway_id: &str) -> Result<(), Ec2Error> {
    debug!("DeleteVpnGateway: {}", vpn_gateway_id);

    {
        let mut gateways = lock(&client.vpn_gateways);
        let vgw = gateways
            .get(vpn_gateway_id)
            .ok_or_else(|| Ec2Error::NotFound(format!("VpnGateway {:?} not found", vpn_gateway_id)))?;
        if vgw.attached_vpc_ids().next().is_some() {
            return Err(Ec2Error::Conflict(format!(
                "VpnGateway {:?} still has VPC attachments",
                vpn_gateway_id
            )));
        }
        gateways.remove(vpn_gateway_id);
    }
    lock(&client.tags).remove(&(ResourceType::VpnGateway, vpn_gateway_id.to_string()));

    client.record(MockCall::DeleteVpnGateway {
        vpn_gateway_id: vpn_gateway_id.to_string(),
    });
    Ok(())
}
