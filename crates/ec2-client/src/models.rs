//! EC2 API models
//!
//! These models follow the shapes of the EC2 `Describe*` responses, reduced to
//! the fields the cloudup resource tasks read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key of the tag EC2 consoles display as the resource name
pub const NAME_TAG: &str = "Name";

/// Resource types that can carry tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Vpc,
    VpnGateway,
}

impl ResourceType {
    /// Infer the resource type from an identifier prefix (`vpc-`, `vgw-`)
    pub fn from_id(id: &str) -> Option<Self> {
        match id.split_once('-').map(|(prefix, _)| prefix) {
            Some("vpc") => Some(ResourceType::Vpc),
            Some("vgw") => Some(ResourceType::VpnGateway),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Vpc => f.write_str("vpc"),
            ResourceType::VpnGateway => f.write_str("vpn-gateway"),
        }
    }
}

/// A single key/value tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Convert a tag list into a map (last value wins on duplicate keys)
pub fn tags_to_map(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

/// Convert a tag map into a tag list sorted by key
pub fn map_to_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter().map(|(k, v)| Tag::new(k, v)).collect()
}

/// Look up the `Name` tag
pub fn find_name_tag(tags: &[Tag]) -> Option<&str> {
    tags.iter()
        .find(|t| t.key == NAME_TAG)
        .map(|t| t.value.as_str())
}

/// VPC model matching the `DescribeVpcs` response item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub vpc_id: String,
    pub cidr_block: String,
    pub state: String,
    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Attributes settable through `ModifyVpcAttribute`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpcAttribute {
    EnableDnsSupport(bool),
    EnableDnsHostnames(bool),
}

/// Attachment of a VPN gateway to a VPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcAttachment {
    pub vpc_id: String,
    pub state: String,
}

/// Virtual private gateway model matching the `DescribeVpnGateways` response item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpnGateway {
    pub vpn_gateway_id: String,
    pub state: String,
    #[serde(rename = "Type")]
    pub gateway_type: String,
    #[serde(default)]
    pub vpc_attachments: Vec<VpcAttachment>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl VpnGateway {
    /// VPC ids of attachments that are not detached
    pub fn attached_vpc_ids(&self) -> impl Iterator<Item = &str> {
        self.vpc_attachments
            .iter()
            .filter(|a| a.state != "detached")
            .map(|a| a.vpc_id.as_str())
    }
}

/// Describe filter: a named predicate with OR-ed values
///
/// Filters in one request are AND-ed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `tag:<key>` filter matching a single value
    pub fn tag(key: &str, value: impl Into<String>) -> Self {
        Self::new(format!("tag:{}", key), [value.into()])
    }

    /// Tag key addressed by a `tag:<key>` filter, if this is one
    pub fn tag_key(&self) -> Option<&str> {
        self.name.strip_prefix("tag:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_from_id() {
        assert_eq!(ResourceType::from_id("vpc-1"), Some(ResourceType::Vpc));
        assert_eq!(ResourceType::from_id("vgw-12"), Some(ResourceType::VpnGateway));
        assert_eq!(ResourceType::from_id("igw-1"), None);
        assert_eq!(ResourceType::from_id("vpc"), None);
    }

    #[test]
    fn test_tag_filter() {
        let filter = Filter::tag("Name", "ExistingVPC");
        assert_eq!(filter.name, "tag:Name");
        assert_eq!(filter.tag_key(), Some("Name"));
        assert_eq!(filter.values, vec!["ExistingVPC".to_string()]);
        assert_eq!(Filter::new("vpc-id", ["vpc-1"]).tag_key(), None);
    }

    #[test]
    fn test_attached_vpc_ids_skips_detached() {
        let vgw = VpnGateway {
            vpn_gateway_id: "vgw-1".to_string(),
            state: "available".to_string(),
            gateway_type: "ipsec.1".to_string(),
            vpc_attachments: vec![
                VpcAttachment { vpc_id: "vpc-1".to_string(), state: "detached".to_string() },
                VpcAttachment { vpc_id: "vpc-2".to_string(), state: "attached".to_string() },
            ],
            tags: vec![],
        };
        assert_eq!(vgw.attached_vpc_ids().collect::<Vec<_>>(), vec!["vpc-2"]);
    }
}
