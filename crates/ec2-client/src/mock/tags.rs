//! Tag operations for MockEc2Client
//!
//! Tags are stored per `(ResourceType, id)`, the way EC2 keeps them apart from
//! the resource itself, and are returned sorted by key.

use super::{lock, MockCall, MockEc2Client};
use crate::error::Ec2Error;
use crate::models::*;
use tracing::debug;

impl MockEc2Client {
    pub(crate) fn store_tags(&self, resource_type: ResourceType, id: &str, tags: &[Tag]) {
        if tags.is_empty() {
            return;
        }
        let mut store = lock(&self.tags);
        let entry = store.entry((resource_type, id.to_string())).or_default();
        for tag in tags {
            entry.insert(tag.key.clone(), tag.value.clone());
        }
    }

    pub(crate) fn get_tags(&self, resource_type: ResourceType, id: &str) -> Vec<Tag> {
        lock(&self.tags)
            .get(&(resource_type, id.to_string()))
            .map(map_to_tags)
            .unwrap_or_default()
    }

    /// Evaluate a `tag:<key>` filter against a resource
    pub(crate) fn has_tag(&self, resource_type: ResourceType, id: &str, filter: &Filter) -> bool {
        let Some(key) = filter.tag_key() else {
            return false;
        };
        let store = lock(&self.tags);
        let Some(tags) = store.get(&(resource_type, id.to_string())) else {
            return false;
        };
        tags.get(key)
            .map(|value| filter.values.iter().any(|v| v == value))
            .unwrap_or(false)
    }

    /// Evaluate a `tag-key` filter against a resource
    pub(crate) fn has_tag_key(&self, resource_type: ResourceType, id: &str, filter: &Filter) -> bool {
        let store = lock(&self.tags);
        store
            .get(&(resource_type, id.to_string()))
            .map(|tags| filter.values.iter().any(|k| tags.contains_key(k)))
            .unwrap_or(false)
    }

    fn resource_exists(&self, resource_type: ResourceType, id: &str) -> bool {
        match resource_type {
            ResourceType::Vpc => lock(&self.vpcs).contains_key(id),
            ResourceType::VpnGateway => lock(&self.vpn_gateways).contains_key(id),
        }
    }
}

fn resource_type_of(resource_id: &str) -> Result<ResourceType, Ec2Error> {
    ResourceType::from_id(resource_id).ok_or_else(|| {
        Ec2Error::InvalidRequest(format!("cannot tag resource {:?}: unknown resource type", resource_id))
    })
}

pub fn create_tags(client: &MockEc2Client, resource_id: &str, tags: &[Tag]) -> Result<(), Ec2Error> {
    debug!("CreateTags: {} {:?}", resource_id, tags);

    let resource_type = resource_type_of(resource_id)?;
    if !client.resource_exists(resource_type, resource_id) {
        return Err(Ec2Error::NotFound(format!("{} {:?} not found", resource_type, resource_id)));
    }

    client.store_tags(resource_type, resource_id, tags);
    client.record(MockCall::CreateTags {
        resource_id: resource_id.to_string(),
        tags: tags.to_vec(),
    });
    Ok(())
}

pub fn delete_tags(client: &MockEc2Client, resource_id: &str, keys: &[String]) -> Result<(), Ec2Error> {
    debug!("DeleteTags: {} {:?}", resource_id, keys);

    let resource_type = resource_type_of(resource_id)?;
    if !client.resource_exists(resource_type, resource_id) {
        return Err(Ec2Error::NotFound(format!("{} {:?} not found", resource_type, resource_id)));
    }

    {
        let mut store = lock(&client.tags);
        if let Some(tags) = store.get_mut(&(resource_type, resource_id.to_string())) {
            for key in keys {
                tags.remove(key);
            }
        }
    }
    client.record(MockCall::DeleteTags {
        resource_id: resource_id.to_string(),
        keys: keys.to_vec(),
    });
    Ok(())
}
