//! Helpers shared by the EC2 resource tasks

use ec2_client::{Ec2ClientTrait, Ec2Error, Tag};
use std::collections::BTreeMap;
use taskgraph::TaskError;

/// Cloud handle the AWS tasks run against
pub type Cloud = dyn Ec2ClientTrait;

pub(crate) fn lookup_error(kind: &str, e: Ec2Error) -> TaskError {
    TaskError::Lookup(format!("error listing {}s: {}", kind, e))
}

pub(crate) fn backend_error(operation: &str, id: &str, e: Ec2Error) -> TaskError {
    TaskError::Backend(format!("error {} {}: {}", operation, id, e))
}

/// At most one match is allowed for a lookup
pub(crate) fn single<T>(kind: &str, criteria: impl Fn() -> String, mut found: Vec<T>) -> Result<Option<T>, TaskError> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(TaskError::AmbiguousMatch {
            kind: kind.to_string(),
            criteria: criteria(),
            count,
        }),
    }
}

/// Desired tags of an owned resource: user tags plus `Name`
pub(crate) fn owned_tags(name: &str, tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut desired = tags.clone();
    desired
        .entry(ec2_client::NAME_TAG.to_string())
        .or_insert_with(|| name.to_string());
    desired
}

/// Desired tags that are absent or different in `actual`
pub(crate) fn missing_tags(actual: &BTreeMap<String, String>, desired: &BTreeMap<String, String>) -> Vec<Tag> {
    desired
        .iter()
        .filter(|(k, v)| actual.get(*k) != Some(*v))
        .map(|(k, v)| Tag::new(k, v))
        .collect()
}
