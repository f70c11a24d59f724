//! CloudFormation target
//!
//! Produces a `{"Resources": {"<LogicalId>": {"Type": ..., "Properties": ...}}}`
//! template. Logical ids are derived from the resource type and task name, and
//! references use `{"Ref": "<LogicalId>"}`.

use super::{lock, to_value, write_pretty};
use crate::error::TaskError;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File name the template is written to
pub const CLOUDFORMATION_FILE: &str = "kubernetes.json";

/// A template entry and the `type name` pair that produced its logical id
#[derive(Debug, Clone)]
struct Entry {
    owner: String,
    resource: Value,
}

/// Collects the resources of one CloudFormation template
#[derive(Debug, Default)]
pub struct CloudFormationTarget {
    resources: Mutex<BTreeMap<String, Entry>>,
}

impl CloudFormationTarget {
    /// An empty template
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical id for a resource: alphanumerics of type and name, concatenated
    ///
    /// `AWS::EC2::VPC` + `vpc1` becomes `AWSEC2VPCvpc1`. Logical ids allow no
    /// separator, so distinct pairs can collide; `add_resource` rejects that.
    pub fn logical_id(resource_type: &str, name: &str) -> String {
        resource_type
            .chars()
            .chain(name.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect()
    }

    /// `Ref` to another resource in the template
    pub fn reference(resource_type: &str, name: &str) -> Value {
        json!({ "Ref": Self::logical_id(resource_type, name) })
    }

    /// Add a resource; a second resource with the same logical id is an error
    pub fn add_resource(&self, resource_type: &str, name: &str, properties: impl Serialize) -> Result<(), TaskError> {
        let properties = to_value(properties)?;
        let logical_id = Self::logical_id(resource_type, name);
        let owner = format!("{} {}", resource_type, name);
        let mut resources = lock(&self.resources);
        if let Some(existing) = resources.get(&logical_id) {
            return Err(TaskError::Render(if existing.owner == owner {
                format!("duplicate cloudformation resource {}", logical_id)
            } else {
                format!(
                    "cloudformation logical id {} of {} collides with {}",
                    logical_id, owner, existing.owner
                )
            }));
        }
        debug!("cloudformation: adding {} ({})", logical_id, resource_type);
        resources.insert(
            logical_id,
            Entry {
                owner,
                resource: json!({ "Type": resource_type, "Properties": properties }),
            },
        );
        Ok(())
    }

    /// A previously added resource
    pub fn resource(&self, resource_type: &str, name: &str) -> Option<Value> {
        lock(&self.resources)
            .get(&Self::logical_id(resource_type, name))
            .map(|entry| entry.resource.clone())
    }

    /// The complete template
    pub fn finish(&self) -> Value {
        let resources: BTreeMap<String, Value> = lock(&self.resources)
            .iter()
            .map(|(id, entry)| (id.clone(), entry.resource.clone()))
            .collect();
        json!({ "Resources": resources })
    }

    /// Write the template as `kubernetes.json` under `dir`
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        write_pretty(dir, CLOUDFORMATION_FILE, &self.finish())
    }
}
