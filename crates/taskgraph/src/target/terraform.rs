//! Terraform JSON target
//!
//! Produces a `{"resource": {"<type>": {"<name>": {...}}}}` document; resources
//! refer to each other with `${<type>.<name>.<attr>}` interpolations.

use super::{lock, sanitize_name, to_value, write_pretty};
use crate::error::TaskError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File name the document is written to
pub const TERRAFORM_FILE: &str = "kubernetes.tf.json";

#[derive(Debug, Default)]
pub struct TerraformTarget {
    resources: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    outputs: Mutex<BTreeMap<String, Value>>,
}

impl TerraformTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource block; a second block with the same type and name is an error
    pub fn add_resource(&self, resource_type: &str, name: &str, value: impl Serialize) -> Result<(), TaskError> {
        let value = to_value(value)?;
        let name = sanitize_name(name);
        let mut resources = lock(&self.resources);
        let blocks = resources.entry(resource_type.to_string()).or_default();
        if blocks.contains_key(&name) {
            return Err(TaskError::Render(format!(
                "duplicate terraform resource {}.{}",
                resource_type, name
            )));
        }
        debug!("terraform: adding {}.{}", resource_type, name);
        blocks.insert(name, value);
        Ok(())
    }

    /// Add an output value (last write wins)
    pub fn add_output(&self, name: &str, value: impl Serialize) -> Result<(), TaskError> {
        let value = to_value(value)?;
        lock(&self.outputs).insert(sanitize_name(name), serde_json::json!({ "value": value }));
        Ok(())
    }

    /// Interpolation referring to an attribute of another resource block
    pub fn link(resource_type: &str, name: &str, attribute: &str) -> Value {
        Value::String(format!("${{{}.{}.{}}}", resource_type, sanitize_name(name), attribute))
    }

    /// A previously added block
    pub fn resource(&self, resource_type: &str, name: &str) -> Option<Value> {
        lock(&self.resources)
            .get(resource_type)
            .and_then(|blocks| blocks.get(&sanitize_name(name)))
            .cloned()
    }

    /// The complete document
    pub fn finish(&self) -> Value {
        let mut doc = Map::new();
        let resources = lock(&self.resources);
        if !resources.is_empty() {
            doc.insert("resource".to_string(), serde_json::json!(resources.clone()));
        }
        let outputs = lock(&self.outputs);
        if !outputs.is_empty() {
            doc.insert("output".to_string(), serde_json::json!(outputs.clone()));
        }
        Value::Object(doc)
    }

    /// Write the document as `kubernetes.tf.json` under `dir`
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        write_pretty(dir, TERRAFORM_FILE, &self.finish())
    }
}
