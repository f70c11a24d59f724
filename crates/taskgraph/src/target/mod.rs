//! Render targets
//!
//! The set of targets is closed: resources render through one `render` method
//! that matches on [`RenderTarget`]. `DryRun` never reaches a resource; the
//! engine records the planned change itself.
//!
//! Declarative targets accumulate fragments from concurrent tasks behind a
//! mutex and are serialized once the run is over.

mod cloudformation;
mod dryrun;
mod terraform;

pub use cloudformation::{CloudFormationTarget, CLOUDFORMATION_FILE};
pub use dryrun::{DryRunTarget, PlannedChange};
pub use terraform::{TerraformTarget, TERRAFORM_FILE};

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Target selector, e.g. parsed from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Direct,
    DryRun,
    Terraform,
    CloudFormation,
}

impl TargetKind {
    /// Terraform and CloudFormation render documents instead of calling the cloud
    pub fn is_declarative(self) -> bool {
        matches!(self, TargetKind::Terraform | TargetKind::CloudFormation)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Direct => "direct",
            TargetKind::DryRun => "dryrun",
            TargetKind::Terraform => "terraform",
            TargetKind::CloudFormation => "cloudformation",
        })
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(TargetKind::Direct),
            "dryrun" | "dry-run" => Ok(TargetKind::DryRun),
            "terraform" => Ok(TargetKind::Terraform),
            "cloudformation" => Ok(TargetKind::CloudFormation),
            other => Err(format!(
                "unknown target {:?} (expected direct, dryrun, terraform or cloudformation)",
                other
            )),
        }
    }
}

/// Destination of one convergence pass
#[derive(Debug)]
pub enum Target {
    /// Apply changes through the cloud handle
    Direct,
    /// Record changes without applying anything
    DryRun(DryRunTarget),
    /// Emit a Terraform JSON document
    Terraform(TerraformTarget),
    /// Emit a CloudFormation template
    CloudFormation(CloudFormationTarget),
}

impl Target {
    /// Fresh target of the given kind
    pub fn new(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Direct => Target::Direct,
            TargetKind::DryRun => Target::DryRun(DryRunTarget::new()),
            TargetKind::Terraform => Target::Terraform(TerraformTarget::new()),
            TargetKind::CloudFormation => Target::CloudFormation(CloudFormationTarget::new()),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Direct => TargetKind::Direct,
            Target::DryRun(_) => TargetKind::DryRun,
            Target::Terraform(_) => TargetKind::Terraform,
            Target::CloudFormation(_) => TargetKind::CloudFormation,
        }
    }

    /// What resources render to; `None` for dry runs
    pub fn render_target(&self) -> Option<RenderTarget<'_>> {
        match self {
            Target::Direct => Some(RenderTarget::Direct),
            Target::DryRun(_) => None,
            Target::Terraform(t) => Some(RenderTarget::Terraform(t)),
            Target::CloudFormation(t) => Some(RenderTarget::CloudFormation(t)),
        }
    }

    /// The finished declarative document, if this target produces one
    pub fn document(&self) -> Option<serde_json::Value> {
        match self {
            Target::Terraform(t) => Some(t.finish()),
            Target::CloudFormation(t) => Some(t.finish()),
            Target::Direct | Target::DryRun(_) => None,
        }
    }

    /// Write the declarative document into `dir`; returns the file written
    pub fn write_to(&self, dir: &Path) -> std::io::Result<Option<PathBuf>> {
        match self {
            Target::Terraform(t) => t.write_to(dir).map(Some),
            Target::CloudFormation(t) => t.write_to(dir).map(Some),
            Target::Direct | Target::DryRun(_) => Ok(None),
        }
    }
}

/// Target as seen by a resource's `render`
#[derive(Debug, Clone, Copy)]
pub enum RenderTarget<'a> {
    Direct,
    Terraform(&'a TerraformTarget),
    CloudFormation(&'a CloudFormationTarget),
}

/// Replace characters that are not valid in declarative resource names
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect()
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn to_value(value: impl Serialize) -> Result<serde_json::Value, TaskError> {
    serde_json::to_value(value).map_err(|e| TaskError::Render(e.to_string()))
}

pub(crate) fn write_pretty(dir: &Path, file: &str, doc: &serde_json::Value) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file);
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    std::fs::write(&path, bytes)?;
    Ok(path)
}
