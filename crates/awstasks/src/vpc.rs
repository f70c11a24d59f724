//! VPC task
//!
//! Owned VPCs are found by their `Name` tag and created when missing. Shared
//! VPCs are found by id (or, without one, by `Name` tag) and never modified:
//! any difference other than tags is a validation error.

use crate::cloud::{backend_error, lookup_error, missing_tags, owned_tags, single, Cloud};
use async_trait::async_trait;
use ec2_client::{map_to_tags, tags_to_map, Filter, VpcAttribute};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use taskgraph::{
    ChangeSet, CloudFormationTarget, Fields, Lifecycle, Ownership, RenderTarget, Resolved, Resolver, Resource,
    TaskContext, TaskError, TerraformTarget,
};
use tracing::{debug, info};

const TERRAFORM_TYPE: &str = "aws_vpc";
const CLOUDFORMATION_TYPE: &str = "AWS::EC2::VPC";

/// An EC2 VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub ownership: Ownership,
    /// Set on values returned by lookup
    pub id: Option<String>,
    /// Required for owned VPCs; fixed once created
    pub cidr: Option<String>,
    /// `None` leaves the attribute as the cloud has it
    pub enable_dns_support: Option<bool>,
    pub enable_dns_hostnames: Option<bool>,
    pub tags: BTreeMap<String, String>,
}

impl Vpc {
    /// A VPC created and managed by cloudup
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Lifecycle::Sync,
            ownership: Ownership::Owned,
            id: None,
            cidr: None,
            enable_dns_support: None,
            enable_dns_hostnames: None,
            tags: BTreeMap::new(),
        }
    }

    /// A pre-existing VPC; without an id it is looked up by `Name` tag
    pub fn shared(name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            ownership: Ownership::Shared { id },
            ..Self::new(name)
        }
    }

    /// IPv4 CIDR block
    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = Some(cidr.into());
        self
    }

    pub fn with_dns_support(mut self, enabled: bool) -> Self {
        self.enable_dns_support = Some(enabled);
        self
    }

    pub fn with_dns_hostnames(mut self, enabled: bool) -> Self {
        self.enable_dns_hostnames = Some(enabled);
        self
    }

    /// Extra tag next to `Name`
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Override the default [`Lifecycle::Sync`]
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    fn actual_from(&self, vpc: ec2_client::Vpc) -> Self {
        Self {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            ownership: self.ownership.clone(),
            id: Some(vpc.vpc_id),
            cidr: Some(vpc.cidr_block),
            enable_dns_support: Some(vpc.enable_dns_support),
            enable_dns_hostnames: Some(vpc.enable_dns_hostnames),
            tags: tags_to_map(&vpc.tags),
        }
    }

    async fn lookup(&self, cloud: &Cloud) -> Result<Option<ec2_client::Vpc>, TaskError> {
        let (ids, filters) = match self.ownership.shared_id() {
            Some(id) => (vec![id.to_string()], Vec::new()),
            None => (Vec::new(), vec![Filter::tag(ec2_client::NAME_TAG, self.name.clone())]),
        };
        let found = cloud
            .describe_vpcs(&ids, &filters)
            .await
            .map_err(|e| lookup_error(Self::KIND, e))?;
        single(Self::KIND, || format!("Name={}", self.name), found)
    }

    /// Identifier a declarative document should use for this VPC
    fn literal_id(&self, ctx: &TaskContext<'_, Cloud>, actual: Option<&Self>) -> Option<String> {
        self.ownership
            .shared_id()
            .or(ctx.discovered_id())
            .or(actual.and_then(|a| a.id.as_deref()))
            .map(str::to_string)
    }

    fn render_shared(&self, ctx: &TaskContext<'_, Cloud>, actual: Option<&Self>) -> Resolved {
        let id = self.literal_id(ctx, actual);
        debug!("reusing shared VPC {} ({:?})", self.name, id);
        Resolved {
            link: id.clone().map(Value::String),
            id,
        }
    }

    async fn apply(&self, cloud: &Cloud, actual: Option<&Self>, changes: &ChangeSet) -> Result<String, TaskError> {
        let (vpc_id, created_support, created_hostnames, actual_tags) = match actual {
            Some(actual) => (
                actual.id.clone().unwrap_or_default(),
                actual.enable_dns_support,
                actual.enable_dns_hostnames,
                actual.tags.clone(),
            ),
            None => {
                let cidr = self.cidr.as_deref().unwrap_or_default();
                info!("Creating VPC {} with CIDR {}", self.name, cidr);
                let vpc = cloud
                    .create_vpc(cidr)
                    .await
                    .map_err(|e| backend_error("creating VPC", &self.name, e))?;
                (
                    vpc.vpc_id,
                    Some(vpc.enable_dns_support),
                    Some(vpc.enable_dns_hostnames),
                    BTreeMap::new(),
                )
            }
        };

        let attributes = [
            (self.enable_dns_support, created_support, VpcAttribute::EnableDnsSupport as fn(bool) -> VpcAttribute),
            (self.enable_dns_hostnames, created_hostnames, VpcAttribute::EnableDnsHostnames),
        ];
        for (desired, current, attribute) in attributes {
            if let Some(enabled) = desired.filter(|d| current != Some(*d)) {
                cloud
                    .modify_vpc_attribute(&vpc_id, attribute(enabled))
                    .await
                    .map_err(|e| backend_error("modifying VPC", &vpc_id, e))?;
            }
        }

        if actual.is_none() || changes.contains("tags") {
            let tags = missing_tags(&actual_tags, &owned_tags(&self.name, &self.tags));
            if !tags.is_empty() {
                cloud
                    .create_tags(&vpc_id, &tags)
                    .await
                    .map_err(|e| backend_error("tagging VPC", &vpc_id, e))?;
            }
        }

        Ok(vpc_id)
    }
}

#[derive(Debug, Serialize)]
struct TerraformVpc {
    cidr_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_dns_hostnames: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_dns_support: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CloudFormationVpc {
    cidr_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_dns_hostnames: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_dns_support: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<ec2_client::Tag>,
}

#[async_trait]
impl Resource<Cloud> for Vpc {
    const KIND: &'static str = "Vpc";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    fn identifier(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn check_config(&self) -> Result<(), String> {
        if !self.ownership.is_shared() && self.cidr.as_deref().is_none_or(str::is_empty) {
            return Err("cidr is required for a VPC that is not shared".to_string());
        }
        Ok(())
    }

    fn fields(&self, _resolver: &Resolver<'_>) -> Fields {
        let id = self.id.as_deref().or(self.ownership.shared_id());
        let fields = Fields::new()
            .text("id", id)
            .text("cidr", self.cidr.clone())
            .bool("enable_dns_support", self.enable_dns_support)
            .bool("enable_dns_hostnames", self.enable_dns_hostnames);
        let tags = if self.id.is_some() {
            // Looked-up value: tags as found
            Some(self.tags.clone())
        } else if self.ownership.is_shared() {
            // Shared VPCs are never tagged
            None
        } else {
            Some(owned_tags(&self.name, &self.tags))
        };
        match tags {
            Some(tags) => fields.tags("tags", &tags),
            None => fields,
        }
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["id", "cidr"]
    }

    async fn find(&self, ctx: &TaskContext<'_, Cloud>) -> Result<Option<Self>, TaskError> {
        let found = self.lookup(ctx.cloud()).await?;
        if let Some(vpc) = &found {
            debug!("found matching VPC {} for {}", vpc.vpc_id, self.name);
        }
        Ok(found.map(|vpc| self.actual_from(vpc)))
    }

    fn check_changes(&self, _actual: &Self, changes: &ChangeSet) -> Result<(), TaskError> {
        if self.ownership.is_shared() {
            return Err(TaskError::Validation(format!(
                "shared VPC {} cannot be modified: {}",
                self.name, changes
            )));
        }
        Ok(())
    }

    async fn discover(&self, ctx: &TaskContext<'_, Cloud>) -> Result<Option<String>, TaskError> {
        Ok(self.lookup(ctx.cloud()).await?.map(|vpc| vpc.vpc_id))
    }

    async fn render(
        &self,
        target: RenderTarget<'_>,
        ctx: &TaskContext<'_, Cloud>,
        actual: Option<&Self>,
        changes: &ChangeSet,
    ) -> Result<Resolved, TaskError> {
        match target {
            RenderTarget::Direct => {
                let id = self.apply(ctx.cloud(), actual, changes).await?;
                Ok(Resolved::with_id(id))
            }
            RenderTarget::Terraform(_) | RenderTarget::CloudFormation(_) if self.ownership.is_shared() => {
                Ok(self.render_shared(ctx, actual))
            }
            RenderTarget::Terraform(tf) => {
                tf.add_resource(
                    TERRAFORM_TYPE,
                    &self.name,
                    TerraformVpc {
                        cidr_block: self.cidr.clone(),
                        enable_dns_hostnames: self.enable_dns_hostnames,
                        enable_dns_support: self.enable_dns_support,
                        tags: owned_tags(&self.name, &self.tags),
                    },
                )?;
                Ok(Resolved {
                    id: actual.and_then(|a| a.id.clone()),
                    link: Some(TerraformTarget::link(TERRAFORM_TYPE, &self.name, "id")),
                })
            }
            RenderTarget::CloudFormation(cf) => {
                cf.add_resource(
                    CLOUDFORMATION_TYPE,
                    &self.name,
                    CloudFormationVpc {
                        cidr_block: self.cidr.clone(),
                        enable_dns_hostnames: self.enable_dns_hostnames,
                        enable_dns_support: self.enable_dns_support,
                        tags: map_to_tags(&owned_tags(&self.name, &self.tags)),
                    },
                )?;
                Ok(Resolved {
                    id: actual.and_then(|a| a.id.clone()),
                    link: Some(CloudFormationTarget::reference(CLOUDFORMATION_TYPE, &self.name)),
                })
            }
        }
    }
}
