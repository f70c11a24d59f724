//! Virtual private gateway task
//!
//! A gateway is attached to at most one VPC. Shared gateways are never
//! created, renamed or re-tagged: converging one only attaches it to (or
//! detaches it from) the desired VPC. Owned gateways are created and tagged
//! with their task name.

use crate::cloud::{backend_error, lookup_error, missing_tags, owned_tags, single, Cloud};
use async_trait::async_trait;
use ec2_client::{map_to_tags, tags_to_map, Filter};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use taskgraph::{
    ChangeSet, CloudFormationTarget, Fields, Lifecycle, Ownership, Reference, RenderTarget, Resolved, Resolver,
    Resource, TaskContext, TaskError, TerraformTarget,
};
use tracing::{debug, info, warn};

/// Gateway type used when none is configured
pub const DEFAULT_GATEWAY_TYPE: &str = "ipsec.1";

const TERRAFORM_TYPE: &str = "aws_vpn_gateway";
const TERRAFORM_ATTACHMENT_TYPE: &str = "aws_vpn_gateway_attachment";
const CLOUDFORMATION_TYPE: &str = "AWS::EC2::VPNGateway";
const CLOUDFORMATION_ATTACHMENT_TYPE: &str = "AWS::EC2::VPCGatewayAttachment";

/// A virtual private gateway, optionally attached to one VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnGateway {
    /// Task name; also the `Name` tag of owned gateways
    pub name: String,
    pub lifecycle: Lifecycle,
    pub ownership: Ownership,
    /// Set on values returned by lookup
    pub id: Option<String>,
    /// VPC the gateway should be attached to
    pub vpc: Option<Reference>,
    pub gateway_type: String,
    pub tags: BTreeMap<String, String>,
}

impl VpnGateway {
    /// A gateway created and managed by cloudup
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Lifecycle::Sync,
            ownership: Ownership::Owned,
            id: None,
            vpc: None,
            gateway_type: DEFAULT_GATEWAY_TYPE.to_string(),
            tags: BTreeMap::new(),
        }
    }

    /// A pre-existing gateway; without an id it is discovered through its VPC
    /// attachment or `Name` tag
    pub fn shared(name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            ownership: Ownership::Shared { id },
            ..Self::new(name)
        }
    }

    /// Attach to a VPC task or a literal VPC id
    pub fn with_vpc(mut self, vpc: Reference) -> Self {
        self.vpc = Some(vpc);
        self
    }

    /// Gateway type, [`DEFAULT_GATEWAY_TYPE`] unless set
    pub fn with_gateway_type(mut self, gateway_type: impl Into<String>) -> Self {
        self.gateway_type = gateway_type.into();
        self
    }

    /// Extra tag; ignored for shared gateways
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// How far cloudup may go in reconciling this gateway
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    fn actual_from(&self, vgw: ec2_client::VpnGateway) -> Self {
        let vpc = vgw.attached_vpc_ids().next().map(Reference::id);
        Self {
            // Not stored in the cloud; copied so it never shows as a change
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            ownership: self.ownership.clone(),
            id: Some(vgw.vpn_gateway_id),
            vpc,
            gateway_type: vgw.gateway_type,
            tags: tags_to_map(&vgw.tags),
        }
    }

    async fn lookup(&self, cloud: &Cloud, resolver: &Resolver<'_>) -> Result<Option<ec2_client::VpnGateway>, TaskError> {
        let vpc_id = self.vpc.as_ref().and_then(|vpc| resolver.id(vpc));
        let (ids, filters, criteria) = match (&self.ownership, vpc_id) {
            (Ownership::Shared { id: Some(id) }, _) => (vec![id.clone()], Vec::new(), format!("id={}", id)),
            (Ownership::Shared { id: None }, Some(vpc_id)) => (
                Vec::new(),
                vec![Filter::new("attachment.vpc-id", [vpc_id.clone()])],
                format!("attachment.vpc-id={}", vpc_id),
            ),
            _ => (
                Vec::new(),
                vec![Filter::tag(ec2_client::NAME_TAG, self.name.clone())],
                format!("Name={}", self.name),
            ),
        };

        let found = cloud
            .describe_vpn_gateways(&ids, &filters)
            .await
            .map_err(|e| lookup_error(Self::KIND, e))?;
        single(Self::KIND, || criteria.clone(), found)
    }

    /// Identifier a declarative document should use for a shared gateway
    fn literal_id(&self, ctx: &TaskContext<'_, Cloud>, actual: Option<&Self>) -> Option<String> {
        self.ownership
            .shared_id()
            .or(ctx.discovered_id())
            .or(actual.and_then(|a| a.id.as_deref()))
            .map(str::to_string)
    }

    fn desired_vpc_id(&self, resolver: &Resolver<'_>) -> Result<Option<String>, TaskError> {
        self.vpc.as_ref().map(|vpc| resolver.require_id(vpc)).transpose()
    }

    async fn apply(
        &self,
        ctx: &TaskContext<'_, Cloud>,
        actual: Option<&Self>,
        changes: &ChangeSet,
    ) -> Result<String, TaskError> {
        let cloud = ctx.cloud();
        let desired_vpc = self.desired_vpc_id(ctx.resolver())?;

        let (vgw_id, attached_vpc) = match actual {
            Some(actual) => (
                actual.id.clone().unwrap_or_default(),
                actual.vpc.as_ref().and_then(|vpc| ctx.resolver().id(vpc)),
            ),
            None => {
                info!("Creating VPN gateway {} ({})", self.name, self.gateway_type);
                let vgw = cloud
                    .create_vpn_gateway(&self.gateway_type)
                    .await
                    .map_err(|e| backend_error("creating VPN gateway", &self.name, e))?;
                let tags = map_to_tags(&owned_tags(&self.name, &self.tags));
                cloud
                    .create_tags(&vgw.vpn_gateway_id, &tags)
                    .await
                    .map_err(|e| backend_error("tagging VPN gateway", &vgw.vpn_gateway_id, e))?;
                (vgw.vpn_gateway_id, None)
            }
        };

        if actual.is_none() || changes.contains("vpc") {
            if let Some(previous) = attached_vpc.filter(|previous| desired_vpc.as_ref() != Some(previous)) {
                info!("Detaching VPN gateway {} from VPC {}", vgw_id, previous);
                cloud
                    .detach_vpn_gateway(&vgw_id, &previous)
                    .await
                    .map_err(|e| backend_error("detaching VPN gateway", &vgw_id, e))?;
            }
            if let Some(vpc_id) = &desired_vpc {
                info!("Attaching VPN gateway {} to VPC {}", vgw_id, vpc_id);
                cloud
                    .attach_vpn_gateway(&vgw_id, vpc_id)
                    .await
                    .map_err(|e| backend_error("attaching VPN gateway", &vgw_id, e))?;
            }
        }

        if let Some(actual) = actual.filter(|_| changes.contains("tags")) {
            let tags = missing_tags(&actual.tags, &owned_tags(&self.name, &self.tags));
            if !tags.is_empty() {
                cloud
                    .create_tags(&vgw_id, &tags)
                    .await
                    .map_err(|e| backend_error("tagging VPN gateway", &vgw_id, e))?;
            }
        }

        Ok(vgw_id)
    }

    /// Whether a declarative document must carry the attachment
    fn renders_attachment(&self, changes: &ChangeSet) -> bool {
        self.vpc.is_some() && (!self.ownership.is_shared() || changes.contains("vpc"))
    }
}

#[derive(Debug, Serialize)]
struct TerraformVpnGateway {
    #[serde(rename = "type")]
    gateway_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct TerraformVpnGatewayAttachment {
    vpc_id: Value,
    vpn_gateway_id: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CloudFormationVpnGateway {
    #[serde(rename = "Type")]
    gateway_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<ec2_client::Tag>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CloudFormationVpcGatewayAttachment {
    vpc_id: Value,
    vpn_gateway_id: Value,
}

#[async_trait]
impl Resource<Cloud> for VpnGateway {
    const KIND: &'static str = "VpnGateway";

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

    fn references(&self) -> Vec<&Reference> {
        self.vpc.iter().collect()
    }

    fn check_config(&self) -> Result<(), String> {
        if self.gateway_type.is_empty() {
            return Err("gateway type must not be empty".to_string());
        }
        Ok(())
    }

    fn fields(&self, resolver: &Resolver<'_>) -> Fields {
        let id = self.id.as_deref().or(self.ownership.shared_id());
        let mut fields = Fields::new().text("name", Some(self.name.as_str())).text("id", id);
        if let Some(vpc) = &self.vpc {
            fields = fields.reference("vpc", resolver.id(vpc));
        }
        if self.id.is_some() {
            fields.tags("tags", &self.tags)
        } else if self.ownership.is_shared() {
            // Shared gateways keep whatever tags they have
            fields
        } else {
            fields.tags("tags", &owned_tags(&self.name, &self.tags))
        }
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["name", "id"]
    }

    async fn find(&self, ctx: &TaskContext<'_, Cloud>) -> Result<Option<Self>, TaskError> {
        let found = self.lookup(ctx.cloud(), ctx.resolver()).await?;
        match &found {
            Some(vgw) => debug!("found matching VPN gateway {} for {}", vgw.vpn_gateway_id, self.name),
            None => debug!("no VPN gateway found for {}", self.name),
        }
        Ok(found.map(|vgw| self.actual_from(vgw)))
    }

    fn check_changes(&self, actual: &Self, changes: &ChangeSet) -> Result<(), TaskError> {
        if self.ownership.is_shared() {
            if let Some(field) = changes.fields().find(|f| *f != "vpc") {
                return Err(TaskError::Validation(format!(
                    "shared VPN gateway {} ({}) can only be attached or detached, not changed in {}",
                    self.name,
                    actual.id.as_deref().unwrap_or("unknown id"),
                    field
                )));
            }
        }
        Ok(())
    }

    async fn discover(&self, ctx: &TaskContext<'_, Cloud>) -> Result<Option<String>, TaskError> {
        Ok(self
            .lookup(ctx.cloud(), ctx.resolver())
            .await?
            .map(|vgw| vgw.vpn_gateway_id))
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
                let id = self.apply(ctx, actual, changes).await?;
                Ok(Resolved::with_id(id))
            }
            RenderTarget::Terraform(tf) => {
                let (id, gateway) = if self.ownership.is_shared() {
                    let id = self.literal_id(ctx, actual);
                    (id.clone(), id.map(Value::String))
                } else {
                    tf.add_resource(
                        TERRAFORM_TYPE,
                        &self.name,
                        TerraformVpnGateway {
                            gateway_type: self.gateway_type.clone(),
                            tags: owned_tags(&self.name, &self.tags),
                        },
                    )?;
                    (
                        actual.and_then(|a| a.id.clone()),
                        Some(TerraformTarget::link(TERRAFORM_TYPE, &self.name, "id")),
                    )
                };

                if let Some(vpc) = self.vpc.as_ref().filter(|_| self.renders_attachment(changes)) {
                    match &gateway {
                        Some(gateway) => tf.add_resource(
                            TERRAFORM_ATTACHMENT_TYPE,
                            &self.name,
                            TerraformVpnGatewayAttachment {
                                vpc_id: ctx.resolver().require_link(vpc)?,
                                vpn_gateway_id: gateway.clone(),
                            },
                        )?,
                        None => warn!("cannot render attachment of VPN gateway {}: id is unknown", self.name),
                    }
                }
                Ok(Resolved { id, link: gateway })
            }
            RenderTarget::CloudFormation(cf) => {
                let (id, gateway) = if self.ownership.is_shared() {
                    let id = self.literal_id(ctx, actual);
                    (id.clone(), id.map(Value::String))
                } else {
                    cf.add_resource(
                        CLOUDFORMATION_TYPE,
                        &self.name,
                        CloudFormationVpnGateway {
                            gateway_type: self.gateway_type.clone(),
                            tags: map_to_tags(&owned_tags(&self.name, &self.tags)),
                        },
                    )?;
                    (
                        actual.and_then(|a| a.id.clone()),
                        Some(CloudFormationTarget::reference(CLOUDFORMATION_TYPE, &self.name)),
                    )
                };

                if let Some(vpc) = self.vpc.as_ref().filter(|_| self.renders_attachment(changes)) {
                    match &gateway {
                        Some(gateway) => cf.add_resource(
                            CLOUDFORMATION_ATTACHMENT_TYPE,
                            &self.name,
                            CloudFormationVpcGatewayAttachment {
                                vpc_id: ctx.resolver().require_link(vpc)?,
                                vpn_gateway_id: gateway.clone(),
                            },
                        )?,
                        None => warn!("cannot render attachment of VPN gateway {}: id is unknown", self.name),
                    }
                }
                Ok(Resolved { id, link: gateway })
            }
        }
    }
}
