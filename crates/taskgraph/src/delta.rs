//! Delta method
//!
//! Every [`Resource`] runs the same sequence: look up the actual value,
//! diff it against the desired one, validate the change set, then dispatch to
//! the target. This module provides that sequence as the blanket [`Task`]
//! implementation.

use crate::diff::diff;
use crate::error::TaskError;
use crate::fields::ChangeSet;
use crate::target::{PlannedChange, RenderTarget, Target};
use crate::task::{Lifecycle, Resolved, Resource, Task, TaskContext};
use crate::validate::validate;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// What a task did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Created through the direct target
    Created,
    /// Updated through the direct target
    Updated,
    /// Already matched the desired value
    Unchanged,
    /// Changes recorded by a dry run
    Planned,
    /// Emitted to a declarative document
    Rendered,
    /// Differences logged and left alone
    DriftIgnored,
    /// Lifecycle is `Ignore`
    Ignored,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Unchanged => "unchanged",
            Action::Planned => "planned",
            Action::Rendered => "rendered",
            Action::DriftIgnored => "drift ignored",
            Action::Ignored => "ignored",
        })
    }
}

/// Result of a successful task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applied {
    pub action: Action,
    /// `None` when the resource existed and matched
    pub changes: Option<ChangeSet>,
    pub resolved: Resolved,
}

/// What dependents see when no render produced anything better
fn resolved_from<C, R>(actual: Option<&R>, desired: &R) -> Resolved
where
    C: ?Sized + Send + Sync,
    R: Resource<C>,
{
    let id = actual
        .and_then(|a| a.identifier())
        .or_else(|| desired.ownership().shared_id())
        .map(str::to_string);
    Resolved { id, link: None }
}

/// Resolved state of a task that renders nothing into a declarative document
///
/// Dependents in the document then refer to it by its literal id.
fn unrendered<C, R>(actual: Option<&R>, desired: &R, target: &Target) -> Resolved
where
    C: ?Sized + Send + Sync,
    R: Resource<C>,
{
    let mut resolved = resolved_from::<C, R>(actual, desired);
    if target.kind().is_declarative() {
        resolved.link = resolved.id.clone().map(serde_json::Value::String);
    }
    resolved
}

#[async_trait]
impl<C, R> Task<C> for R
where
    C: ?Sized + Send + Sync,
    R: Resource<C>,
{
    fn task_name(&self) -> &str {
        self.name()
    }

    fn task_kind(&self) -> &'static str {
        R::KIND
    }

    fn task_lifecycle(&self) -> Lifecycle {
        self.lifecycle()
    }

    fn task_dependencies(&self) -> Vec<String> {
        self.dependencies()
    }

    fn validate_config(&self) -> Result<(), String> {
        self.check_config()
    }

    async fn execute(&self, ctx: &TaskContext<'_, C>, target: &Target) -> Result<Applied, TaskError> {
        let name = self.name();
        let lifecycle = self.lifecycle();

        if lifecycle == Lifecycle::Ignore {
            debug!("{} {}: lifecycle is Ignore, skipping", R::KIND, name);
            return Ok(Applied {
                action: Action::Ignored,
                changes: None,
                resolved: unrendered::<C, R>(None, self, target),
            });
        }

        let actual = self.find(ctx).await?;
        let resolver = ctx.resolver();
        let desired_fields = self.fields(resolver);
        let actual_fields = actual.as_ref().map(|a| a.fields(resolver));
        let changes = diff(actual_fields.as_ref(), &desired_fields);

        if let Some(changes) = &changes {
            validate::<C, R>(actual.as_ref(), self, changes)?;
        }

        match lifecycle {
            Lifecycle::ExistsAndValidates | Lifecycle::ExistsAndWarnIfChanges if actual.is_none() => {
                return Err(TaskError::NotFound(format!(
                    "{} {} must already exist",
                    R::KIND,
                    name
                )));
            }
            Lifecycle::ExistsAndValidates => {
                if let Some(changes) = changes.as_ref().filter(|c| !c.is_empty()) {
                    return Err(TaskError::Validation(format!(
                        "{} {} differs from the desired state: {}",
                        R::KIND,
                        name,
                        changes
                    )));
                }
            }
            Lifecycle::ExistsAndWarnIfChanges => {
                if let Some(changes) = changes.as_ref().filter(|c| !c.is_empty()) {
                    warn!("{} {} differs from the desired state, leaving it as is: {}", R::KIND, name, changes);
                }
                return Ok(Applied {
                    action: Action::DriftIgnored,
                    changes,
                    resolved: unrendered::<C, R>(actual.as_ref(), self, target),
                });
            }
            Lifecycle::Sync | Lifecycle::Ignore => {}
        }

        let render_target = match target.render_target() {
            Some(render_target) => render_target,
            None => {
                if let (Target::DryRun(dry_run), Some(planned)) = (target, &changes) {
                    dry_run.record(PlannedChange {
                        task: name.to_string(),
                        kind: R::KIND,
                        create: actual.is_none(),
                        changes: planned.clone(),
                    });
                }
                return Ok(Applied {
                    action: Action::Planned,
                    resolved: resolved_from::<C, R>(actual.as_ref(), self),
                    changes,
                });
            }
        };

        match render_target {
            RenderTarget::Direct => {
                let Some(pending) = &changes else {
                    debug!("{} {} is up to date", R::KIND, name);
                    return Ok(Applied {
                        action: Action::Unchanged,
                        changes: None,
                        resolved: resolved_from::<C, R>(actual.as_ref(), self),
                    });
                };
                if actual.is_none() && self.ownership().is_shared() {
                    return Err(TaskError::NotFound(format!(
                        "shared {} {} was not found",
                        R::KIND,
                        name
                    )));
                }

                let mut resolved = self.render(render_target, ctx, actual.as_ref(), pending).await?;
                if resolved.id.is_none() {
                    resolved.id = resolved_from::<C, R>(actual.as_ref(), self).id;
                }
                let action = if actual.is_none() { Action::Created } else { Action::Updated };
                info!("{} {} {}: {}", R::KIND, name, action, pending);
                Ok(Applied { action, changes, resolved })
            }
            RenderTarget::Terraform(_) | RenderTarget::CloudFormation(_) => {
                let discovered = if self.ownership().is_shared()
                    && self.ownership().shared_id().is_none()
                    && actual.is_none()
                {
                    match self.discover(ctx).await {
                        Ok(Some(id)) => {
                            debug!("{} {}: discovered shared id {}", R::KIND, name, id);
                            Some(id)
                        }
                        Ok(None) => {
                            warn!("{} {}: shared resource has no id and none was discovered", R::KIND, name);
                            None
                        }
                        Err(e) => {
                            warn!("{} {}: discovery of shared resource failed: {}", R::KIND, name, e);
                            None
                        }
                    }
                } else {
                    None
                };

                let ctx = ctx.with_discovered_id(discovered.clone());
                let pending = changes.clone().unwrap_or_default();
                let mut resolved = self.render(render_target, &ctx, actual.as_ref(), &pending).await?;
                if resolved.id.is_none() {
                    resolved.id = resolved_from::<C, R>(actual.as_ref(), self).id.or(discovered);
                }
                debug!("{} {} rendered to {}", R::KIND, name, target.kind());
                Ok(Applied {
                    action: Action::Rendered,
                    changes,
                    resolved,
                })
            }
        }
    }
}
