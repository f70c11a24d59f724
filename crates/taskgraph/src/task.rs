//! Task contract
//!
//! Resource plugins implement [`Resource`]: how to look up the actual value,
//! how to describe a value as comparable [`Fields`], and how to render changes
//! to a target. The engine works with the object-safe [`Task`] trait, which
//! every `Resource` gets through a blanket implementation (see `delta.rs`).
//!
//! Dependencies are explicit: a resource lists its [`Reference`]s and the
//! engine derives graph edges from the ones that name other tasks.

use crate::delta::Applied;
use crate::error::TaskError;
use crate::fields::{ChangeSet, Fields};
use crate::target::{RenderTarget, Target, TargetKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How strictly a task reconciles its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    /// Create or update to match the desired value
    #[default]
    Sync,
    /// Require existence; log differences but change nothing
    ExistsAndWarnIfChanges,
    /// Require existence and fail on any difference
    ExistsAndValidates,
    /// Do nothing
    Ignore,
}

/// Who owns the underlying cloud resource
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ownership {
    /// Created and managed by this run
    #[default]
    Owned,
    /// Pre-existing; never created or deleted. With no id, it is discovered.
    Shared { id: Option<String> },
}

impl Ownership {
    /// Shared resource with a known id
    pub fn shared(id: impl Into<String>) -> Self {
        Ownership::Shared { id: Some(id.into()) }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Ownership::Shared { .. })
    }

    /// Known identifier of a shared resource
    pub fn shared_id(&self) -> Option<&str> {
        match self {
            Ownership::Shared { id } => id.as_deref(),
            Ownership::Owned => None,
        }
    }
}

/// Pointer from one resource to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reference {
    /// Another task in the same graph, by name (creates a dependency edge)
    Task(String),
    /// A literal cloud identifier (no edge)
    Id(String),
}

impl Reference {
    /// Reference to another task in the graph
    pub fn task(name: impl Into<String>) -> Self {
        Reference::Task(name.into())
    }

    /// Literal cloud id, outside the graph
    pub fn id(id: impl Into<String>) -> Self {
        Reference::Id(id.into())
    }

    /// Name of the referenced task, if this points at one
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Reference::Task(name) => Some(name),
            Reference::Id(_) => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Task(name) => write!(f, "task {}", name),
            Reference::Id(id) => f.write_str(id),
        }
    }
}

/// What a completed task publishes to the tasks that depend on it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolved {
    /// Cloud identifier, when known
    pub id: Option<String>,
    /// Value other declarative fragments use to refer to this resource
    pub link: Option<serde_json::Value>,
}

impl Resolved {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            link: None,
        }
    }

    pub fn with_link(link: serde_json::Value) -> Self {
        Self { id: None, link: Some(link) }
    }
}

/// Resolved values of completed tasks, by task name
pub type ResolvedState = BTreeMap<String, Resolved>;

/// Read-only view of resolved state handed to tasks
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    resolved: &'a ResolvedState,
}

impl<'a> Resolver<'a> {
    /// Resolver over the state published so far
    pub fn new(resolved: &'a ResolvedState) -> Self {
        Self { resolved }
    }

    pub fn get(&self, task: &str) -> Option<&'a Resolved> {
        self.resolved.get(task)
    }

    /// Cloud identifier a reference points at, if known
    pub fn id(&self, reference: &Reference) -> Option<String> {
        match reference {
            Reference::Id(id) => Some(id.clone()),
            Reference::Task(name) => self.get(name).and_then(|r| r.id.clone()),
        }
    }

    /// Like [`Resolver::id`], but an unresolved reference is an error
    pub fn require_id(&self, reference: &Reference) -> Result<String, TaskError> {
        self.id(reference)
            .ok_or_else(|| TaskError::ReferenceNotResolved(reference.to_string()))
    }

    /// Declarative link for a reference; a literal id links to itself
    pub fn require_link(&self, reference: &Reference) -> Result<serde_json::Value, TaskError> {
        match reference {
            Reference::Id(id) => Ok(serde_json::Value::String(id.clone())),
            Reference::Task(name) => self
                .get(name)
                .and_then(|r| r.link.clone())
                .ok_or_else(|| TaskError::ReferenceNotResolved(reference.to_string())),
        }
    }
}

/// Everything a task may use while running
pub struct TaskContext<'a, C: ?Sized> {
    cloud: &'a C,
    resolver: Resolver<'a>,
    target: TargetKind,
    discovered_id: Option<String>,
}

impl<'a, C: ?Sized> TaskContext<'a, C> {
    pub fn new(cloud: &'a C, resolver: Resolver<'a>, target: TargetKind) -> Self {
        Self {
            cloud,
            resolver,
            target,
            discovered_id: None,
        }
    }

    /// Cloud handle the task runs against
    pub fn cloud(&self) -> &'a C {
        self.cloud
    }

    /// State of the completed dependencies
    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    /// Identifier found by [`Resource::discover`] for a shared resource
    /// without one, when rendering declaratively
    pub fn discovered_id(&self) -> Option<&str> {
        self.discovered_id.as_deref()
    }

    pub(crate) fn with_discovered_id(&self, id: Option<String>) -> Self {
        Self {
            cloud: self.cloud,
            resolver: self.resolver,
            target: self.target,
            discovered_id: id,
        }
    }
}

impl<C: ?Sized> fmt::Debug for TaskContext<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("target", &self.target)
            .field("discovered_id", &self.discovered_id)
            .finish_non_exhaustive()
    }
}

/// A typed cloud resource, reconciled against cloud handle `C`
///
/// The same type serves as the desired value (built from configuration) and
/// the actual value (returned by [`find`](Resource::find)).
#[async_trait]
pub trait Resource<C: ?Sized + Send + Sync>: fmt::Debug + Send + Sync + Sized + 'static {
    /// Resource kind, used in logs and errors
    const KIND: &'static str;

    /// Task name, unique in the graph
    fn name(&self) -> &str;

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    fn ownership(&self) -> &Ownership;

    /// Cloud identifier of this value (set on values returned by `find`)
    fn identifier(&self) -> Option<&str>;

    /// References to other resources
    fn references(&self) -> Vec<&Reference> {
        Vec::new()
    }

    /// Names of the tasks this one must run after
    fn dependencies(&self) -> Vec<String> {
        self.references()
            .into_iter()
            .filter_map(|r| r.task_name().map(str::to_string))
            .collect()
    }

    /// Reject configuration that can never converge, before any work starts
    fn check_config(&self) -> Result<(), String> {
        Ok(())
    }

    /// Comparable description of this value
    fn fields(&self, resolver: &Resolver<'_>) -> Fields;

    /// Fields that may not change once the resource exists
    fn immutable_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Look up the actual resource; `Ok(None)` when it does not exist
    async fn find(&self, ctx: &TaskContext<'_, C>) -> Result<Option<Self>, TaskError>;

    /// Resource-specific change checks, run after the immutable-field check
    fn check_changes(&self, _actual: &Self, _changes: &ChangeSet) -> Result<(), TaskError> {
        Ok(())
    }

    /// Find the identifier of a shared resource that was configured without one
    async fn discover(&self, _ctx: &TaskContext<'_, C>) -> Result<Option<String>, TaskError> {
        Ok(None)
    }

    /// Apply (direct) or emit (declarative) the changes
    async fn render(
        &self,
        target: RenderTarget<'_>,
        ctx: &TaskContext<'_, C>,
        actual: Option<&Self>,
        changes: &ChangeSet,
    ) -> Result<Resolved, TaskError>;
}

/// Object-safe view of a task, as the engine schedules it
#[async_trait]
pub trait Task<C: ?Sized + Send + Sync>: fmt::Debug + Send + Sync {
    fn task_name(&self) -> &str;

    fn task_kind(&self) -> &'static str;

    fn task_lifecycle(&self) -> Lifecycle;

    fn task_dependencies(&self) -> Vec<String>;

    fn validate_config(&self) -> Result<(), String>;

    /// Run the full delta for this task against `target`
    async fn execute(&self, ctx: &TaskContext<'_, C>, target: &Target) -> Result<Applied, TaskError>;
}
