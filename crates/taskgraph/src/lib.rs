//! Task-graph reconciliation engine
//!
//! Cloud infrastructure is described as a set of named tasks, one per
//! resource. Each task knows how to find the actual resource, how to compare
//! it to the desired value and how to render the difference. The engine:
//!
//! - builds a dependency graph from each task's explicit references and
//!   rejects invalid sets (duplicates, unknown references, cycles)
//! - runs tasks in parallel, each only after everything it depends on
//! - diffs, validates and renders through one delta method per resource
//! - renders to the cloud directly, to a dry-run plan, or to Terraform JSON or
//!   CloudFormation documents
//!
//! The engine is generic over the cloud handle `C` and knows nothing about
//! any particular cloud API.
//!
//! # Example
//!
//! ```ignore
//! use taskgraph::{Context, RunOptions, Target, TargetKind};
//!
//! let mut context = Context::new(Target::new(TargetKind::DryRun), cloud, tasks);
//! let report = context.run(RunOptions::default()).await?;
//! if let Target::DryRun(plan) = context.target() {
//!     print!("{}", plan.summary());
//! }
//! ```

pub mod context;
pub mod delta;
pub mod diff;
pub mod error;
pub mod fields;
pub mod graph;
pub mod scheduler;
pub mod target;
pub mod task;
pub mod validate;

pub use context::{Context, ContextState};
pub use delta::{Action, Applied};
pub use diff::diff;
pub use error::{ConfigError, EngineError, RunFailure, TaskError, TaskFailure};
pub use fields::{ChangeSet, Equality, Field, FieldChange, FieldValue, Fields};
pub use graph::TaskGraph;
pub use scheduler::{RunOptions, RunReport, TaskOutcome, DEFAULT_MAX_WORKERS};
pub use target::{
    CloudFormationTarget, DryRunTarget, PlannedChange, RenderTarget, Target, TargetKind, TerraformTarget,
    CLOUDFORMATION_FILE, TERRAFORM_FILE,
};
pub use task::{
    Lifecycle, Ownership, Reference, Resolved, ResolvedState, Resolver, Resource, Task, TaskContext,
};
pub use validate::validate;
