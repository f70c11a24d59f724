//! Error types for the task-graph engine.
//!
//! Three layers:
//! - [`ConfigError`]: the task set cannot form a valid graph (reported before any work)
//! - [`TaskError`]: one task failed while running its delta
//! - [`EngineError`]: what [`Context`](crate::Context) operations return

use crate::context::ContextState;
use crate::scheduler::RunReport;
use std::fmt;
use thiserror::Error;

/// Errors detected while building the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two tasks share a name
    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    /// A task lists itself as a dependency
    #[error("task {0} references itself")]
    SelfReference(String),

    /// A task depends on a name no task carries
    #[error("task {task} depends on unknown task {dependency}")]
    MissingDependency { task: String, dependency: String },

    /// The dependency relation has a cycle; `path` reads `a -> b -> a`
    #[error("dependency cycle: {path}")]
    Cycle { path: String },

    /// A task rejected its own configuration
    #[error("invalid task {task}: {reason}")]
    InvalidTask { task: String, reason: String },
}

/// Errors a single task can fail with.
///
/// Cloned into the run report, so every variant carries owned text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Looking up the actual state failed
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The change set touches a field that cannot change after creation
    #[error("field {field} cannot be changed")]
    ImmutableField { field: String },

    /// A resource-specific change check rejected the change set
    #[error("validation failed: {0}")]
    Validation(String),

    /// The resource must already exist but was not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A referenced task has not produced the value needed here
    #[error("reference to {0} is not resolved")]
    ReferenceNotResolved(String),

    /// Lookup by criteria matched more than one resource
    #[error("found {count} {kind} resources matching {criteria}")]
    AmbiguousMatch {
        kind: String,
        criteria: String,
        count: usize,
    },

    /// Rendering to a declarative document failed
    #[error("render failed: {0}")]
    Render(String),

    /// A cloud call made while applying changes failed
    #[error("cloud call failed: {0}")]
    Backend(String),

    /// The worker running this task panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// A task failure as it appears in an aggregated run failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task: String,
    pub kind: &'static str,
    pub error: TaskError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.task, self.kind, self.error)
    }
}

/// Every failure of one convergence pass, with the full report
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub failures: Vec<TaskFailure>,
    pub skipped: Vec<String>,
    pub report: RunReport,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.failures.len())?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        for (i, failure) in self.failures.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for RunFailure {}

/// Errors returned by [`Context`](crate::Context) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The task set is not a valid graph
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The operation is not allowed in the current state
    #[error("cannot {operation} a context in state {state}")]
    InvalidState {
        state: ContextState,
        operation: &'static str,
    },

    /// One or more tasks failed during the run
    #[error("convergence failed: {0}")]
    Failed(Box<RunFailure>),
}

impl EngineError {
    /// The aggregated failure, if this is a run failure
    pub fn run_failure(&self) -> Option<&RunFailure> {
        match self {
            EngineError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
