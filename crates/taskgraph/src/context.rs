//! Convergence context
//!
//! Owns the task set, the cloud handle and the target for one convergence
//! pass and moves through `Built -> Planned -> Running -> Converged | Failed`.
//! Terminal states are final: a new pass needs a new context.

use crate::error::{EngineError, RunFailure, TaskFailure};
use crate::graph::TaskGraph;
use crate::scheduler::{run_graph, RunOptions, RunReport, TaskOutcome};
use crate::target::Target;
use crate::task::{Resource, Task};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Where a context is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextState {
    Built,
    Planned,
    Running,
    Converged,
    Failed,
}

impl ContextState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ContextState::Converged | ContextState::Failed)
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One convergence pass over a set of tasks
pub struct Context<C: ?Sized + Send + Sync + 'static> {
    run_id: Uuid,
    target: Arc<Target>,
    cloud: Arc<C>,
    tasks: Vec<Arc<dyn Task<C>>>,
    graph: Option<TaskGraph<C>>,
    state: ContextState,
}

impl<C: ?Sized + Send + Sync + 'static> Context<C> {
    pub fn new(target: Target, cloud: Arc<C>, tasks: Vec<Arc<dyn Task<C>>>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target: Arc::new(target),
            cloud,
            tasks,
            graph: None,
            state: ContextState::Built,
        }
    }

    /// Add a task; only allowed before planning
    pub fn add_task<R: Resource<C>>(&mut self, task: R) -> Result<(), EngineError> {
        self.expect_state(ContextState::Built, "add a task to")?;
        self.tasks.push(Arc::new(task));
        Ok(())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn cloud(&self) -> &Arc<C> {
        &self.cloud
    }

    /// The validated graph, once planned
    pub fn graph(&self) -> Option<&TaskGraph<C>> {
        self.graph.as_ref()
    }

    /// Build and validate the dependency graph
    ///
    /// A configuration error leaves the context `Failed`.
    pub fn plan(&mut self) -> Result<&TaskGraph<C>, EngineError> {
        self.expect_state(ContextState::Built, "plan")?;

        let tasks = std::mem::take(&mut self.tasks);
        match TaskGraph::build(tasks) {
            Ok(graph) => {
                info!("Planned {} tasks: {}", graph.len(), graph.topological_order().join(", "));
                self.state = ContextState::Planned;
                Ok(self.graph.insert(graph))
            }
            Err(e) => {
                error!("Task configuration is invalid: {}", e);
                self.state = ContextState::Failed;
                Err(EngineError::Config(e))
            }
        }
    }

    /// Run one convergence pass, planning first if needed
    ///
    /// Fails with [`EngineError::Failed`] listing every task failure when any
    /// task did not complete; the report is carried inside.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunReport, EngineError> {
        if self.state == ContextState::Built {
            self.plan()?;
        }
        self.expect_state(ContextState::Planned, "run")?;
        let Some(graph) = self.graph.as_ref() else {
            return Err(EngineError::InvalidState {
                state: self.state,
                operation: "run",
            });
        };

        self.state = ContextState::Running;
        let span = info_span!("convergence", run_id = %self.run_id, target = %self.target.kind());
        let report = run_graph(
            graph,
            Arc::clone(&self.cloud),
            Arc::clone(&self.target),
            options,
            self.run_id,
        )
        .instrument(span)
        .await;

        if report.is_converged() {
            info!(
                "Convergence {} finished: {} tasks, {} changed",
                self.run_id,
                report.outcomes.len(),
                report.changed().len()
            );
            self.state = ContextState::Converged;
            return Ok(report);
        }

        let failures: Vec<TaskFailure> = report
            .outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                TaskOutcome::Failed { error } => Some(TaskFailure {
                    task: name.clone(),
                    kind: report.kind_of(name),
                    error: error.clone(),
                }),
                _ => None,
            })
            .collect();
        let skipped = report.skipped().into_iter().map(str::to_string).collect();
        let failure = RunFailure {
            failures,
            skipped,
            report,
        };
        error!("Convergence {} failed: {}", self.run_id, failure);
        self.state = ContextState::Failed;
        Err(EngineError::Failed(Box::new(failure)))
    }

    fn expect_state(&self, expected: ContextState, operation: &'static str) -> Result<(), EngineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }
}

impl<C: ?Sized + Send + Sync + 'static> fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("target", &self.target.kind())
            .field("tasks", &self.graph.as_ref().map_or(self.tasks.len(), TaskGraph::len))
            .finish_non_exhaustive()
    }
}
