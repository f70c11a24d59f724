//! Parallel task scheduler
//!
//! Executes the task graph on the Tokio runtime as a parallel topological
//! walk:
//! 1. Every task with no dependencies is queued.
//! 2. Up to `max_workers` queued tasks run at once on a [`JoinSet`].
//! 3. When a task completes, its resolved value is recorded and the
//!    dependency count of each dependent is decremented; dependents reaching
//!    zero are queued.
//! 4. When a task fails, every transitive dependent is marked skipped and
//!    never started. Independent branches keep running.
//!
//! Resolved state and outcomes are owned by the scheduling loop; workers get a
//! snapshot of the resolved state of completed tasks when they start.

use crate::delta::Applied;
use crate::error::TaskError;
use crate::graph::TaskGraph;
use crate::target::{Target, TargetKind};
use crate::task::{Resolver, ResolvedState, TaskContext};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Default number of tasks run concurrently
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Tuning for one convergence pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Upper bound on tasks running at the same time (at least 1)
    pub max_workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl RunOptions {
    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }
}

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TaskOutcome {
    Completed(Applied),
    Failed {
        #[serde(serialize_with = "serialize_error")]
        error: TaskError,
    },
    /// Not started because a task it depends on (directly or not) failed
    Skipped { blocked_by: String },
}

fn serialize_error<S: serde::Serializer>(error: &TaskError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl TaskOutcome {
    pub fn applied(&self) -> Option<&Applied> {
        match self {
            TaskOutcome::Completed(applied) => Some(applied),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Everything one convergence pass did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: TargetKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcome of every task, by name
    pub outcomes: BTreeMap<String, TaskOutcome>,
    /// Resolved values of completed tasks
    pub resolved: ResolvedState,
    /// Task kinds, by name
    #[serde(skip)]
    pub(crate) kinds: BTreeMap<String, &'static str>,
}

impl RunReport {
    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(task)
    }

    /// Failed tasks and their errors, by name
    pub fn failures(&self) -> Vec<(&str, &TaskError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| outcome.error().map(|e| (name.as_str(), e)))
            .collect()
    }

    /// Names of tasks that never started
    pub fn skipped(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TaskOutcome::Skipped { .. }))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of completed tasks that had (or planned) changes
    pub fn changed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.applied().is_some_and(|a| a.changes.is_some()))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn kind_of(&self, task: &str) -> &'static str {
        self.kinds.get(task).copied().unwrap_or("unknown")
    }

    /// Every task completed
    pub fn is_converged(&self) -> bool {
        self.outcomes
            .values()
            .all(|outcome| matches!(outcome, TaskOutcome::Completed(_)))
    }
}

/// Run every task in `graph`, honouring dependency order
pub(crate) async fn run_graph<C>(
    graph: &TaskGraph<C>,
    cloud: Arc<C>,
    target: Arc<Target>,
    options: RunOptions,
    run_id: Uuid,
) -> RunReport
where
    C: ?Sized + Send + Sync + 'static,
{
    let started_at = Utc::now();
    let max_workers = options.max_workers.max(1);
    let dag = graph.graph();

    let mut dependency_counts: HashMap<NodeIndex, usize> = dag
        .node_indices()
        .map(|n| (n, dag.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut ready: VecDeque<NodeIndex> = graph
        .topological_order()
        .into_iter()
        .filter_map(|name| graph.node(name))
        .filter(|n| dependency_counts.get(n) == Some(&0))
        .collect();

    let mut resolved = ResolvedState::new();
    let mut outcomes: BTreeMap<String, TaskOutcome> = BTreeMap::new();
    let kinds: BTreeMap<String, &'static str> = dag
        .node_indices()
        .map(|n| (graph.name_of(n).to_string(), dag[n].task_kind()))
        .collect();
    let mut workers: JoinSet<(NodeIndex, Result<Applied, TaskError>)> = JoinSet::new();

    info!(
        "Starting convergence of {} tasks on {} target (max {} workers)",
        graph.len(),
        target.kind(),
        max_workers
    );

    loop {
        while workers.len() < max_workers {
            let Some(node) = ready.pop_front() else {
                break;
            };
            let task = Arc::clone(&dag[node]);
            let cloud = Arc::clone(&cloud);
            let target = Arc::clone(&target);
            let snapshot = resolved.clone();
            let span = info_span!("task", name = %task.task_name(), kind = task.task_kind());

            debug!("Starting task {}", task.task_name());
            workers.spawn(
                async move {
                    let ctx = TaskContext::new(&*cloud, Resolver::new(&snapshot), target.kind());
                    let result = AssertUnwindSafe(task.execute(&ctx, &target))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic.as_ref()))));
                    (node, result)
                }
                .instrument(span),
            );
        }

        let Some(joined) = workers.join_next().await else {
            break;
        };
        let (node, result) = match joined {
            Ok(finished) => finished,
            Err(e) => {
                // Panics are caught inside the worker, so this is a cancelled task
                error!("Worker ended without reporting: {}", e);
                continue;
            }
        };

        let name = graph.name_of(node).to_string();
        match result {
            Ok(applied) => {
                info!("Task {} completed: {}", name, applied.action);
                resolved.insert(name.clone(), applied.resolved.clone());
                outcomes.insert(name, TaskOutcome::Completed(applied));

                for dependent in dag.neighbors_directed(node, Direction::Outgoing) {
                    if let Some(count) = dependency_counts.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(dependent);
                        }
                    }
                }
            }
            Err(e) => {
                error!("Task {} failed: {}", name, e);
                for dependent in graph.transitive_dependents(&name) {
                    if !outcomes.contains_key(dependent) {
                        debug!("Skipping task {}: depends on failed task {}", dependent, name);
                        outcomes.insert(
                            dependent.to_string(),
                            TaskOutcome::Skipped {
                                blocked_by: name.clone(),
                            },
                        );
                    }
                }
                outcomes.insert(name, TaskOutcome::Failed { error: e });
            }
        }
    }

    // Only reachable if a worker was cancelled
    for name in graph.names() {
        if !outcomes.contains_key(name) {
            outcomes.insert(
                name.to_string(),
                TaskOutcome::Failed {
                    error: TaskError::Panicked("worker did not report a result".to_string()),
                },
            );
        }
    }

    RunReport {
        run_id,
        target: target.kind(),
        started_at,
        finished_at: Utc::now(),
        outcomes,
        resolved,
        kinds,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
