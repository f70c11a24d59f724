//! Dependency graph
//!
//! Tasks are nodes; an edge runs from a dependency to the task that depends on
//! it, so a node's incoming neighbours must complete before it may start.
//! Construction validates the whole task set up front: names, references,
//! per-task configuration and acyclicity.

use crate::error::ConfigError;
use crate::task::Task;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Validated, acyclic task graph
pub struct TaskGraph<C: ?Sized + Send + Sync + 'static> {
    graph: DiGraph<Arc<dyn Task<C>>, ()>,
    index: HashMap<String, NodeIndex>,
}

impl<C: ?Sized + Send + Sync + 'static> TaskGraph<C> {
    /// Build the graph, rejecting duplicate names, self references, unknown
    /// dependencies, invalid task configuration and cycles.
    pub fn build(tasks: Vec<Arc<dyn Task<C>>>) -> Result<Self, ConfigError> {
        let mut graph: DiGraph<Arc<dyn Task<C>>, ()> = DiGraph::new();
        let mut index = HashMap::new();

        for task in tasks {
            let name = task.task_name().to_string();
            if index.contains_key(&name) {
                return Err(ConfigError::DuplicateTask(name));
            }
            task.validate_config().map_err(|reason| ConfigError::InvalidTask {
                task: name.clone(),
                reason,
            })?;
            let node = graph.add_node(task);
            index.insert(name, node);
        }

        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for node in nodes {
            let task = Arc::clone(&graph[node]);
            let name = task.task_name();
            for dependency in task.task_dependencies() {
                if dependency == name {
                    return Err(ConfigError::SelfReference(name.to_string()));
                }
                let Some(&from) = index.get(&dependency) else {
                    return Err(ConfigError::MissingDependency {
                        task: name.to_string(),
                        dependency,
                    });
                };
                graph.update_edge(from, node, ());
            }
        }

        let task_graph = Self { graph, index };
        if let Some(path) = task_graph.find_cycle() {
            return Err(ConfigError::Cycle {
                path: path.join(" -> "),
            });
        }

        debug!(
            "Built task graph: {} tasks, {} edges",
            task_graph.graph.node_count(),
            task_graph.graph.edge_count()
        );
        Ok(task_graph)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn task(&self, name: &str) -> Option<&Arc<dyn Task<C>>> {
        self.index.get(name).map(|&node| &self.graph[node])
    }

    /// Task names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Direct dependencies of a task, sorted
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, Direction::Incoming)
    }

    /// Tasks that directly depend on a task, sorted
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, Direction::Outgoing)
    }

    /// Every task that depends on `name`, directly or not, sorted
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(name) else {
            return Vec::new();
        };
        let mut found = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                found.insert(self.name_of(node));
            }
        }
        found.into_iter().collect()
    }

    /// A dependency-respecting order; ties are broken by name
    pub fn topological_order(&self) -> Vec<&str> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut ready: BTreeSet<(&str, NodeIndex)> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&n, _)| (self.name_of(n), n))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some((name, node)) = ready.pop_first() {
            order.push(name);
            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((self.name_of(dependent), dependent));
                    }
                }
            }
        }
        order
    }

    pub(crate) fn graph(&self) -> &DiGraph<Arc<dyn Task<C>>, ()> {
        &self.graph
    }

    pub(crate) fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub(crate) fn name_of(&self, node: NodeIndex) -> &str {
        self.graph[node].task_name()
    }

    fn neighbours(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&node) = self.index.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.name_of(n))
            .collect();
        names.sort_unstable();
        names
    }

    fn sorted_nodes(&self, nodes: impl Iterator<Item = NodeIndex>) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = nodes.collect();
        nodes.sort_by(|a, b| self.name_of(*a).cmp(self.name_of(*b)));
        nodes
    }

    /// First cycle found walking dependencies in name order, as a closed path
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut path = Vec::new();
        for start in self.sorted_nodes(self.graph.node_indices()) {
            if marks[start.index()] == Mark::Unvisited {
                if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(&self, node: NodeIndex, marks: &mut [Mark], path: &mut Vec<NodeIndex>) -> Option<Vec<String>> {
        marks[node.index()] = Mark::InProgress;
        path.push(node);

        let dependencies = self.sorted_nodes(self.graph.neighbors_directed(node, Direction::Incoming));
        for dependency in dependencies {
            match marks[dependency.index()] {
                Mark::InProgress => {
                    let start = path.iter().position(|&n| n == dependency)?;
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&n| self.name_of(n).to_string())
                        .collect();
                    cycle.push(self.name_of(dependency).to_string());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(dependency, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node.index()] = Mark::Done;
        None
    }
}

impl<C: ?Sized + Send + Sync + 'static> fmt::Debug for TaskGraph<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.names())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}
