//! Dry-run target: records what a direct run would change

use super::lock;
use crate::fields::ChangeSet;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Mutex;

/// One change a direct run would make
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub task: String,
    pub kind: &'static str,
    /// The resource does not exist yet
    pub create: bool,
    pub changes: ChangeSet,
}

#[derive(Debug, Default)]
pub struct DryRunTarget {
    planned: Mutex<Vec<PlannedChange>>,
}

impl DryRunTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, change: PlannedChange) {
        lock(&self.planned).push(change);
    }

    /// Planned changes, sorted by task name
    pub fn changes(&self) -> Vec<PlannedChange> {
        let mut planned = lock(&self.planned).clone();
        planned.sort_by(|a, b| a.task.cmp(&b.task));
        planned
    }

    pub fn has_changes(&self) -> bool {
        !lock(&self.planned).is_empty()
    }

    /// Human-readable summary, creations first
    pub fn summary(&self) -> String {
        let planned = self.changes();
        if planned.is_empty() {
            return "No changes need to be applied\n".to_string();
        }

        let mut out = String::new();
        let (creates, updates): (Vec<_>, Vec<_>) = planned.iter().partition(|p| p.create);
        if !creates.is_empty() {
            out.push_str("Will create resources:\n");
            for p in creates {
                let _ = writeln!(out, "  {}\t{}", p.kind, p.task);
            }
        }
        if !updates.is_empty() {
            out.push_str("Will modify resources:\n");
            for p in updates {
                let _ = writeln!(out, "  {}\t{}\t{}", p.kind, p.task, p.changes);
            }
        }
        out
    }
}
