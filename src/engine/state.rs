// src/engine/state.rs

//! Per-branch execution state.

use std::collections::HashMap;

use tracing::debug;

use crate::filter::Branch;
use crate::graph::{ItemId, SubgraphId, WorkflowGraph};

/// Execution state of one item within one branch.
///
/// `Pending -> Running -> {Completed, Failed, Skipped}`. An item moves to
/// `Running` only when every predecessor in the branch is `Completed`; a
/// failed or skipped predecessor forces all transitive successors to
/// `Skipped` without execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecState::Completed | ExecState::Failed | ExecState::Skipped
        )
    }
}

/// Mutable execution state for one branch of one sub-graph.
///
/// Each branch owns its own state table even though all branches of a
/// sub-graph share topology. State transitions happen through the methods
/// below, each driven by exactly one scheduling decision.
#[derive(Debug)]
pub struct BranchRun {
    pub subgraph: SubgraphId,
    pub branch: Branch,
    states: HashMap<ItemId, ExecState>,
}

impl BranchRun {
    pub fn new(subgraph: SubgraphId, branch: Branch, items: &[ItemId]) -> Self {
        let states = items.iter().map(|&id| (id, ExecState::Pending)).collect();
        Self {
            subgraph,
            branch,
            states,
        }
    }

    pub fn state(&self, item: ItemId) -> ExecState {
        self.states[&item]
    }

    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.states.keys().copied()
    }

    /// Items that are `Pending` with every in-branch predecessor `Completed`,
    /// sorted by arena index for deterministic dispatch order.
    pub fn ready_items(&self, graph: &WorkflowGraph) -> Vec<ItemId> {
        let mut ready: Vec<ItemId> = self
            .states
            .iter()
            .filter(|(id, state)| {
                **state == ExecState::Pending
                    && graph
                        .predecessors_of(**id)
                        .iter()
                        .filter(|p| self.states.contains_key(*p))
                        .all(|p| self.states[p] == ExecState::Completed)
            })
            .map(|(id, _)| *id)
            .collect();
        ready.sort();
        ready
    }

    pub fn mark_running(&mut self, item: ItemId) {
        debug_assert_eq!(self.state(item), ExecState::Pending);
        self.states.insert(item, ExecState::Running);
    }

    pub fn mark_completed(&mut self, item: ItemId) {
        self.states.insert(item, ExecState::Completed);
    }

    pub fn mark_failed(&mut self, item: ItemId) {
        self.states.insert(item, ExecState::Failed);
    }

    pub fn mark_skipped(&mut self, item: ItemId) {
        self.states.insert(item, ExecState::Skipped);
    }

    /// Transitively mark not-yet-started successors of `item` as `Skipped`.
    ///
    /// Returns the newly skipped items in breadth-first order. Running items
    /// are left alone (their manager will report a terminal state); already
    /// terminal items stop the traversal.
    pub fn skip_dependents(&mut self, graph: &WorkflowGraph, item: ItemId) -> Vec<ItemId> {
        let mut queue: Vec<ItemId> = graph
            .successors_of(item)
            .iter()
            .filter(|s| self.states.contains_key(*s))
            .copied()
            .collect();
        queue.sort();

        let mut skipped = Vec::new();
        let mut cursor = 0;
        while cursor < queue.len() {
            let next = queue[cursor];
            cursor += 1;

            if self.states[&next] != ExecState::Pending {
                continue;
            }
            self.states.insert(next, ExecState::Skipped);
            debug!(
                item = %graph.item(next).name,
                branch = %self.branch.label,
                "skipping dependent after upstream failure"
            );
            skipped.push(next);

            let mut succs: Vec<ItemId> = graph
                .successors_of(next)
                .iter()
                .filter(|s| self.states.contains_key(*s) && !queue.contains(*s))
                .copied()
                .collect();
            succs.sort();
            queue.extend(succs);
        }

        skipped
    }

    /// Mark every `Pending` item `Skipped` (cancellation path). Running
    /// items stay put until their manager acknowledges termination.
    pub fn skip_pending(&mut self) -> Vec<ItemId> {
        let mut skipped: Vec<ItemId> = self
            .states
            .iter()
            .filter(|(_, state)| **state == ExecState::Pending)
            .map(|(id, _)| *id)
            .collect();
        skipped.sort();
        for &id in skipped.iter() {
            self.states.insert(id, ExecState::Skipped);
        }
        skipped
    }

    pub fn running_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == ExecState::Running)
            .count()
    }

    /// True when no item is `Pending` or `Running`.
    pub fn is_terminal(&self) -> bool {
        !self
            .states
            .values()
            .any(|s| matches!(s, ExecState::Pending | ExecState::Running))
    }

    pub fn has_failure(&self) -> bool {
        self.states.values().any(|s| *s == ExecState::Failed)
    }
}
