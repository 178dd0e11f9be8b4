// src/engine/scheduler.rs

//! Run-wide scheduling state.
//!
//! [`RunScheduler`] owns the immutable topology (graph + sub-graphs) and the
//! mutable per-branch state tables. It decides which items are ready, how
//! failures propagate, and when the run as a whole is finished. It performs
//! no IO; the async shell drives it through [`super::CoreEngine`].

use tracing::{debug, info, warn};

use crate::engine::state::BranchRun;
use crate::engine::{BranchIndex, ExecState, ItemOutcome, RunOutcome};
use crate::filter::Branch;
use crate::graph::{ExecutionSpec, ItemId, Subgraph, SubgraphId, WorkflowGraph};

/// One item execution handed to a worker backend.
#[derive(Debug, Clone)]
pub struct ScheduledItem {
    pub branch: BranchIndex,
    pub subgraph: SubgraphId,
    pub branch_label: String,
    pub item: ItemId,
    pub name: String,
    pub spec: ExecutionSpec,
    /// The branch's filter-value assignment, exposed to the worker.
    pub assignment: Vec<(String, String)>,
    /// Resource labels carried by inbound connections.
    pub inputs: Vec<String>,
}

/// Result of one scheduling decision.
#[derive(Debug, Default)]
pub struct SchedulerStep {
    /// Items to dispatch, in readiness order.
    pub newly_ready: Vec<ScheduledItem>,
    /// Items newly marked `Skipped`, in propagation order.
    pub newly_skipped: Vec<(BranchIndex, ItemId)>,
    /// Items completed without execution (execution permit off).
    pub auto_completed: Vec<(BranchIndex, ItemId)>,
    /// Branches that reached a terminal state in this step.
    pub finished_branches: Vec<BranchIndex>,
    /// Set when the whole run reached its final outcome.
    pub run_finished: Option<RunOutcome>,
}

/// Scheduler for one run: topology plus per-branch execution state.
#[derive(Debug)]
pub struct RunScheduler {
    graph: WorkflowGraph,
    subgraphs: Vec<Subgraph>,
    branches: Vec<BranchRun>,
    branch_finished: Vec<bool>,
    cancelling: bool,
    finished: bool,
}

impl RunScheduler {
    /// Build a scheduler from an analyzed graph and the branches of every
    /// sub-graph. `branches_per_subgraph` is parallel to `subgraphs`; an
    /// empty branch list means the sub-graph was skipped by filter
    /// expansion.
    pub fn new(
        graph: WorkflowGraph,
        subgraphs: Vec<Subgraph>,
        branches_per_subgraph: Vec<Vec<Branch>>,
    ) -> Self {
        let mut branches = Vec::new();
        for (subgraph, subgraph_branches) in subgraphs.iter().zip(branches_per_subgraph) {
            for branch in subgraph_branches {
                branches.push(BranchRun::new(subgraph.id, branch, &subgraph.items));
            }
        }

        let branch_finished = vec![false; branches.len()];
        Self {
            graph,
            subgraphs,
            branches,
            branch_finished,
            cancelling: false,
            finished: false,
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn subgraphs(&self) -> &[Subgraph] {
        &self.subgraphs
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn branch(&self, ix: BranchIndex) -> &BranchRun {
        &self.branches[ix]
    }

    pub fn state_of(&self, ix: BranchIndex, item: ItemId) -> ExecState {
        self.branches[ix].state(item)
    }

    pub fn item_name(&self, item: ItemId) -> &str {
        &self.graph.item(item).name
    }

    pub fn is_cancelling(&self) -> bool {
        self.cancelling
    }

    /// Kick off the run: initial ready set across every branch.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        for ix in 0..self.branches.len() {
            self.collect_ready(ix, &mut step);
            self.check_branch_finished(ix, &mut step);
        }

        self.check_run_finished(&mut step);
        step
    }

    /// Record a manager-reported terminal state for one item execution.
    pub fn handle_finished(
        &mut self,
        ix: BranchIndex,
        item: ItemId,
        outcome: ItemOutcome,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.finished {
            warn!(
                item = %self.item_name(item),
                "item finished after the run concluded; ignoring"
            );
            return step;
        }
        if self.branches[ix].state(item) != ExecState::Running {
            warn!(
                item = %self.item_name(item),
                branch = %self.branches[ix].branch.label,
                state = ?self.branches[ix].state(item),
                "terminal report for an item that is not running; ignoring"
            );
            return step;
        }

        match outcome {
            ItemOutcome::Completed(ref info) => {
                debug!(
                    item = %self.item_name(item),
                    branch = %self.branches[ix].branch.label,
                    info = %info,
                    "item completed"
                );
                self.branches[ix].mark_completed(item);
                if !self.cancelling {
                    self.collect_ready(ix, &mut step);
                }
            }
            ItemOutcome::Failed(ref kind) => {
                warn!(
                    item = %self.item_name(item),
                    branch = %self.branches[ix].branch.label,
                    reason = %kind,
                    "item failed; skipping dependents in this branch"
                );
                self.branches[ix].mark_failed(item);
                let skipped = self.branches[ix].skip_dependents(&self.graph, item);
                step.newly_skipped
                    .extend(skipped.into_iter().map(|id| (ix, id)));
            }
            ItemOutcome::Stopped => {
                debug!(
                    item = %self.item_name(item),
                    branch = %self.branches[ix].branch.label,
                    "item acknowledged stop; marking skipped"
                );
                self.branches[ix].mark_skipped(item);
                step.newly_skipped.push((ix, item));
            }
        }

        self.check_branch_finished(ix, &mut step);
        self.check_run_finished(&mut step);
        step
    }

    /// External cancellation: no further item starts; every pending item is
    /// skipped. The run concludes once running managers acknowledge.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.finished || self.cancelling {
            return step;
        }
        info!("cancelling run; skipping pending items");
        self.cancelling = true;

        for ix in 0..self.branches.len() {
            let skipped = self.branches[ix].skip_pending();
            step.newly_skipped
                .extend(skipped.into_iter().map(|id| (ix, id)));
            self.check_branch_finished(ix, &mut step);
        }

        self.check_run_finished(&mut step);
        step
    }

    /// Mark ready items `Running` and return them for dispatch. Items whose
    /// execution permit is off complete immediately, which may unlock
    /// further items; loop until the ready set is stable.
    fn collect_ready(&mut self, ix: BranchIndex, step: &mut SchedulerStep) {
        loop {
            let ready = self.branches[ix].ready_items(&self.graph);
            if ready.is_empty() {
                return;
            }

            let mut auto_completed = false;
            for item in ready {
                if self.graph.item(item).execute {
                    self.branches[ix].mark_running(item);
                    step.newly_ready.push(self.scheduled_item(ix, item));
                } else {
                    debug!(
                        item = %self.item_name(item),
                        branch = %self.branches[ix].branch.label,
                        "execution permit off; completing without execution"
                    );
                    self.branches[ix].mark_completed(item);
                    step.auto_completed.push((ix, item));
                    auto_completed = true;
                }
            }

            if !auto_completed {
                return;
            }
        }
    }

    fn scheduled_item(&self, ix: BranchIndex, item: ItemId) -> ScheduledItem {
        let branch = &self.branches[ix];
        let node = self.graph.item(item);
        ScheduledItem {
            branch: ix,
            subgraph: branch.subgraph,
            branch_label: branch.branch.label.clone(),
            item,
            name: node.name.clone(),
            spec: node.spec.clone(),
            assignment: branch.branch.assignment.clone(),
            inputs: self.graph.inbound_resources(item),
        }
    }

    fn check_branch_finished(&mut self, ix: BranchIndex, step: &mut SchedulerStep) {
        if !self.branch_finished[ix] && self.branches[ix].is_terminal() {
            self.branch_finished[ix] = true;
            debug!(
                branch = %self.branches[ix].branch.label,
                subgraph = self.branches[ix].subgraph.0,
                failed = self.branches[ix].has_failure(),
                "branch finished"
            );
            step.finished_branches.push(ix);
        }
    }

    fn check_run_finished(&mut self, step: &mut SchedulerStep) {
        if self.finished {
            return;
        }
        if self.branches.iter().all(|b| b.is_terminal()) {
            self.finished = true;
            let outcome = if self.cancelling {
                RunOutcome::Cancelled
            } else if self.branches.iter().any(|b| b.has_failure()) {
                RunOutcome::Failed
            } else {
                RunOutcome::Completed
            };
            info!(?outcome, "run finished");
            step.run_finished = Some(outcome);
        }
    }
}
