// src/engine/core.rs

//! Pure core engine state machine.
//!
//! The core consumes [`EngineEvent`]s and produces:
//! - an updated scheduling state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell ([`super::Runtime`]) is responsible for reading events
//! from channels, dispatching items to the worker backend and publishing
//! events. The core has no channels, no Tokio types, and performs no IO, so
//! every scheduling semantic can be unit tested synchronously.

use crate::engine::scheduler::{RunScheduler, ScheduledItem, SchedulerStep};
use crate::engine::{BranchIndex, EngineEvent, RunOutcome};
use crate::event::{Event, EventKind};
use crate::graph::ItemId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug)]
pub enum CoreCommand {
    /// Send these items to the worker backend.
    DispatchItems(Vec<ScheduledItem>),
    /// Publish item-scoped events (skips, permit completions).
    PublishEvents(Vec<Event>),
    /// Tear down sessions scoped to a finished branch.
    ReclaimBranch {
        subgraph: crate::graph::SubgraphId,
        branch_label: String,
    },
    /// Stop every running worker (cancellation).
    StopWorkers,
    /// The run reached its final outcome.
    FinishRun(RunOutcome),
}

/// Decision returned by the core after handling a single [`EngineEvent`].
#[derive(Debug)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the shell's event loop should keep running.
    pub keep_running: bool,
}

/// Pure core engine state. Owns the run scheduler and nothing else.
#[derive(Debug)]
pub struct CoreEngine {
    scheduler: RunScheduler,
}

impl CoreEngine {
    pub fn new(scheduler: RunScheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &RunScheduler {
        &self.scheduler
    }

    /// Initial step: dispatch the first ready layer of every branch. An
    /// empty run finishes immediately.
    pub fn start(&mut self) -> CoreStep {
        let step = self.scheduler.start();
        self.into_core_step(step)
    }

    /// Handle a single engine event.
    pub fn step(&mut self, event: EngineEvent) -> CoreStep {
        let step = match event {
            EngineEvent::ItemFinished {
                branch,
                item,
                outcome,
            } => self.scheduler.handle_finished(branch, item, outcome),
            EngineEvent::StopRequested => {
                let step = self.scheduler.cancel();
                // Stop has to reach the workers even when nothing is
                // pending; push it through on every cancel.
                return self.build_core_step(step, true);
            }
        };
        self.into_core_step(step)
    }

    fn into_core_step(&self, step: SchedulerStep) -> CoreStep {
        self.build_core_step(step, false)
    }

    fn build_core_step(&self, step: SchedulerStep, stop_workers: bool) -> CoreStep {
        let mut commands = Vec::new();

        let mut events = Vec::new();
        for (branch, item) in step.auto_completed.iter() {
            // Start/completed pair so consumers see the usual lifecycle even
            // though no manager ran.
            events.push(self.item_event(*branch, *item, EventKind::ItemStart, ""));
            events.push(self.item_event(
                *branch,
                *item,
                EventKind::ItemCompleted,
                "execution disabled",
            ));
        }
        let skip_reason = if self.scheduler.is_cancelling() {
            "run cancelled"
        } else {
            "upstream failure"
        };
        for (branch, item) in step.newly_skipped.iter() {
            events.push(self.item_event(*branch, *item, EventKind::ItemSkipped, skip_reason));
        }
        if !events.is_empty() {
            commands.push(CoreCommand::PublishEvents(events));
        }

        if stop_workers {
            commands.push(CoreCommand::StopWorkers);
        }

        if !step.newly_ready.is_empty() {
            commands.push(CoreCommand::DispatchItems(step.newly_ready));
        }

        for ix in step.finished_branches {
            let branch = self.scheduler.branch(ix);
            commands.push(CoreCommand::ReclaimBranch {
                subgraph: branch.subgraph,
                branch_label: branch.branch.label.clone(),
            });
        }

        let keep_running = step.run_finished.is_none();
        if let Some(outcome) = step.run_finished {
            commands.push(CoreCommand::FinishRun(outcome));
        }

        CoreStep {
            commands,
            keep_running,
        }
    }

    fn item_event(
        &self,
        branch: BranchIndex,
        item: ItemId,
        kind: EventKind,
        payload: &str,
    ) -> Event {
        let branch_run = self.scheduler.branch(branch);
        Event::item(
            branch_run.subgraph,
            branch_run.branch.label.clone(),
            self.scheduler.item_name(item),
            kind,
            payload,
        )
    }
}
