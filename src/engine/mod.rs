// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - per-branch execution state and readiness ([`state`])
//! - the run-wide scheduler that owns topology, branches and outcome
//!   aggregation ([`scheduler`])
//! - the pure core state machine ([`core`])
//! - the async IO shell that drives a worker backend ([`runtime`])
//!
//! The pure core consumes [`EngineEvent`]s and produces commands; the shell
//! performs the IO (dispatching items, publishing events). All state
//! transitions are serialized through the shell's single event loop.

use std::fmt;
use std::time::Duration;

use crate::types::SessionSharing;

pub mod core;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use core::{CoreCommand, CoreEngine, CoreStep};
pub use runtime::Runtime;
pub use scheduler::{RunScheduler, ScheduledItem, SchedulerStep};
pub use state::{BranchRun, ExecState};

/// Index into the run's flattened branch table.
pub type BranchIndex = usize;

/// Why an item failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The worker could not be created (missing executable, backend
    /// unreachable after retries).
    Launch(String),
    /// The worker ran and reported failure (non-zero exit, session error).
    Execution(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Launch(reason) => write!(f, "launch failed: {reason}"),
            FailureKind::Execution(reason) => write!(f, "{reason}"),
        }
    }
}

/// Outcome of one item execution as reported by its manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Finished successfully; the payload describes the exit (exit code,
    /// command count).
    Completed(String),
    Failed(FailureKind),
    /// Termination acknowledged after a stop request. Not a failure.
    Stopped,
}

/// Final outcome of a run. Always exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Events flowing into the engine from managers and the control surface.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A manager finished (or acknowledged stopping) an item execution.
    ItemFinished {
        branch: BranchIndex,
        item: crate::graph::ItemId,
        outcome: ItemOutcome,
    },
    /// External stop request (cancel handle, Ctrl-C).
    StopRequested,
}

/// Engine-wide options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum number of concurrently executing items.
    pub concurrency: usize,
    /// Event-stream buffer capacity.
    pub event_buffer: usize,
    /// Scope at which persistent sessions are reused.
    pub session_sharing: SessionSharing,
    /// Grace period between a stop request and forced termination.
    pub grace_period: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            event_buffer: 256,
            session_sharing: SessionSharing::default(),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl EngineOptions {
    /// Build options from the `[run]` section of a validated workflow file.
    pub fn from_workflow_file(workflow: &crate::config::WorkflowFile) -> Self {
        Self {
            concurrency: workflow.run.concurrency,
            event_buffer: workflow.run.event_buffer,
            session_sharing: workflow.run.session_sharing,
            grace_period: crate::types::parse_duration(&workflow.run.grace_period)
                .unwrap_or(Duration::from_secs(5)),
        }
    }
}
