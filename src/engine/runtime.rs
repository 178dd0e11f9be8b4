// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::core::{CoreCommand, CoreEngine, CoreStep};
use crate::engine::{EngineEvent, RunOutcome};
use crate::errors::{DagrunError, Result};
use crate::event::{Event, EventKind, EventSink};
use crate::exec::WorkerBackend;

/// Async IO shell around [`CoreEngine`].
///
/// Reads [`EngineEvent`]s from the engine channel, feeds them into the pure
/// core and executes the commands it returns: dispatching items to the
/// worker backend, publishing events, stopping workers, reclaiming
/// sessions. All run-state transitions happen on this single loop.
pub struct Runtime<B: WorkerBackend> {
    core: CoreEngine,
    engine_rx: mpsc::Receiver<EngineEvent>,
    backend: B,
    events: EventSink,
}

impl<B: WorkerBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Runtime<B> {
    pub fn new(
        core: CoreEngine,
        engine_rx: mpsc::Receiver<EngineEvent>,
        backend: B,
        events: EventSink,
    ) -> Self {
        Self {
            core,
            engine_rx,
            backend,
            events,
        }
    }

    /// Main event loop. Resolves with the run's final outcome.
    pub async fn run(mut self) -> Result<RunOutcome> {
        info!("dagrun runtime started");

        let step = self.core.start();
        let mut finished = self.execute(step).await?;

        while finished.is_none() {
            let event = match self.engine_rx.recv().await {
                Some(e) => e,
                None => {
                    return Err(DagrunError::Execution(
                        "engine event channel closed before the run finished".to_string(),
                    ));
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            finished = self.execute(step).await?;
        }

        let outcome = finished.expect("loop exits only with an outcome");

        // End of run: sessions are torn down explicitly, whatever the
        // outcome. Stop is idempotent, so this is safe after cancellation.
        self.backend.stop_all().await?;

        let (kind, payload) = match outcome {
            RunOutcome::Completed => (EventKind::RunCompleted, "run completed"),
            RunOutcome::Failed => (EventKind::RunFailed, "run failed"),
            RunOutcome::Cancelled => (EventKind::RunCancelled, "run cancelled"),
        };
        self.events.publish(Event::run(kind, payload)).await;

        info!(?outcome, "runtime exiting");
        Ok(outcome)
    }

    async fn execute(&mut self, step: CoreStep) -> Result<Option<RunOutcome>> {
        let mut finished = None;

        for command in step.commands {
            match command {
                CoreCommand::DispatchItems(items) => {
                    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
                    debug!(?names, "dispatching ready items");
                    self.backend.dispatch_items(items).await?;
                }
                CoreCommand::PublishEvents(events) => {
                    for event in events {
                        self.events.publish(event).await;
                    }
                }
                CoreCommand::ReclaimBranch {
                    subgraph,
                    branch_label,
                } => {
                    self.backend.reclaim_branch(subgraph, &branch_label).await?;
                }
                CoreCommand::StopWorkers => {
                    info!("stopping all workers");
                    self.backend.stop_all().await?;
                }
                CoreCommand::FinishRun(outcome) => {
                    finished = Some(outcome);
                }
            }
        }

        Ok(finished)
    }
}
