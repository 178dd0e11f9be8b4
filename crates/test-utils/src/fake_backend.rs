use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use dagrun::config::WorkflowFile;
use dagrun::engine::{EngineEvent, EngineOptions, FailureKind, ItemOutcome, ScheduledItem};
use dagrun::errors::Result;
use dagrun::event::{Event, EventKind, EventSink};
use dagrun::exec::WorkerBackend;
use dagrun::filter::ConfigFilterResolver;
use dagrun::graph::{SubgraphId, WorkflowGraph};
use dagrun::{launch, prepare_run, RunHandle};

/// A fake-backed run, ready to await.
pub struct FakeRun {
    pub handle: RunHandle,
    pub executed: Arc<Mutex<Vec<String>>>,
}

/// Prepare and launch a workflow on a [`FakeWorkerBackend`].
///
/// `configure` lets the caller script per-item outcomes before launch.
pub fn launch_fake(
    workflow: &WorkflowFile,
    configure: impl FnOnce(FakeWorkerBackend) -> FakeWorkerBackend,
) -> Result<FakeRun> {
    let graph = WorkflowGraph::from_workflow_file(workflow);
    let resolver = ConfigFilterResolver::from_workflow_file(workflow);
    let options = EngineOptions::from_workflow_file(workflow);
    let prepared = prepare_run(graph, &resolver, &options)?;

    let executed = Arc::new(Mutex::new(Vec::new()));
    let backend = configure(FakeWorkerBackend::new(
        prepared.engine_tx.clone(),
        prepared.event_sink.clone(),
        Arc::clone(&executed),
    ));

    Ok(FakeRun {
        handle: launch(prepared, backend),
        executed,
    })
}

/// A fake worker backend that:
/// - records which items were dispatched (as `"branch_label/item_name"`)
/// - immediately reports a scripted outcome (default: completed) for each
///   item, publishing the same event sequence the real backend would.
pub struct FakeWorkerBackend {
    engine_tx: mpsc::Sender<EngineEvent>,
    events: EventSink,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, ItemOutcome>,
}

impl FakeWorkerBackend {
    pub fn new(
        engine_tx: mpsc::Sender<EngineEvent>,
        events: EventSink,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            engine_tx,
            events,
            executed,
            outcomes: HashMap::new(),
        }
    }

    /// Script a custom outcome for an item name.
    pub fn with_outcome(mut self, item: &str, outcome: ItemOutcome) -> Self {
        self.outcomes.insert(item.to_string(), outcome);
        self
    }

    /// Script an execution failure for an item name.
    pub fn failing(self, item: &str) -> Self {
        let outcome = ItemOutcome::Failed(FailureKind::Execution("scripted failure".to_string()));
        self.with_outcome(item, outcome)
    }
}

impl WorkerBackend for FakeWorkerBackend {
    fn dispatch_items(
        &mut self,
        items: Vec<ScheduledItem>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.engine_tx.clone();
        let events = self.events.clone();
        let executed = Arc::clone(&self.executed);
        let outcomes = self.outcomes.clone();

        Box::pin(async move {
            for item in items {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(format!("{}/{}", item.branch_label, item.name));
                }

                events
                    .publish(Event::item(
                        item.subgraph,
                        item.branch_label.clone(),
                        item.name.clone(),
                        EventKind::ItemStart,
                        "",
                    ))
                    .await;

                let outcome = outcomes
                    .get(&item.name)
                    .cloned()
                    .unwrap_or_else(|| ItemOutcome::Completed("fake".to_string()));

                // The engine publishes the skip event for stopped items,
                // mirroring the real backend.
                let terminal = match &outcome {
                    ItemOutcome::Completed(info) => {
                        Some((EventKind::ItemCompleted, info.clone()))
                    }
                    ItemOutcome::Failed(reason) => Some((EventKind::ItemFailed, reason.to_string())),
                    ItemOutcome::Stopped => None,
                };
                if let Some((kind, payload)) = terminal {
                    events
                        .publish(Event::item(
                            item.subgraph,
                            item.branch_label.clone(),
                            item.name.clone(),
                            kind,
                            payload,
                        ))
                        .await;
                }

                tx.send(EngineEvent::ItemFinished {
                    branch: item.branch,
                    item: item.item,
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn reclaim_branch<'a>(
        &'a mut self,
        _subgraph: SubgraphId,
        _branch_label: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn stop_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
