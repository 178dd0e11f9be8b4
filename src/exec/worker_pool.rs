// src/exec/worker_pool.rs

//! Bounded worker pool.
//!
//! Each dispatched item runs in its own Tokio task. A semaphore bounds how
//! many execute at once; permits are granted in FIFO order, so items over
//! the limit queue by readiness time. A `watch` channel fans a stop signal
//! out to every runner, queued or running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info};

use crate::engine::{EngineEvent, FailureKind, ItemOutcome, ScheduledItem};
use crate::event::{Event, EventKind, EventSink};
use crate::exec::process::run_process;
use crate::exec::session::{run_session_item, SessionPool};
use crate::graph::{ExecutionSpec, SubgraphId};

/// Handle to a running worker pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPoolHandle {
    item_tx: mpsc::Sender<ScheduledItem>,
    stop_tx: watch::Sender<bool>,
    sessions: Arc<SessionPool>,
}

impl WorkerPoolHandle {
    /// Queue one item for execution.
    pub async fn dispatch(&self, item: ScheduledItem) -> Result<(), ()> {
        self.item_tx.send(item).await.map_err(|_| ())
    }

    /// Tear down sessions scoped to a finished branch.
    pub async fn reclaim_branch(&self, subgraph: SubgraphId, branch_label: &str) {
        self.sessions.reclaim_branch(subgraph, branch_label).await;
    }

    /// Signal every runner to stop and tear down all sessions. Idempotent.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        self.sessions.destroy_all().await;
    }
}

/// Spawn the background worker pool.
///
/// Runners publish their item's events to `events` and report exactly one
/// `ItemFinished` per dispatched item to `engine_tx`.
pub fn spawn_worker_pool(
    sessions: Arc<SessionPool>,
    concurrency: usize,
    grace: Duration,
    engine_tx: mpsc::Sender<EngineEvent>,
    events: EventSink,
) -> WorkerPoolHandle {
    let (item_tx, mut item_rx) = mpsc::channel::<ScheduledItem>(32);
    let (stop_tx, stop_rx) = watch::channel(false);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let pool_sessions = Arc::clone(&sessions);
    tokio::spawn(async move {
        info!(concurrency, "worker pool started");

        while let Some(item) = item_rx.recv().await {
            let semaphore = Arc::clone(&semaphore);
            let stop_rx = stop_rx.clone();
            let sessions = Arc::clone(&pool_sessions);
            let engine_tx = engine_tx.clone();
            let events = events.clone();

            tokio::spawn(async move {
                run_scheduled_item(item, semaphore, stop_rx, sessions, grace, engine_tx, events)
                    .await;
            });
        }

        info!("worker pool finished (channel closed)");
    });

    WorkerPoolHandle {
        item_tx,
        stop_tx,
        sessions,
    }
}

/// Resolve once a stop has been signalled. Never resolves if the stop
/// sender disappears without signalling.
pub(crate) async fn stop_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_scheduled_item(
    item: ScheduledItem,
    semaphore: Arc<Semaphore>,
    mut stop_rx: watch::Receiver<bool>,
    sessions: Arc<SessionPool>,
    grace: Duration,
    engine_tx: mpsc::Sender<EngineEvent>,
    events: EventSink,
) {
    // FIFO queueing on the semaphore; bail out if a stop arrives while
    // waiting for a slot.
    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(p) => p,
            Err(_) => return,
        },
        _ = stop_signalled(&mut stop_rx) => {
            debug!(item = %item.name, branch = %item.branch_label, "stopped before start");
            report(&engine_tx, &item, ItemOutcome::Stopped).await;
            return;
        }
    };

    if *stop_rx.borrow() {
        report(&engine_tx, &item, ItemOutcome::Stopped).await;
        return;
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

    let outcome = match item.spec.clone() {
        ExecutionSpec::Process(spec) => {
            run_process(&item, &spec, &mut stop_rx, grace, &events).await
        }
        ExecutionSpec::Session(spec) => {
            run_session_item(&item, &spec, &sessions, &mut stop_rx, &events).await
        }
    };

    match &outcome {
        ItemOutcome::Completed(info) => {
            events
                .publish(Event::item(
                    item.subgraph,
                    item.branch_label.clone(),
                    item.name.clone(),
                    EventKind::ItemCompleted,
                    info.clone(),
                ))
                .await;
        }
        ItemOutcome::Failed(kind) => {
            let payload = match kind {
                FailureKind::Launch(reason) => format!("launch failed: {reason}"),
                FailureKind::Execution(reason) => reason.clone(),
            };
            events
                .publish(Event::item(
                    item.subgraph,
                    item.branch_label.clone(),
                    item.name.clone(),
                    EventKind::ItemFailed,
                    payload,
                ))
                .await;
        }
        // The engine records the skip and publishes its event.
        ItemOutcome::Stopped => {}
    }

    report(&engine_tx, &item, outcome).await;
    drop(permit);
}

async fn report(engine_tx: &mpsc::Sender<EngineEvent>, item: &ScheduledItem, outcome: ItemOutcome) {
    let _ = engine_tx
        .send(EngineEvent::ItemFinished {
            branch: item.branch,
            item: item.item,
            outcome,
        })
        .await;
}
