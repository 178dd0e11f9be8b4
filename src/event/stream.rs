// src/event/stream.rs

//! Bounded event stream between producers (managers, engine) and the run
//! consumer.
//!
//! Guarantees:
//! - Events from the same (branch, item) are delivered in emission order.
//!   No cross-branch ordering is promised.
//! - Nothing is dropped while a consumer is attached; when the buffer is
//!   full, `publish` waits (backpressure) instead of discarding.
//! - The stream is consumable incrementally and only from the current
//!   position; there is no retroactive replay.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::graph::SubgraphId;

/// Kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ItemStart,
    ItemOutput,
    ItemCompleted,
    ItemFailed,
    ItemSkipped,
    RunCompleted,
    RunFailed,
    RunCancelled,
}

impl EventKind {
    /// Terminal event kinds for a single item execution.
    pub fn is_item_terminal(self) -> bool {
        matches!(
            self,
            EventKind::ItemCompleted | EventKind::ItemFailed | EventKind::ItemSkipped
        )
    }
}

/// An immutable progress record.
///
/// Item-scoped events carry sub-graph, branch and item coordinates;
/// run-scoped events (`Run*` kinds) leave them empty.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub subgraph: Option<usize>,
    pub branch: Option<String>,
    pub item: Option<String>,
    pub kind: EventKind,
    pub payload: String,
}

impl Event {
    pub fn item(
        subgraph: SubgraphId,
        branch: impl Into<String>,
        item: impl Into<String>,
        kind: EventKind,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            subgraph: Some(subgraph.0),
            branch: Some(branch.into()),
            item: Some(item.into()),
            kind,
            payload: payload.into(),
        }
    }

    pub fn run(kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            subgraph: None,
            branch: None,
            item: None,
            kind,
            payload: payload.into(),
        }
    }
}

/// Create a bounded event channel.
pub fn channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, EventStream { rx })
}

/// Producer half of the event stream. Cheap to clone; one per manager.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    /// Publish one event.
    ///
    /// Waits while the buffer is full. Once the consumer side is gone the
    /// event is discarded; a consumerless run keeps executing.
    pub async fn publish(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            debug!("event stream consumer gone; discarding event");
        }
    }
}

/// Consumer half: an ordered, incrementally consumable sequence of events.
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    /// Next event, or `None` once the run has finished and every buffered
    /// event has been consumed.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Drain the stream into an observer until it ends.
    pub async fn forward_to(mut self, observer: &mut dyn EventObserver) {
        while let Some(event) = self.next().await {
            observer.on_event(&event);
        }
    }

    /// Collect every remaining event. Returns once the producers are done.
    pub async fn collect(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

/// Push-style event consumer.
pub trait EventObserver: Send {
    fn on_event(&mut self, event: &Event);
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&mut self, event: &Event) {
        let item = event.item.as_deref().unwrap_or("-");
        let branch = event.branch.as_deref().unwrap_or("-");
        match event.kind {
            EventKind::ItemFailed | EventKind::RunFailed => {
                warn!(item, branch, kind = ?event.kind, payload = %event.payload, "event");
            }
            EventKind::ItemOutput => {
                info!(item, branch, "{}", event.payload);
            }
            _ => {
                info!(item, branch, kind = ?event.kind, payload = %event.payload, "event");
            }
        }
    }
}
