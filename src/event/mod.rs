// src/event/mod.rs

//! Live progress events.
//!
//! Managers and the engine publish [`stream::Event`] records into a bounded
//! channel; whatever consumes the run (logger, UI, tests) reads them
//! incrementally while the run is still executing. See [`stream`] for the
//! ordering and backpressure guarantees.

pub mod stream;

pub use stream::{channel, Event, EventKind, EventObserver, EventSink, EventStream, TracingObserver};
