// src/exec/mod.rs

//! Worker execution layer.
//!
//! This module is responsible for actually running items: launching
//! transient processes, driving persistent sessions, and reporting back to
//! the orchestration runtime via `EngineEvent`s.
//!
//! - [`backend`] provides the `WorkerBackend` trait and the concrete
//!   `RealWorkerBackend` used in production; tests replace it with a fake.
//! - [`worker_pool`] owns the pool that bounds concurrency and fans out a
//!   stop signal to every runner.
//! - [`process`] handles a single transient process execution.
//! - [`session`] contains the persistent-session abstraction: the
//!   `SessionBackend` boundary, a line-oriented subprocess implementation,
//!   and the sharing-policy keyed `SessionPool`.

pub mod backend;
pub mod process;
pub mod session;
pub mod worker_pool;

pub use backend::{RealWorkerBackend, WorkerBackend};
pub use session::{
    SessionBackend, SessionCatalog, SessionHandle, SessionPool, SessionReply, SessionStatus,
    StdioSessionBackend,
};
pub use worker_pool::{spawn_worker_pool, WorkerPoolHandle};
