// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The runtime talks to a `WorkerBackend` instead of the worker pool
//! directly. This keeps the engine loop free of process concerns and makes
//! it easy to swap in a fake backend in tests while keeping the production
//! implementation in [`super::worker_pool`].

use std::future::Future;
use std::pin::Pin;

use crate::engine::ScheduledItem;
use crate::errors::{DagrunError, Result};
use crate::exec::worker_pool::WorkerPoolHandle;
use crate::graph::SubgraphId;

/// Trait abstracting how scheduled items are executed.
///
/// The implementation is free to:
/// - launch real processes and sessions (production)
/// - simulate completion and emit `EngineEvent`s (tests)
///
/// Whatever it does, it must eventually report one `ItemFinished` per
/// dispatched item, and `stop_all` must be idempotent.
pub trait WorkerBackend: Send {
    /// Dispatch the given items for execution, in order.
    fn dispatch_items(
        &mut self,
        items: Vec<ScheduledItem>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// A branch finished; sessions scoped to it can be torn down.
    fn reclaim_branch<'a>(
        &'a mut self,
        subgraph: SubgraphId,
        branch_label: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Stop every running worker and tear down sessions. Idempotent.
    fn stop_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend: forwards scheduled items to the worker pool.
pub struct RealWorkerBackend {
    pool: WorkerPoolHandle,
}

impl RealWorkerBackend {
    pub fn new(pool: WorkerPoolHandle) -> Self {
        Self { pool }
    }
}

impl WorkerBackend for RealWorkerBackend {
    fn dispatch_items(
        &mut self,
        items: Vec<ScheduledItem>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let pool = self.pool.clone();

        Box::pin(async move {
            for item in items {
                pool.dispatch(item).await.map_err(|_| {
                    DagrunError::Execution("worker pool is gone; cannot dispatch".to_string())
                })?;
            }
            Ok(())
        })
    }

    fn reclaim_branch<'a>(
        &'a mut self,
        subgraph: SubgraphId,
        branch_label: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let pool = self.pool.clone();

        Box::pin(async move {
            pool.reclaim_branch(subgraph, branch_label).await;
            Ok(())
        })
    }

    fn stop_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let pool = self.pool.clone();

        Box::pin(async move {
            pool.stop().await;
            Ok(())
        })
    }
}
