// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod event;
pub mod exec;
pub mod filter;
pub mod graph;
pub mod logging;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::WorkflowFile;
use crate::engine::{
    CoreEngine, EngineEvent, EngineOptions, RunOutcome, RunScheduler, Runtime,
};
use crate::errors::{DagrunError, Result};
use crate::event::{EventSink, EventStream, TracingObserver};
use crate::exec::{
    spawn_worker_pool, RealWorkerBackend, SessionPool, StdioSessionBackend, WorkerBackend,
};
use crate::filter::{expand_branches, ConfigFilterResolver, FilterResolver};
use crate::graph::{decompose, detect_cycle, topological_layers, WorkflowGraph};

/// A running workflow execution.
///
/// Dropping the handle does not stop the run; use [`RunHandle::cancel`] for
/// that and [`RunHandle::wait`] for the final outcome.
pub struct RunHandle {
    engine_tx: mpsc::Sender<EngineEvent>,
    events: Option<EventStream>,
    join: tokio::task::JoinHandle<Result<RunOutcome>>,
}

impl RunHandle {
    /// Take the event stream. There is a single consumer; this returns
    /// `Some` exactly once.
    pub fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Request cancellation. Idempotent; the run concludes with
    /// `RunOutcome::Cancelled` once every running worker has acknowledged
    /// termination.
    pub async fn cancel(&self) {
        let _ = self.engine_tx.send(EngineEvent::StopRequested).await;
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunOutcome> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(DagrunError::Execution(format!(
                "runtime task panicked: {err}"
            ))),
        }
    }
}

/// Everything needed to launch a run, minus the worker backend.
///
/// Produced by [`prepare_run`] after all structural checks have passed;
/// tests plug a fake backend into [`launch`], production uses
/// [`start_run`].
pub struct PreparedRun {
    pub scheduler: RunScheduler,
    pub engine_tx: mpsc::Sender<EngineEvent>,
    pub engine_rx: mpsc::Receiver<EngineEvent>,
    pub event_sink: EventSink,
    pub event_stream: EventStream,
}

/// Analyze a graph and set up run state and channels.
///
/// Fails fast on structural errors (cycles, unknown filters) before any
/// item executes. A sub-graph whose filter expansion yields zero branches
/// is skipped with a warning.
pub fn prepare_run(
    graph: WorkflowGraph,
    resolver: &dyn FilterResolver,
    options: &EngineOptions,
) -> Result<PreparedRun> {
    let subgraphs = decompose(&graph);

    for subgraph in subgraphs.iter() {
        if let Some(item) = detect_cycle(&graph, subgraph) {
            return Err(DagrunError::Cycle(format!(
                "cycle in sub-graph {} involving item '{}'",
                subgraph.id.0,
                graph.item(item).name
            )));
        }
    }

    let mut branches_per_subgraph = Vec::with_capacity(subgraphs.len());
    for subgraph in subgraphs.iter() {
        let branches = expand_branches(&graph, subgraph, resolver)?;
        if branches.is_empty() {
            warn!(
                subgraph = subgraph.id.0,
                "a filter has no candidate values; skipping sub-graph"
            );
        }
        branches_per_subgraph.push(branches);
    }

    let scheduler = RunScheduler::new(graph, subgraphs, branches_per_subgraph);

    let (engine_tx, engine_rx) = mpsc::channel::<EngineEvent>(64);
    let (event_sink, event_stream) = event::channel(options.event_buffer);

    Ok(PreparedRun {
        scheduler,
        engine_tx,
        engine_rx,
        event_sink,
        event_stream,
    })
}

/// Launch a prepared run on the given worker backend.
pub fn launch<B: WorkerBackend + 'static>(prepared: PreparedRun, backend: B) -> RunHandle {
    let PreparedRun {
        scheduler,
        engine_tx,
        engine_rx,
        event_sink,
        event_stream,
    } = prepared;

    let core = CoreEngine::new(scheduler);
    let runtime = Runtime::new(core, engine_rx, backend, event_sink);
    let join = tokio::spawn(runtime.run());

    RunHandle {
        engine_tx,
        events: Some(event_stream),
        join,
    }
}

/// Start a run from a validated workflow file with the production backend
/// (real processes and stdio sessions).
pub fn start_run(workflow: &WorkflowFile, options: EngineOptions) -> Result<RunHandle> {
    let graph = WorkflowGraph::from_workflow_file(workflow);
    let resolver = ConfigFilterResolver::from_workflow_file(workflow);
    let prepared = prepare_run(graph, &resolver, &options)?;

    let session_backend = Arc::new(StdioSessionBackend::new(
        workflow.session.clone(),
        options.grace_period,
    ));
    let sessions = Arc::new(SessionPool::new(session_backend, options.session_sharing));
    let pool = spawn_worker_pool(
        sessions,
        options.concurrency,
        options.grace_period,
        prepared.engine_tx.clone(),
        prepared.event_sink.clone(),
    );

    Ok(launch(prepared, RealWorkerBackend::new(pool)))
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading and validation
/// - engine options (CLI overrides)
/// - the production run with Ctrl-C cancellation
/// - an event pump into the tracing logger
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    let workflow_path = PathBuf::from(&args.config);
    let workflow = load_and_validate(&workflow_path)?;

    let mut options = EngineOptions::from_workflow_file(&workflow);
    if let Some(jobs) = args.jobs {
        options.concurrency = jobs.max(1);
    }

    if args.dry_run {
        print_plan(&workflow)?;
        return Ok(RunOutcome::Completed);
    }

    let mut handle = start_run(&workflow, options)?;

    // Ctrl-C → graceful cancellation.
    {
        let tx = handle.engine_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(EngineEvent::StopRequested).await;
        });
    }

    let events = handle.take_events().expect("fresh run handle has events");
    let pump = tokio::spawn(async move {
        let mut observer = TracingObserver;
        events.forward_to(&mut observer).await;
    });

    let outcome = handle.wait().await?;
    let _ = pump.await;
    Ok(outcome)
}

/// Dry-run output: sub-graphs, their layers and branches.
fn print_plan(workflow: &WorkflowFile) -> Result<()> {
    let graph = WorkflowGraph::from_workflow_file(workflow);
    let resolver = ConfigFilterResolver::from_workflow_file(workflow);
    let subgraphs = decompose(&graph);

    println!("dagrun dry-run");
    println!("  [run].concurrency = {}", workflow.run.concurrency);
    println!(
        "  [run].session_sharing = {:?}",
        workflow.run.session_sharing
    );
    println!();

    for subgraph in subgraphs.iter() {
        let layers = topological_layers(&graph, subgraph)?;
        let branches = expand_branches(&graph, subgraph, &resolver)?;

        println!(
            "sub-graph {} ({} items, {} branch(es)):",
            subgraph.id.0,
            subgraph.items.len(),
            branches.len()
        );
        for branch in branches.iter() {
            println!("  branch: {}", branch.label);
        }
        for (i, layer) in layers.iter().enumerate() {
            let names: Vec<&str> = layer
                .iter()
                .map(|&id| graph.item(id).name.as_str())
                .collect();
            println!("  layer {i}: {names:?}");
        }
        println!();
    }

    Ok(())
}
