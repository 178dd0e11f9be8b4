// src/exec/process.rs

//! Transient process execution.
//!
//! One worker process per item execution; nothing survives past it. Stdout
//! and stderr are streamed line-by-line into the event stream while the
//! process runs.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::{FailureKind, ItemOutcome, ScheduledItem};
use crate::event::{Event, EventKind, EventSink};
use crate::exec::worker_pool::stop_signalled;
use crate::graph::ProcessSpec;

/// Run a single transient process to completion.
///
/// - Spawn failure yields a launch failure.
/// - Non-zero exit yields an execution failure carrying the exit code.
/// - A stop signal gives the process a grace period to exit, then kills it;
///   the outcome is `Stopped`.
/// - Timeout expiry takes the same path but fails the item.
pub(crate) async fn run_process(
    item: &ScheduledItem,
    spec: &ProcessSpec,
    stop_rx: &mut watch::Receiver<bool>,
    grace: Duration,
    events: &EventSink,
) -> ItemOutcome {
    let program = match spec.command.first() {
        Some(p) => p,
        None => {
            return ItemOutcome::Failed(FailureKind::Launch(
                "empty command in process specification".to_string(),
            ));
        }
    };

    info!(
        item = %item.name,
        branch = %item.branch_label,
        program = %program,
        "starting item process"
    );

    let mut cmd = Command::new(program);
    cmd.args(&spec.command[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &spec.workdir {
        cmd.current_dir(dir);
    }
    for (key, value) in spec.env.iter() {
        cmd.env(key, value);
    }

    // Branch context for the worker: filter assignment and inbound
    // resource labels.
    for (name, value) in item.assignment.iter() {
        cmd.env(filter_env_name(name), value);
    }
    if !item.inputs.is_empty() {
        cmd.env("DAGRUN_INPUTS", item.inputs.join(";"));
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(
                item = %item.name,
                branch = %item.branch_label,
                error = %err,
                "item process failed to start"
            );
            return ItemOutcome::Failed(FailureKind::Launch(format!(
                "spawning '{program}': {err}"
            )));
        }
    };

    let out_task = child
        .stdout
        .take()
        .map(|s| spawn_output_forwarder(s, item, events.clone()));
    let err_task = child
        .stderr
        .take()
        .map(|s| spawn_output_forwarder(s, item, events.clone()));

    let item_timeout = async {
        match spec.timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        status_res = child.wait() => {
            match status_res {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    info!(
                        item = %item.name,
                        branch = %item.branch_label,
                        exit_code = code,
                        success = status.success(),
                        "item process exited"
                    );
                    if status.success() {
                        ItemOutcome::Completed(format!("exit code {code}"))
                    } else {
                        ItemOutcome::Failed(FailureKind::Execution(format!("exit code {code}")))
                    }
                }
                Err(err) => {
                    ItemOutcome::Failed(FailureKind::Execution(format!(
                        "waiting for process: {err}"
                    )))
                }
            }
        }

        _ = stop_signalled(stop_rx) => {
            info!(
                item = %item.name,
                branch = %item.branch_label,
                "stop requested for running item; terminating process"
            );
            terminate(&mut child, grace, &item.name).await;
            ItemOutcome::Stopped
        }

        _ = item_timeout => {
            warn!(
                item = %item.name,
                branch = %item.branch_label,
                timeout = ?spec.timeout,
                "item timed out; terminating process"
            );
            terminate(&mut child, grace, &item.name).await;
            ItemOutcome::Failed(FailureKind::Execution(format!(
                "timed out after {:?}",
                spec.timeout.unwrap_or_default()
            )))
        }
    };

    // Flush remaining output before reporting the terminal state, so output
    // events never trail the terminal event.
    if let Some(task) = out_task {
        let _ = task.await;
    }
    if let Some(task) = err_task {
        let _ = task.await;
    }

    outcome
}

/// Give the process a grace period to exit on its own, then kill it.
async fn terminate(child: &mut Child, grace: Duration, item_name: &str) {
    match timeout(grace, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            if let Err(err) = child.kill().await {
                warn!(item = %item_name, error = %err, "failed to kill item process");
            }
        }
    }
}

fn spawn_output_forwarder<R>(reader: R, item: &ScheduledItem, events: EventSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let subgraph = item.subgraph;
    let branch_label = item.branch_label.clone();
    let item_name = item.name.clone();

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(item = %item_name, "output: {}", line);
            events
                .publish(Event::item(
                    subgraph,
                    branch_label.clone(),
                    item_name.clone(),
                    EventKind::ItemOutput,
                    line,
                ))
                .await;
        }
    })
}

fn filter_env_name(filter: &str) -> String {
    let mapped: String = filter
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DAGRUN_FILTER_{mapped}")
}
