// tests/session_exec.rs

//! Persistent-session execution against the stdio backend, using `sh` as
//! the interactive host.

use std::error::Error;

use dagrun::engine::{EngineOptions, RunOutcome};
use dagrun::event::EventKind;
use dagrun::start_run;
use dagrun::types::SessionSharing;
use dagrun_test_utils::builders::{ItemConfigBuilder, WorkflowFileBuilder};
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// `sh` as a session backend: requests are shell lines, the probe reports
/// the status of the last one.
fn with_shell_session(builder: WorkflowFileBuilder) -> WorkflowFileBuilder {
    builder.with_session_kind("shell", &["sh"], "echo {marker}$?")
}

#[tokio::test]
async fn session_commands_run_and_stream_output() -> TestResult {
    init_tracing();

    let workflow = with_shell_session(WorkflowFileBuilder::new())
        .with_item(
            "greet",
            ItemConfigBuilder::session("shell", &["echo hello-session", "true"]).build(),
        )
        .build();

    let mut handle = start_run(&workflow, EngineOptions::from_workflow_file(&workflow))?;
    let events_task = tokio::spawn(handle.take_events().unwrap().collect());

    let outcome = with_timeout(handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Completed);

    let events = events_task.await?;
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::ItemOutput && e.payload == "hello-session"));
    let completed = events
        .iter()
        .find(|e| e.kind == EventKind::ItemCompleted)
        .expect("completed event");
    assert_eq!(completed.payload, "2 command(s) completed");
    Ok(())
}

#[tokio::test]
async fn failing_session_command_fails_the_item() -> TestResult {
    init_tracing();

    let workflow = with_shell_session(WorkflowFileBuilder::new())
        .with_item(
            "bad",
            ItemConfigBuilder::session("shell", &["false"]).build(),
        )
        .build();

    let mut handle = start_run(&workflow, EngineOptions::from_workflow_file(&workflow))?;
    let events_task = tokio::spawn(handle.take_events().unwrap().collect());

    let outcome = with_timeout(handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let events = events_task.await?;
    let failed = events
        .iter()
        .find(|e| e.kind == EventKind::ItemFailed)
        .expect("failed event");
    assert!(failed.payload.contains("status 1"));
    Ok(())
}

#[tokio::test]
async fn branch_scoped_session_is_reused_between_items() -> TestResult {
    init_tracing();

    // The first item leaves state in the session; the second sees it only
    // if both executions were served by the same backend process.
    let workflow = with_shell_session(WorkflowFileBuilder::new())
        .with_item(
            "seed",
            ItemConfigBuilder::session("shell", &["DAGRUN_TEST_STATE=42"]).build(),
        )
        .with_item(
            "check",
            ItemConfigBuilder::session("shell", &["test \"$DAGRUN_TEST_STATE\" = 42"]).build(),
        )
        .with_connection("seed", "check")
        .session_sharing(SessionSharing::Branch)
        .build();

    let mut handle = start_run(&workflow, EngineOptions::from_workflow_file(&workflow))?;
    let events_task = tokio::spawn(handle.take_events().unwrap().collect());

    let outcome = with_timeout(handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Completed);

    let _ = events_task.await?;
    Ok(())
}

#[tokio::test]
async fn item_scoped_sessions_are_isolated() -> TestResult {
    init_tracing();

    // Same workflow as above, but each item gets a fresh session, so the
    // state check must fail.
    let workflow = with_shell_session(WorkflowFileBuilder::new())
        .with_item(
            "seed",
            ItemConfigBuilder::session("shell", &["DAGRUN_TEST_STATE=42"]).build(),
        )
        .with_item(
            "check",
            ItemConfigBuilder::session("shell", &["test \"$DAGRUN_TEST_STATE\" = 42"]).build(),
        )
        .with_connection("seed", "check")
        .session_sharing(SessionSharing::Item)
        .build();

    let mut handle = start_run(&workflow, EngineOptions::from_workflow_file(&workflow))?;
    let events_task = tokio::spawn(handle.take_events().unwrap().collect());

    let outcome = with_timeout(handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let events = events_task.await?;
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::ItemFailed && e.item.as_deref() == Some("check")));
    Ok(())
}

#[tokio::test]
async fn unreachable_session_backend_becomes_launch_failure() -> TestResult {
    init_tracing();

    let workflow = WorkflowFileBuilder::new()
        .with_session_kind("broken", &["dagrun-no-such-interpreter"], "echo {marker}")
        .with_item(
            "doomed",
            ItemConfigBuilder::session("broken", &["whatever"]).build(),
        )
        .build();

    let mut handle = start_run(&workflow, EngineOptions::from_workflow_file(&workflow))?;
    let events_task = tokio::spawn(handle.take_events().unwrap().collect());

    let outcome = with_timeout(handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let events = events_task.await?;
    let failed = events
        .iter()
        .find(|e| e.kind == EventKind::ItemFailed)
        .expect("failed event");
    assert!(failed.payload.starts_with("launch failed:"));
    assert!(failed.payload.contains("after 3 attempts"));
    Ok(())
}
