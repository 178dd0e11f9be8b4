// tests/runtime_fake_backend.rs

//! End-to-end engine scenarios on the fake worker backend.

use std::error::Error;

use dagrun::engine::RunOutcome;
use dagrun::event::EventKind;
use dagrun_test_utils::builders::{ItemConfigBuilder, WorkflowFileBuilder};
use dagrun_test_utils::fake_backend::launch_fake;
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Linear chain A -> B -> C.
fn chain_workflow() -> dagrun::config::WorkflowFile {
    WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("C", ItemConfigBuilder::process(&["echo", "C"]).build())
        .with_connection("A", "B")
        .with_connection("B", "C")
        .build()
}

#[tokio::test]
async fn chain_runs_in_dependency_order() -> TestResult {
    init_tracing();

    let mut run = launch_fake(&chain_workflow(), |b| b)?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Completed);

    let executed = run.executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["default/A", "default/B", "default/C"]);

    let events = events_task.await?;
    assert_eq!(
        events.last().map(|e| e.kind),
        Some(EventKind::RunCompleted)
    );
    Ok(())
}

#[tokio::test]
async fn chain_with_failing_tail_fails_without_skips() -> TestResult {
    init_tracing();

    // A and B succeed, C fails; C has no successors so nothing is skipped.
    let mut run = launch_fake(&chain_workflow(), |b| b.failing("C"))?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let events = events_task.await?;
    let completed: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == EventKind::ItemCompleted)
        .map(|e| e.item.as_deref().unwrap())
        .collect();
    assert_eq!(completed, vec!["A", "B"]);

    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::ItemFailed && e.item.as_deref() == Some("C")));
    assert!(!events.iter().any(|e| e.kind == EventKind::ItemSkipped));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::RunFailed));
    Ok(())
}

#[tokio::test]
async fn diamond_with_scenario_filter_runs_two_branches() -> TestResult {
    init_tracing();

    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("C", ItemConfigBuilder::process(&["echo", "C"]).build())
        .with_item("D", ItemConfigBuilder::process(&["echo", "D"]).build())
        .with_filter("scenario", &["base", "high"])
        .with_filtered_connection("A", "B", &["scenario"])
        .with_connection("A", "C")
        .with_connection("B", "D")
        .with_connection("C", "D")
        .build();

    let mut run = launch_fake(&workflow, |b| b)?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Completed);

    let executed = run.executed.lock().unwrap().clone();
    assert_eq!(executed.len(), 8);
    for branch in ["scenario=base", "scenario=high"] {
        for item in ["A", "B", "C", "D"] {
            assert!(
                executed.contains(&format!("{branch}/{item}")),
                "missing {branch}/{item} in {executed:?}"
            );
        }
    }

    let _ = events_task.await?;
    Ok(())
}

#[tokio::test]
async fn zero_candidate_filter_skips_subgraph_only() -> TestResult {
    init_tracing();

    // Sub-graph {A, B} is gated by an empty filter; sub-graph {X} runs.
    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("X", ItemConfigBuilder::process(&["echo", "X"]).build())
        .with_filter("scenario", &[])
        .with_filtered_connection("A", "B", &["scenario"])
        .build();

    let mut run = launch_fake(&workflow, |b| b)?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Completed);

    let executed = run.executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["default/X"]);

    let _ = events_task.await?;
    Ok(())
}

#[tokio::test]
async fn execution_permit_off_completes_without_dispatch() -> TestResult {
    init_tracing();

    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item(
            "B",
            ItemConfigBuilder::process(&["echo", "B"]).execute(false).build(),
        )
        .with_item("C", ItemConfigBuilder::process(&["echo", "C"]).build())
        .with_connection("A", "B")
        .with_connection("B", "C")
        .build();

    let mut run = launch_fake(&workflow, |b| b)?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Completed);

    // B never reaches the backend but still unlocks C.
    let executed = run.executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["default/A", "default/C"]);

    let events = events_task.await?;
    assert!(events.iter().any(|e| {
        e.kind == EventKind::ItemCompleted
            && e.item.as_deref() == Some("B")
            && e.payload == "execution disabled"
    }));
    Ok(())
}
