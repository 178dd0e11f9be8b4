// tests/failure_propagation.rs

//! A failed item forces every transitive successor in its branch to end
//! skipped, and a skipped item's manager is never started.

use std::error::Error;

use dagrun::engine::RunOutcome;
use dagrun::event::EventKind;
use dagrun_test_utils::builders::{ItemConfigBuilder, WorkflowFileBuilder};
use dagrun_test_utils::fake_backend::launch_fake;
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn middle_failure_skips_transitive_successors() -> TestResult {
    init_tracing();

    // A -> B -> C -> D; B fails, C and D must end skipped and never run.
    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("C", ItemConfigBuilder::process(&["echo", "C"]).build())
        .with_item("D", ItemConfigBuilder::process(&["echo", "D"]).build())
        .with_connection("A", "B")
        .with_connection("B", "C")
        .with_connection("C", "D")
        .build();

    let mut run = launch_fake(&workflow, |b| b.failing("B"))?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let executed = run.executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["default/A", "default/B"]);

    let events = events_task.await?;
    let skipped: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == EventKind::ItemSkipped)
        .map(|e| e.item.as_deref().unwrap())
        .collect();
    assert_eq!(skipped, vec!["C", "D"]);
    for event in events.iter().filter(|e| e.kind == EventKind::ItemSkipped) {
        assert_eq!(event.payload, "upstream failure");
    }
    Ok(())
}

#[tokio::test]
async fn failure_spares_independent_paths() -> TestResult {
    init_tracing();

    // Diamond A -> {B, C} -> D. B fails: D is skipped, C still runs.
    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("C", ItemConfigBuilder::process(&["echo", "C"]).build())
        .with_item("D", ItemConfigBuilder::process(&["echo", "D"]).build())
        .with_connection("A", "B")
        .with_connection("A", "C")
        .with_connection("B", "D")
        .with_connection("C", "D")
        .build();

    let mut run = launch_fake(&workflow, |b| b.failing("B"))?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let executed = run.executed.lock().unwrap().clone();
    assert!(executed.contains(&"default/C".to_string()));
    assert!(!executed.contains(&"default/D".to_string()));

    let events = events_task.await?;
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::ItemSkipped && e.item.as_deref() == Some("D")));
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::ItemCompleted && e.item.as_deref() == Some("C")));
    Ok(())
}

#[tokio::test]
async fn failure_in_one_branch_spares_sibling_branches() -> TestResult {
    init_tracing();

    // Two branches of the same sub-graph; the failure is scripted per item
    // name, so "B" fails in both branches, but each branch's failure only
    // affects its own successors. Use a filter to get two branches and
    // check that failures do not leak across sub-graphs either.
    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("X", ItemConfigBuilder::process(&["echo", "X"]).build())
        .with_filter("scenario", &["base", "high"])
        .with_filtered_connection("A", "B", &["scenario"])
        .build();

    let mut run = launch_fake(&workflow, |b| b.failing("B"))?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());

    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let events = events_task.await?;
    // The unrelated sub-graph completes untouched.
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::ItemCompleted && e.item.as_deref() == Some("X")));
    // Both branches record their own failure.
    let failed_branches: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == EventKind::ItemFailed)
        .map(|e| e.branch.as_deref().unwrap())
        .collect();
    assert!(failed_branches.contains(&"scenario=base"));
    assert!(failed_branches.contains(&"scenario=high"));
    Ok(())
}
