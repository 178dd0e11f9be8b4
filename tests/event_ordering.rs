// tests/event_ordering.rs

//! Delivered event order: an item's start always precedes its terminal
//! event, and a predecessor's terminal event precedes its successors'
//! start within the same branch.

use std::error::Error;

use dagrun::engine::RunOutcome;
use dagrun::event::{Event, EventKind};
use dagrun_test_utils::builders::{ItemConfigBuilder, WorkflowFileBuilder};
use dagrun_test_utils::fake_backend::launch_fake;
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn index_of(events: &[Event], branch: &str, item: &str, kind: EventKind) -> usize {
    events
        .iter()
        .position(|e| {
            e.kind == kind && e.branch.as_deref() == Some(branch) && e.item.as_deref() == Some(item)
        })
        .unwrap_or_else(|| panic!("no {kind:?} event for {branch}/{item}"))
}

fn terminal_index(events: &[Event], branch: &str, item: &str) -> usize {
    events
        .iter()
        .position(|e| {
            e.kind.is_item_terminal()
                && e.branch.as_deref() == Some(branch)
                && e.item.as_deref() == Some(item)
        })
        .unwrap_or_else(|| panic!("no terminal event for {branch}/{item}"))
}

#[tokio::test]
async fn start_precedes_terminal_and_predecessors_precede_successors() -> TestResult {
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

    let events = events_task.await?;

    for branch in ["scenario=base", "scenario=high"] {
        for item in ["A", "B", "C", "D"] {
            let start = index_of(&events, branch, item, EventKind::ItemStart);
            let terminal = terminal_index(&events, branch, item);
            assert!(
                start < terminal,
                "{branch}/{item}: start at {start}, terminal at {terminal}"
            );
        }

        // Every edge: source terminal before destination start.
        for (from, to) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")] {
            let from_terminal = terminal_index(&events, branch, from);
            let to_start = index_of(&events, branch, to, EventKind::ItemStart);
            assert!(
                from_terminal < to_start,
                "{branch}: {from} terminal at {from_terminal}, {to} start at {to_start}"
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn skip_events_follow_the_failure_that_caused_them() -> TestResult {
    init_tracing();

    let workflow = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["echo", "A"]).build())
        .with_item("B", ItemConfigBuilder::process(&["echo", "B"]).build())
        .with_item("C", ItemConfigBuilder::process(&["echo", "C"]).build())
        .with_connection("A", "B")
        .with_connection("B", "C")
        .build();

    let mut run = launch_fake(&workflow, |b| b.failing("A"))?;
    let events_task = tokio::spawn(run.handle.take_events().unwrap().collect());
    let outcome = with_timeout(run.handle.wait()).await?;
    assert_eq!(outcome, RunOutcome::Failed);

    let events = events_task.await?;
    let failed = index_of(&events, "default", "A", EventKind::ItemFailed);
    let skipped_b = index_of(&events, "default", "B", EventKind::ItemSkipped);
    let skipped_c = index_of(&events, "default", "C", EventKind::ItemSkipped);
    assert!(failed < skipped_b);
    assert!(skipped_b < skipped_c);
    Ok(())
}
