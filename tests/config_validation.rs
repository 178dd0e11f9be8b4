// tests/config_validation.rs

//! Workflow-file validation: referential integrity, specification rules
//! and cycle rejection, both from builders and from TOML on disk.

use std::error::Error;
use std::io::Write;

use dagrun::config::load_and_validate;
use dagrun::errors::DagrunError;
use dagrun_test_utils::builders::{ItemConfigBuilder, WorkflowFileBuilder};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn cycle_is_rejected_before_any_execution() {
    let err = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["true"]).build())
        .with_item("B", ItemConfigBuilder::process(&["true"]).build())
        .with_item("C", ItemConfigBuilder::process(&["true"]).build())
        .with_connection("A", "B")
        .with_connection("B", "C")
        .with_connection("C", "A")
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Cycle(_)));
}

#[test]
fn unknown_connection_endpoint_is_rejected() {
    let err = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["true"]).build())
        .with_connection("A", "nowhere")
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Config(_)));
}

#[test]
fn self_dependency_is_rejected() {
    let err = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["true"]).build())
        .with_connection("A", "A")
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Structural(_)));
}

#[test]
fn unknown_filter_reference_is_rejected() {
    let err = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["true"]).build())
        .with_item("B", ItemConfigBuilder::process(&["true"]).build())
        .with_filtered_connection("A", "B", &["scenario"])
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Structural(_)));
}

#[test]
fn item_needs_exactly_one_execution_spec() {
    // Neither command nor session.
    let neither = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&[]).build())
        .try_build()
        .unwrap_err();
    assert!(matches!(neither, DagrunError::Config(_)));

    // Session kind must exist.
    let unknown_session = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::session("python", &["x"]).build())
        .try_build()
        .unwrap_err();
    assert!(matches!(unknown_session, DagrunError::Config(_)));
}

#[test]
fn session_probe_needs_marker_placeholder() {
    let err = WorkflowFileBuilder::new()
        .with_session_kind("shell", &["sh"], "echo done")
        .with_item("A", ItemConfigBuilder::session("shell", &["true"]).build())
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Config(_)));
}

#[test]
fn invalid_timeout_is_rejected() {
    let err = WorkflowFileBuilder::new()
        .with_item(
            "A",
            ItemConfigBuilder::process(&["true"]).timeout("soon").build(),
        )
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Config(_)));
}

#[test]
fn zero_concurrency_is_rejected() {
    let err = WorkflowFileBuilder::new()
        .with_item("A", ItemConfigBuilder::process(&["true"]).build())
        .concurrency(0)
        .try_build()
        .unwrap_err();
    assert!(matches!(err, DagrunError::Config(_)));
}

#[test]
fn toml_round_trip_loads_and_validates() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[run]
concurrency = 2

[filter.scenario]
values = ["base", "high"]

[session.shell]
command = ["sh"]
probe = "echo {{marker}}$?"

[item.import]
command = ["echo", "importing"]

[item.model]
session = "shell"
commands = ["echo modelling"]

[[connection]]
from = "import"
to = "model"
resources = ["inputs.sqlite"]
filters = ["scenario"]
"#
    )?;

    let workflow = load_and_validate(file.path())?;
    assert_eq!(workflow.run.concurrency, 2);
    assert_eq!(workflow.item.len(), 2);
    assert_eq!(workflow.connection.len(), 1);
    assert_eq!(workflow.filter["scenario"].values, vec!["base", "high"]);
    Ok(())
}

#[test]
fn toml_with_cycle_fails_to_load() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[item.a]
command = ["true"]

[item.b]
command = ["true"]

[[connection]]
from = "a"
to = "b"

[[connection]]
from = "b"
to = "a"
"#
    )?;

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, DagrunError::Cycle(_)));
    Ok(())
}
