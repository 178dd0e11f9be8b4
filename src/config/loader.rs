// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw
/// `RawWorkflowFile`.
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (reference integrity, acyclicity, etc.). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawWorkflowFile = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a workflow file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - duplicate / invalid item names,
///   - connections referencing unknown items, filters or sessions,
///   - malformed execution specifications,
///   - cycles in the item graph.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    let raw = load_from_path(&path)?;
    let workflow = WorkflowFile::try_from(raw)?;
    Ok(workflow)
}

/// Helper to resolve a default workflow path.
///
/// Currently this just returns `Dagrun.toml` in the current working
/// directory.
pub fn default_workflow_path() -> PathBuf {
    PathBuf::from("Dagrun.toml")
}
