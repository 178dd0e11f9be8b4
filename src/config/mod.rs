// src/config/mod.rs

//! Workflow definition loading and validation.
//!
//! - [`model`] is the serde view of the TOML workflow file.
//! - [`loader`] reads a file from disk and runs validation.
//! - [`validate`] implements `TryFrom<RawWorkflowFile> for WorkflowFile`,
//!   which is the only way to obtain a validated [`model::WorkflowFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_workflow_path, load_and_validate, load_from_path};
pub use model::{
    ConnectionConfig, FilterConfig, ItemConfig, RawWorkflowFile, RunSection, SessionConfig,
    WorkflowFile,
};
