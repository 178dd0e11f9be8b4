// src/filter/mod.rs

//! Filter dimensions and branch expansion.
//!
//! A connection may carry a stack of named filters (e.g. a scenario
//! selection). Every filter name active within a sub-graph contributes one
//! dimension; the sub-graph is executed once per combination of candidate
//! values. [`expander`] enumerates those combinations as [`Branch`]es.

pub mod expander;

pub use expander::{active_filters, expand_branches, Branch};

use std::collections::BTreeMap;

use crate::config::model::WorkflowFile;
use crate::errors::{DagrunError, Result};

/// Supplies candidate values for a named filter.
///
/// This is the seam towards whatever resolves filter semantics (scenario
/// enumeration, a database query, a fixed list). Referencing a name the
/// resolver does not know is a structural error.
pub trait FilterResolver {
    fn candidates(&self, filter: &str) -> Result<Vec<String>>;
}

/// Resolver backed by the `[filter.<name>]` sections of a workflow file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFilterResolver {
    values: BTreeMap<String, Vec<String>>,
}

impl ConfigFilterResolver {
    pub fn new(values: BTreeMap<String, Vec<String>>) -> Self {
        Self { values }
    }

    pub fn from_workflow_file(workflow: &WorkflowFile) -> Self {
        let values = workflow
            .filter
            .iter()
            .map(|(name, cfg)| (name.clone(), cfg.values.clone()))
            .collect();
        Self { values }
    }
}

impl FilterResolver for ConfigFilterResolver {
    fn candidates(&self, filter: &str) -> Result<Vec<String>> {
        self.values
            .get(filter)
            .cloned()
            .ok_or_else(|| DagrunError::Structural(format!("unknown filter '{}'", filter)))
    }
}
