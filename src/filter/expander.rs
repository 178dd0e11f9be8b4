// src/filter/expander.rs

use crate::errors::Result;
use crate::filter::FilterResolver;
use crate::graph::{Subgraph, WorkflowGraph};

/// One concrete filter-value assignment under which a sub-graph executes.
///
/// Branches are independent execution contexts: they share topology but
/// nothing else. A sub-graph with no active filters has exactly one branch,
/// the identity branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// `(filter name, value)` pairs in first-appearance order.
    pub assignment: Vec<(String, String)>,
    /// Stable label used in events, e.g. `"scenario=base"`.
    pub label: String,
}

impl Branch {
    pub fn identity() -> Self {
        Self {
            assignment: Vec::new(),
            label: "default".to_string(),
        }
    }

    fn from_assignment(assignment: Vec<(String, String)>) -> Self {
        let label = assignment
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        Self { assignment, label }
    }

    pub fn value_of(&self, filter: &str) -> Option<&str> {
        self.assignment
            .iter()
            .find(|(name, _)| name == filter)
            .map(|(_, value)| value.as_str())
    }
}

/// Filter names active within a sub-graph, in first-appearance order over
/// its edges. Order determines branch enumeration and label layout.
pub fn active_filters(graph: &WorkflowGraph, subgraph: &Subgraph) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for edge in graph.edges() {
        if !subgraph.contains(edge.from) {
            continue;
        }
        for filter in edge.filters.iter() {
            if !names.iter().any(|n| n == filter) {
                names.push(filter.clone());
            }
        }
    }
    names
}

/// Enumerate the branches of a sub-graph: the cross-product of candidate
/// value sets across all active filter names.
///
/// A filter with zero candidate values yields zero branches for the whole
/// sub-graph; the caller is expected to skip it with a warning. Sub-graphs
/// are expanded independently, so a filter active elsewhere has no effect
/// here.
pub fn expand_branches(
    graph: &WorkflowGraph,
    subgraph: &Subgraph,
    resolver: &dyn FilterResolver,
) -> Result<Vec<Branch>> {
    let names = active_filters(graph, subgraph);
    if names.is_empty() {
        return Ok(vec![Branch::identity()]);
    }

    let mut dimensions: Vec<(String, Vec<String>)> = Vec::with_capacity(names.len());
    for name in names {
        let candidates = resolver.candidates(&name)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        dimensions.push((name, candidates));
    }

    let mut branches: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for (name, candidates) in dimensions.iter() {
        let mut expanded = Vec::with_capacity(branches.len() * candidates.len());
        for partial in branches.iter() {
            for value in candidates.iter() {
                let mut assignment = partial.clone();
                assignment.push((name.clone(), value.clone()));
                expanded.push(assignment);
            }
        }
        branches = expanded;
    }

    Ok(branches.into_iter().map(Branch::from_assignment).collect())
}
