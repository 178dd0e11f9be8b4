// src/graph/mod.rs

//! Workflow graph representation and analysis.
//!
//! - [`model`] holds the arena-backed item/edge store. Items refer to each
//!   other by [`model::ItemId`] index, never by owning pointers.
//! - [`analysis`] decomposes the graph into weakly-connected sub-graphs,
//!   detects cycles and computes topological ready-layers.

pub mod analysis;
pub mod model;

pub use analysis::{decompose, detect_cycle, topological_layers, Subgraph};
pub use model::{
    Edge, ExecutionSpec, ItemId, ItemNode, ProcessSpec, SessionSpec, SubgraphId, WorkflowGraph,
};
