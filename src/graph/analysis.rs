// src/graph/analysis.rs

//! Structural analysis over a [`WorkflowGraph`]: decomposition into
//! weakly-connected sub-graphs, cycle detection and topological layering.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;

use crate::errors::{DagrunError, Result};
use crate::graph::model::{ItemId, SubgraphId, WorkflowGraph};

/// A weakly-connected component of the workflow graph.
///
/// Sub-graphs execute independently of one another; the engine schedules
/// each one (and each of its filter branches) on its own.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub id: SubgraphId,
    /// Member items, sorted by arena index.
    pub items: Vec<ItemId>,
}

impl Subgraph {
    pub fn contains(&self, id: ItemId) -> bool {
        self.items.binary_search(&id).is_ok()
    }
}

/// Decompose the graph into weakly-connected components.
///
/// Connectivity ignores edge direction; sub-graphs are returned in order of
/// their smallest member item so the result is deterministic.
pub fn decompose(graph: &WorkflowGraph) -> Vec<Subgraph> {
    let mut uf: UnionFind<usize> = UnionFind::new(graph.len());
    for edge in graph.edges() {
        uf.union(edge.from.0, edge.to.0);
    }

    let mut members: HashMap<usize, Vec<ItemId>> = HashMap::new();
    for (id, _) in graph.items() {
        members.entry(uf.find(id.0)).or_default().push(id);
    }

    let mut components: Vec<Vec<ItemId>> = members.into_values().collect();
    for items in components.iter_mut() {
        items.sort();
    }
    components.sort_by_key(|items| items[0]);

    components
        .into_iter()
        .enumerate()
        .map(|(i, items)| Subgraph {
            id: SubgraphId(i),
            items,
        })
        .collect()
}

/// Detect a directed cycle within one sub-graph.
///
/// Iterative depth-first search with explicit recursion-stack marking.
/// Returns an item participating in a cycle, or `None` if the sub-graph is
/// acyclic.
pub fn detect_cycle(graph: &WorkflowGraph, subgraph: &Subgraph) -> Option<ItemId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        OnStack,
        Done,
    }

    let mut marks: HashMap<ItemId, Mark> =
        subgraph.items.iter().map(|&id| (id, Mark::White)).collect();

    for &root in subgraph.items.iter() {
        if marks[&root] != Mark::White {
            continue;
        }

        // Stack of (item, next successor index to visit).
        let mut stack: Vec<(ItemId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::OnStack);

        while let Some(frame) = stack.last_mut() {
            let item = frame.0;
            let succs = graph.successors_of(item);
            if frame.1 < succs.len() {
                let succ = succs[frame.1];
                frame.1 += 1;
                match marks[&succ] {
                    Mark::OnStack => return Some(succ),
                    Mark::White => {
                        marks.insert(succ, Mark::OnStack);
                        stack.push((succ, 0));
                    }
                    Mark::Done => {}
                }
            } else {
                marks.insert(item, Mark::Done);
                stack.pop();
            }
        }
    }

    None
}

/// Compute topological ready-layers for one sub-graph.
///
/// Items within one layer have no dependency between them and may be
/// dispatched concurrently. Every edge's source appears in an earlier layer
/// than its destination. Fails with a cycle error if the sub-graph is not
/// acyclic.
pub fn topological_layers(graph: &WorkflowGraph, subgraph: &Subgraph) -> Result<Vec<Vec<ItemId>>> {
    let mut indegree: HashMap<ItemId, usize> = subgraph
        .items
        .iter()
        .map(|&id| {
            let deg = graph
                .predecessors_of(id)
                .iter()
                .filter(|p| subgraph.contains(**p))
                .count();
            (id, deg)
        })
        .collect();

    let mut layers: Vec<Vec<ItemId>> = Vec::new();
    let mut placed = 0usize;

    let mut current: Vec<ItemId> = subgraph
        .items
        .iter()
        .copied()
        .filter(|id| indegree[id] == 0)
        .collect();

    while !current.is_empty() {
        current.sort();
        placed += current.len();

        let mut next: Vec<ItemId> = Vec::new();
        for &id in current.iter() {
            for &succ in graph.successors_of(id) {
                if !subgraph.contains(succ) {
                    continue;
                }
                let deg = indegree.get_mut(&succ).expect("successor in subgraph");
                *deg -= 1;
                if *deg == 0 {
                    next.push(succ);
                }
            }
        }

        layers.push(std::mem::replace(&mut current, next));
    }

    if placed != subgraph.items.len() {
        let stuck = subgraph
            .items
            .iter()
            .find(|id| indegree[*id] > 0)
            .map(|&id| graph.item(id).name.clone())
            .unwrap_or_default();
        return Err(DagrunError::Cycle(format!(
            "cycle in sub-graph {} involving item '{}'",
            subgraph.id.0, stuck
        )));
    }

    Ok(layers)
}
