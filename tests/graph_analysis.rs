// tests/graph_analysis.rs

//! Structural properties of the workflow graph: decomposition, cycle
//! detection and topological layering.

use std::collections::HashMap;

use proptest::prelude::*;

use dagrun::errors::DagrunError;
use dagrun::graph::{
    decompose, detect_cycle, topological_layers, ExecutionSpec, ItemId, ProcessSpec, WorkflowGraph,
};

fn process_spec() -> ExecutionSpec {
    ExecutionSpec::Process(ProcessSpec {
        command: vec!["true".to_string()],
        ..ProcessSpec::default()
    })
}

/// Build a graph from item names and (from, to) name pairs.
fn build_graph(items: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    let mut ids = HashMap::new();
    for name in items {
        let id = graph.add_item(*name, process_spec()).unwrap();
        ids.insert(*name, id);
    }
    for (from, to) in edges {
        graph
            .add_edge(ids[from], ids[to], vec![], vec![])
            .unwrap();
    }
    graph
}

#[test]
fn decompose_splits_disconnected_components() {
    let graph = build_graph(
        &["a", "b", "c", "x", "y", "lonely"],
        &[("a", "b"), ("b", "c"), ("x", "y")],
    );

    let subgraphs = decompose(&graph);
    assert_eq!(subgraphs.len(), 3);

    let sizes: Vec<usize> = subgraphs.iter().map(|s| s.items.len()).collect();
    assert_eq!(sizes, vec![3, 2, 1]);
}

#[test]
fn decompose_ignores_edge_direction() {
    // a -> b <- c is one weak component despite no directed path a..c.
    let graph = build_graph(&["a", "b", "c"], &[("a", "b"), ("c", "b")]);
    let subgraphs = decompose(&graph);
    assert_eq!(subgraphs.len(), 1);
}

#[test]
fn detect_cycle_finds_directed_cycle() {
    let graph = build_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
    let subgraphs = decompose(&graph);
    assert_eq!(subgraphs.len(), 1);
    assert!(detect_cycle(&graph, &subgraphs[0]).is_some());
}

#[test]
fn detect_cycle_accepts_diamond() {
    let graph = build_graph(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    let subgraphs = decompose(&graph);
    assert!(detect_cycle(&graph, &subgraphs[0]).is_none());
}

#[test]
fn layers_respect_dependencies_in_diamond() {
    let graph = build_graph(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    let subgraphs = decompose(&graph);
    let layers = topological_layers(&graph, &subgraphs[0]).unwrap();

    let names: Vec<Vec<&str>> = layers
        .iter()
        .map(|layer| layer.iter().map(|&id| graph.item(id).name.as_str()).collect())
        .collect();
    assert_eq!(names, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
}

#[test]
fn layers_fail_on_cycle() {
    let graph = build_graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
    let subgraphs = decompose(&graph);
    let err = topological_layers(&graph, &subgraphs[0]).unwrap_err();
    assert!(matches!(err, DagrunError::Cycle(_)));
}

#[test]
fn duplicate_item_name_is_rejected() {
    let mut graph = WorkflowGraph::new();
    graph.add_item("a", process_spec()).unwrap();
    let err = graph.add_item("a", process_spec()).unwrap_err();
    assert!(matches!(err, DagrunError::Structural(_)));
}

#[test]
fn self_edge_is_rejected() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_item("a", process_spec()).unwrap();
    let err = graph.add_edge(a, a, vec![], vec![]).unwrap_err();
    assert!(matches!(err, DagrunError::Structural(_)));
}

// Strategy: generate a random DAG by only allowing edges i -> j with i < j.
fn dag_strategy(max_items: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=max_items).prop_flat_map(|n| {
        let edges = proptest::collection::vec((0..n, 0..n), 0..n * 2).prop_map(move |pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
                .collect::<Vec<_>>()
        });
        (Just(n), edges)
    })
}

proptest! {
    /// For every generated DAG, each edge's source lands in a strictly
    /// earlier layer than its destination, and layering covers all items.
    #[test]
    fn topological_layers_respect_every_edge((n, edges) in dag_strategy(10)) {
        let mut graph = WorkflowGraph::new();
        let ids: Vec<ItemId> = (0..n)
            .map(|i| graph.add_item(format!("item_{i}"), process_spec()).unwrap())
            .collect();
        for (from, to) in edges.iter() {
            graph.add_edge(ids[*from], ids[*to], vec![], vec![]).unwrap();
        }

        let subgraphs = decompose(&graph);

        let total: usize = subgraphs.iter().map(|s| s.items.len()).sum();
        prop_assert_eq!(total, n);

        let mut layer_of: HashMap<ItemId, usize> = HashMap::new();
        for subgraph in subgraphs.iter() {
            prop_assert!(detect_cycle(&graph, subgraph).is_none());
            let layers = topological_layers(&graph, subgraph).unwrap();
            for (depth, layer) in layers.iter().enumerate() {
                for &id in layer {
                    layer_of.insert(id, depth);
                }
            }
        }

        for (from, to) in edges.iter() {
            prop_assert!(layer_of[&ids[*from]] < layer_of[&ids[*to]]);
        }
    }
}
