// src/graph/model.rs

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::WorkflowFile;
use crate::errors::{DagrunError, Result};
use crate::types::parse_duration;

/// Index of an item in the workflow graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub usize);

/// Identifier of a weakly-connected component of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubgraphId(pub usize);

/// What an item hands to its execution manager.
#[derive(Debug, Clone)]
pub enum ExecutionSpec {
    /// One-shot external process; nothing survives past the execution.
    Process(ProcessSpec),
    /// Requests submitted to a persistent interactive session.
    Session(SessionSpec),
}

#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    /// Argv; the first element is the program.
    pub command: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Expiry takes the stop path and fails the item.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Session backend kind; resolved by the session catalog.
    pub kind: String,
    /// Requests submitted in order; the first failing request fails the item.
    pub commands: Vec<String>,
}

/// A node in the workflow graph.
#[derive(Debug, Clone)]
pub struct ItemNode {
    pub name: String,
    pub spec: ExecutionSpec,
    /// Execution permit. When false the item is marked completed at
    /// readiness without being handed to a manager.
    pub execute: bool,
}

/// A directed dependency between two items.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: ItemId,
    pub to: ItemId,
    /// Labels of resources carried from `from` to `to`.
    pub resources: Vec<String>,
    /// Ordered stack of filter names active on this connection.
    pub filters: Vec<String>,
}

/// Arena-backed workflow graph.
///
/// Immutable for the duration of a run once handed to the engine. Adjacency
/// is precomputed on every `add_edge` so successor/predecessor queries are
/// cheap during scheduling.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    items: Vec<ItemNode>,
    edges: Vec<Edge>,
    successors: Vec<Vec<ItemId>>,
    predecessors: Vec<Vec<ItemId>>,
    index_by_name: HashMap<String, ItemId>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a validated [`WorkflowFile`].
    ///
    /// Assumes the file passed validation: names are unique, references
    /// resolve and the connection graph is acyclic.
    pub fn from_workflow_file(workflow: &WorkflowFile) -> Self {
        let mut graph = Self::new();

        for (name, item) in workflow.item.iter() {
            let spec = if let Some(kind) = &item.session {
                ExecutionSpec::Session(SessionSpec {
                    kind: kind.clone(),
                    commands: item.commands.clone(),
                })
            } else {
                ExecutionSpec::Process(ProcessSpec {
                    command: item.command.clone(),
                    workdir: item.workdir.clone(),
                    env: item.env.clone(),
                    timeout: item
                        .timeout
                        .as_deref()
                        .map(|s| parse_duration(s).expect("validated duration")),
                })
            };
            let id = graph
                .add_item(name.clone(), spec)
                .expect("validated workflow has unique item names");
            graph.items[id.0].execute = item.execute;
        }

        for conn in workflow.connection.iter() {
            let from = graph.index_by_name[&conn.from];
            let to = graph.index_by_name[&conn.to];
            graph
                .add_edge(from, to, conn.resources.clone(), conn.filters.clone())
                .expect("validated workflow has well-formed connections");
        }

        graph
    }

    /// Add an item; fails if the name is already taken.
    pub fn add_item(&mut self, name: impl Into<String>, spec: ExecutionSpec) -> Result<ItemId> {
        let name = name.into();
        if self.index_by_name.contains_key(&name) {
            return Err(DagrunError::Structural(format!(
                "duplicate item name '{}'",
                name
            )));
        }

        let id = ItemId(self.items.len());
        self.items.push(ItemNode {
            name: name.clone(),
            spec,
            execute: true,
        });
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        self.index_by_name.insert(name, id);
        Ok(id)
    }

    /// Turn off the execution permit for an item.
    pub fn set_execute(&mut self, id: ItemId, execute: bool) {
        self.items[id.0].execute = execute;
    }

    /// Add a directed dependency edge.
    pub fn add_edge(
        &mut self,
        from: ItemId,
        to: ItemId,
        resources: Vec<String>,
        filters: Vec<String>,
    ) -> Result<()> {
        if from.0 >= self.items.len() || to.0 >= self.items.len() {
            return Err(DagrunError::Structural(format!(
                "edge endpoint out of range ({} -> {})",
                from.0, to.0
            )));
        }
        if from == to {
            return Err(DagrunError::Structural(format!(
                "item '{}' cannot depend on itself",
                self.items[from.0].name
            )));
        }

        self.edges.push(Edge {
            from,
            to,
            resources,
            filters,
        });

        // Parallel edges are allowed (different resources / filter stacks),
        // but adjacency lists stay deduplicated.
        if !self.successors[from.0].contains(&to) {
            self.successors[from.0].push(to);
        }
        if !self.predecessors[to.0].contains(&from) {
            self.predecessors[to.0].push(from);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, id: ItemId) -> &ItemNode {
        &self.items[id.0]
    }

    pub fn item_id(&self, name: &str) -> Option<ItemId> {
        self.index_by_name.get(name).copied()
    }

    pub fn items(&self) -> impl Iterator<Item = (ItemId, &ItemNode)> {
        self.items.iter().enumerate().map(|(i, n)| (ItemId(i), n))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Immediate successors (items depending on `id`).
    pub fn successors_of(&self, id: ItemId) -> &[ItemId] {
        &self.successors[id.0]
    }

    /// Immediate predecessors (items `id` depends on).
    pub fn predecessors_of(&self, id: ItemId) -> &[ItemId] {
        &self.predecessors[id.0]
    }

    /// Edges arriving at `id`.
    pub fn inbound_edges(&self, id: ItemId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.to == id)
    }

    /// Union of resource labels carried by edges arriving at `id`,
    /// deduplicated and sorted.
    pub fn inbound_resources(&self, id: ItemId) -> Vec<String> {
        let mut labels: Vec<String> = self
            .inbound_edges(id)
            .flat_map(|e| e.resources.iter().cloned())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}
