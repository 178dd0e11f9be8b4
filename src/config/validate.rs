// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::{DagrunError, Result};
use crate::types::parse_duration;

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = DagrunError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_workflow(&raw)?;
        Ok(WorkflowFile::new_unchecked(raw))
    }
}

fn validate_raw_workflow(raw: &RawWorkflowFile) -> Result<()> {
    ensure_has_items(raw)?;
    validate_run_section(raw)?;
    validate_item_names(raw)?;
    validate_item_specs(raw)?;
    validate_connections(raw)?;
    validate_dag(raw)?;
    Ok(())
}

fn ensure_has_items(raw: &RawWorkflowFile) -> Result<()> {
    if raw.item.is_empty() {
        return Err(DagrunError::Config(
            "workflow must contain at least one [item.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_run_section(raw: &RawWorkflowFile) -> Result<()> {
    if raw.run.concurrency == 0 {
        return Err(DagrunError::Config(
            "[run].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.run.event_buffer == 0 {
        return Err(DagrunError::Config(
            "[run].event_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Err(e) = parse_duration(&raw.run.grace_period) {
        return Err(DagrunError::Config(format!(
            "[run].grace_period is not a valid duration: {e}"
        )));
    }
    Ok(())
}

fn validate_item_names(raw: &RawWorkflowFile) -> Result<()> {
    // TOML keys are unique per table, so duplicates cannot appear here;
    // only the character set needs checking.
    let name_re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\- ]*$").expect("static regex");

    for name in raw.item.keys() {
        if !name_re.is_match(name) {
            return Err(DagrunError::Config(format!(
                "item name '{}' contains invalid characters",
                name
            )));
        }
    }
    Ok(())
}

fn validate_item_specs(raw: &RawWorkflowFile) -> Result<()> {
    for (name, item) in raw.item.iter() {
        let has_command = !item.command.is_empty();
        let has_session = item.session.is_some();

        if has_command == has_session {
            return Err(DagrunError::Config(format!(
                "item '{}' must set exactly one of `command` or `session`",
                name
            )));
        }

        if let Some(kind) = &item.session {
            if !raw.session.contains_key(kind) {
                return Err(DagrunError::Config(format!(
                    "item '{}' references unknown session kind '{}'",
                    name, kind
                )));
            }
            if item.commands.is_empty() {
                return Err(DagrunError::Config(format!(
                    "session item '{}' must list at least one entry in `commands`",
                    name
                )));
            }
        } else if !item.commands.is_empty() {
            return Err(DagrunError::Config(format!(
                "item '{}' sets `commands` but is not a session item",
                name
            )));
        }

        if let Some(timeout) = &item.timeout {
            if let Err(e) = parse_duration(timeout) {
                return Err(DagrunError::Config(format!(
                    "item '{}' has invalid timeout: {}",
                    name, e
                )));
            }
        }
    }

    for (kind, session) in raw.session.iter() {
        if session.command.is_empty() {
            return Err(DagrunError::Config(format!(
                "session kind '{}' has an empty `command`",
                kind
            )));
        }
        if !session.probe.contains("{marker}") {
            return Err(DagrunError::Config(format!(
                "session kind '{}' probe must contain the {{marker}} placeholder",
                kind
            )));
        }
    }

    Ok(())
}

fn validate_connections(raw: &RawWorkflowFile) -> Result<()> {
    for conn in raw.connection.iter() {
        for endpoint in [&conn.from, &conn.to] {
            if !raw.item.contains_key(endpoint) {
                return Err(DagrunError::Config(format!(
                    "connection {} -> {} references unknown item '{}'",
                    conn.from, conn.to, endpoint
                )));
            }
        }
        if conn.from == conn.to {
            return Err(DagrunError::Structural(format!(
                "item '{}' cannot depend on itself",
                conn.from
            )));
        }
        for filter in conn.filters.iter() {
            if !raw.filter.contains_key(filter) {
                return Err(DagrunError::Structural(format!(
                    "connection {} -> {} references unknown filter '{}'",
                    conn.from, conn.to, filter
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(raw: &RawWorkflowFile) -> Result<()> {
    // Build a simple petgraph graph from the items and their connections.
    // Edge direction: from -> to.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in raw.item.keys() {
        graph.add_node(name.as_str());
    }

    for conn in raw.connection.iter() {
        graph.add_edge(conn.from.as_str(), conn.to.as_str(), ());
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(DagrunError::Cycle(format!(
                "cycle in workflow involving item '{}'",
                node
            )))
        }
    }
}
