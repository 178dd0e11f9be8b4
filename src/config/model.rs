// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::SessionSharing;

/// Top-level workflow definition as read from a TOML file.
///
/// ```toml
/// [run]
/// concurrency = 4
///
/// [filter.scenario]
/// values = ["base", "high"]
///
/// [session.python]
/// command = ["python3", "-q", "-i"]
/// probe = "print(\"{marker}\")"
///
/// [item.import]
/// command = ["python3", "import.py"]
///
/// [item.model]
/// session = "python"
/// commands = ["run_model()"]
///
/// [[connection]]
/// from = "import"
/// to = "model"
/// resources = ["inputs.sqlite"]
/// filters = ["scenario"]
/// ```
///
/// All sections except `[item.<name>]` are optional and have reasonable
/// defaults. This raw form is unvalidated; use
/// `WorkflowFile::try_from(raw)` (or [`super::loader::load_and_validate`])
/// to obtain a validated [`WorkflowFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    /// Global run behaviour from `[run]`.
    #[serde(default)]
    pub run: RunSection,

    /// Filter candidate values from `[filter.<name>]`.
    #[serde(default)]
    pub filter: BTreeMap<String, FilterConfig>,

    /// Persistent session backends from `[session.<kind>]`.
    #[serde(default)]
    pub session: BTreeMap<String, SessionConfig>,

    /// All items from `[item.<name>]`. Keys are the item names.
    #[serde(default)]
    pub item: BTreeMap<String, ItemConfig>,

    /// Directed dependencies from `[[connection]]`.
    #[serde(default)]
    pub connection: Vec<ConnectionConfig>,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Maximum number of concurrently executing items across all branches
    /// and sub-graphs.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the event-stream buffer. When the buffer is full,
    /// producers wait until the consumer catches up.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Scope at which persistent sessions are reused (`"item"`, `"branch"`
    /// or `"run"`).
    #[serde(default)]
    pub session_sharing: SessionSharing,

    /// Grace period between a stop request and forced termination of a
    /// worker, e.g. `"5s"`.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,
}

fn default_concurrency() -> usize {
    4
}

fn default_event_buffer() -> usize {
    256
}

fn default_grace_period() -> String {
    "5s".to_string()
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            event_buffer: default_event_buffer(),
            session_sharing: SessionSharing::default(),
            grace_period: default_grace_period(),
        }
    }
}

/// `[filter.<name>]` section: the candidate values of one filter dimension.
///
/// An empty `values` list is allowed; it means every sub-graph on which the
/// filter is active expands to zero branches and is skipped with a warning.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub values: Vec<String>,
}

/// `[session.<kind>]` section: how to launch a persistent session backend
/// and how to probe it for request completion.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Argv to launch the long-lived backend process, e.g.
    /// `["python3", "-q", "-i"]` or `["sh"]`.
    pub command: Vec<String>,

    /// Probe request template; `{marker}` is replaced with the sentinel.
    /// The backend must answer the probe with a line starting with the
    /// sentinel; any text after it is the status payload (`""`/`"0"` means
    /// success), e.g. `"echo {marker}$?"` for a shell backend.
    pub probe: String,

    /// Directory in which to start the backend process.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

/// `[item.<name>]` section.
///
/// Exactly one of `command` (transient process) or `session` + `commands`
/// (persistent session) must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemConfig {
    /// Argv for a transient process execution.
    #[serde(default)]
    pub command: Vec<String>,

    /// Session kind (a key of `[session.<kind>]`) for session executions.
    #[serde(default)]
    pub session: Option<String>,

    /// Requests submitted to the session, in order.
    #[serde(default)]
    pub commands: Vec<String>,

    /// Working directory for a transient process.
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Extra environment variables for a transient process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Per-item timeout, e.g. `"30s"`. Expiry takes the same stop path as
    /// cancellation and fails the item.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Execution permit. When false the item is never handed to a manager;
    /// it is marked completed immediately so its successors unlock.
    #[serde(default = "default_execute")]
    pub execute: bool,
}

fn default_execute() -> bool {
    true
}

/// `[[connection]]` entry: a directed dependency between two items.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub from: String,
    pub to: String,

    /// Labels of the resources carried over this connection.
    #[serde(default)]
    pub resources: Vec<String>,

    /// Ordered stack of filter names active on this connection.
    #[serde(default)]
    pub filters: Vec<String>,
}

/// A validated workflow file.
///
/// Can only be constructed through `TryFrom<RawWorkflowFile>` (see
/// [`super::validate`]), which guarantees referential integrity and an
/// acyclic item graph.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub run: RunSection,
    pub filter: BTreeMap<String, FilterConfig>,
    pub session: BTreeMap<String, SessionConfig>,
    pub item: BTreeMap<String, ItemConfig>,
    pub connection: Vec<ConnectionConfig>,
}

impl WorkflowFile {
    /// Construct without validation. Internal; used by the `TryFrom`
    /// impl after checks have passed.
    pub(crate) fn new_unchecked(raw: RawWorkflowFile) -> Self {
        Self {
            run: raw.run,
            filter: raw.filter,
            session: raw.session,
            item: raw.item,
            connection: raw.connection,
        }
    }
}
