#![allow(dead_code)]

use std::collections::BTreeMap;

use dagrun::config::{
    ConnectionConfig, FilterConfig, ItemConfig, RawWorkflowFile, RunSection, SessionConfig,
    WorkflowFile,
};
use dagrun::types::SessionSharing;

/// Builder for [`WorkflowFile`] to simplify test setup.
pub struct WorkflowFileBuilder {
    raw: RawWorkflowFile,
}

impl WorkflowFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawWorkflowFile {
                run: RunSection::default(),
                filter: BTreeMap::new(),
                session: BTreeMap::new(),
                item: BTreeMap::new(),
                connection: Vec::new(),
            },
        }
    }

    pub fn with_item(mut self, name: &str, item: ItemConfig) -> Self {
        self.raw.item.insert(name.to_string(), item);
        self
    }

    pub fn with_connection(self, from: &str, to: &str) -> Self {
        self.with_full_connection(from, to, &[], &[])
    }

    pub fn with_filtered_connection(self, from: &str, to: &str, filters: &[&str]) -> Self {
        self.with_full_connection(from, to, &[], filters)
    }

    pub fn with_full_connection(
        mut self,
        from: &str,
        to: &str,
        resources: &[&str],
        filters: &[&str],
    ) -> Self {
        self.raw.connection.push(ConnectionConfig {
            from: from.to_string(),
            to: to.to_string(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
            filters: filters.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_filter(mut self, name: &str, values: &[&str]) -> Self {
        self.raw.filter.insert(
            name.to_string(),
            FilterConfig {
                values: values.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_session_kind(mut self, kind: &str, command: &[&str], probe: &str) -> Self {
        self.raw.session.insert(
            kind.to_string(),
            SessionConfig {
                command: command.iter().map(|s| s.to_string()).collect(),
                probe: probe.to_string(),
                workdir: None,
            },
        );
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.raw.run.concurrency = n;
        self
    }

    pub fn session_sharing(mut self, sharing: SessionSharing) -> Self {
        self.raw.run.session_sharing = sharing;
        self
    }

    pub fn grace_period(mut self, grace: &str) -> Self {
        self.raw.run.grace_period = grace.to_string();
        self
    }

    pub fn build(self) -> WorkflowFile {
        WorkflowFile::try_from(self.raw).expect("Failed to build valid workflow from builder")
    }

    /// Validation-error variant of [`WorkflowFileBuilder::build`].
    pub fn try_build(self) -> dagrun::errors::Result<WorkflowFile> {
        WorkflowFile::try_from(self.raw)
    }
}

impl Default for WorkflowFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`ItemConfig`].
pub struct ItemConfigBuilder {
    item: ItemConfig,
}

impl ItemConfigBuilder {
    /// A transient-process item.
    pub fn process(command: &[&str]) -> Self {
        Self {
            item: ItemConfig {
                command: command.iter().map(|s| s.to_string()).collect(),
                session: None,
                commands: vec![],
                workdir: None,
                env: BTreeMap::new(),
                timeout: None,
                execute: true,
            },
        }
    }

    /// A persistent-session item.
    pub fn session(kind: &str, commands: &[&str]) -> Self {
        Self {
            item: ItemConfig {
                command: vec![],
                session: Some(kind.to_string()),
                commands: commands.iter().map(|s| s.to_string()).collect(),
                workdir: None,
                env: BTreeMap::new(),
                timeout: None,
                execute: true,
            },
        }
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.item.timeout = Some(timeout.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.item.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn execute(mut self, execute: bool) -> Self {
        self.item.execute = execute;
        self
    }

    pub fn build(self) -> ItemConfig {
        self.item
    }
}
