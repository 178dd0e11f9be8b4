// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cycle detected in workflow graph: {0}")]
    Cycle(String),

    #[error("structural error: {0}")]
    Structural(String),

    #[error("worker failed to launch: {0}")]
    Launch(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("session backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DagrunError>;
