//! Engine-level error types.

use std::path::PathBuf;

use thiserror::Error;

/// The workflow graph is malformed; no node may run against it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge '{edge_id}' references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        edge_id: String,
        node_id: String,
        side: &'static str,
    },

    /// Topological sort could not place these nodes (in declared order):
    /// each lies on, or downstream of, a cycle.
    #[error("workflow graph contains a cycle through: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },
}

/// Invalid or unreadable executor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Errors produced by the workflow engine before a run can start.
///
/// Node failures never surface here; they are recorded as step errors in the
/// [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workflow graph: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
