//! Error types for the cluster program.

use resource_graph::GraphError;
use thiserror::Error;

/// Errors that can occur while configuring, declaring or running the stack.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StackError {
    /// The configuration file could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// A parameter bag could not be turned into resource inputs.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The state file could not be read or written.
    #[error("State file error: {0}")]
    State(String),

    /// Declaring or materializing the graph failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
