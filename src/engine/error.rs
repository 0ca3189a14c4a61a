// SPDX-License-Identifier: MIT

//! Typed error handling for stepgraph-rs
//!
//! Errors are split by when they surface:
//! - `ValidationError` - a graph definition is malformed (build time)
//! - `RunError` - a run failed while the interpreter loop was executing
//! - `StepError` - a step function reported failure
//! - `EngineError` - top-level error returned to callers of the engine API

use thiserror::Error;

/// Top-level error type for stepgraph-rs
#[derive(Debug, Error)]
pub enum EngineError {
    /// Graph definition failed validation
    #[error("Invalid graph: {0}")]
    Validation(#[from] ValidationError),

    /// A node references a step that is not registered
    #[error("Step '{name}' not found in registry")]
    UnknownStepName { name: String },

    /// A conditional branch references a predicate that is not registered
    #[error("Predicate '{name}' not found in registry")]
    UnknownPredicate { name: String },

    /// No graph stored under the given id
    #[error("Graph '{0}' not found")]
    GraphNotFound(String),

    /// No run stored under the given id
    #[error("Run '{0}' not found")]
    RunNotFound(String),

    /// Configuration errors (bad env vars, zero budgets)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime failure of a run
    #[error("Run failed: {0}")]
    Run(#[from] RunError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Structural problems found while building a graph definition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// No entry point was set
    #[error("Graph has no entry point defined")]
    MissingEntryNode,

    /// Entry point is not a declared node
    #[error("Entry node '{0}' is not a declared node")]
    UnknownEntryNode(String),

    /// Two nodes share an id
    #[error("Node id '{0}' is declared more than once")]
    DuplicateNodeId(String),

    /// A node tried to use the terminal sentinel as its id
    #[error("Node id '{0}' is reserved for the terminal sentinel")]
    ReservedNodeId(String),

    /// An edge points at neither a node nor the terminal sentinel
    #[error("Edge from '{source_node}' targets unknown node '{target}'")]
    DanglingEdgeTarget { source_node: String, target: String },

    /// An edge leaves a node that does not exist
    #[error("Edge source '{0}' is not a declared node")]
    UnknownEdgeSource(String),

    /// A node declares more than one outbound edge
    #[error("Node '{0}' has more than one outbound edge")]
    MultipleOutboundEdges(String),

    /// A conditional branch names neither or both of `when` / `condition`
    #[error("Branch {index} on edge from '{source_node}' must set exactly one of `when` or `condition`")]
    InvalidBranch { source_node: String, index: usize },

    /// A condition expression could not be parsed
    #[error("Invalid condition '{condition}' on edge from '{source_node}': {reason}")]
    InvalidCondition {
        source_node: String,
        condition: String,
        reason: String,
    },
}

/// Failures captured into a run record
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    /// A step function returned an error
    #[error("Error in node {node}: {message}")]
    StepExecution { node: String, message: String },

    /// A node without an outbound edge was reached
    #[error("No outgoing edge defined for node '{0}'")]
    NoEdgeDefined(String),

    /// The current node is not part of the graph
    #[error("Node '{0}' not found")]
    UnknownNode(String),

    /// The loop-safety bound tripped
    #[error("Step budget of {limit} rounds exceeded")]
    StepBudgetExceeded { limit: u32 },

    /// The run was cancelled at an iteration boundary
    #[error("Run cancelled")]
    Cancelled,

    /// The task driving the run died before reporting an outcome
    #[error("Run aborted: {0}")]
    Aborted(String),
}

/// Errors reported by step functions
#[derive(Debug, Error)]
pub enum StepError {
    /// A field the step depends on is absent from state
    #[error("missing field '{0}'")]
    MissingField(String),

    /// The run input or a field has the wrong shape
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    /// Create an unknown step error
    pub fn unknown_step(name: impl Into<String>) -> Self {
        Self::UnknownStepName { name: name.into() }
    }

    /// Create an unknown predicate error
    pub fn unknown_predicate(name: impl Into<String>) -> Self {
        Self::UnknownPredicate { name: name.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error was caused by the caller's input rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnknownStepName { .. }
                | Self::UnknownPredicate { .. }
                | Self::Config(_)
                | Self::Json(_)
                | Self::Yaml(_)
        )
    }
}

impl StepError {
    /// Create a generic step failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self::Failed(s.to_string())
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self::Failed(s)
    }
}
