//! Error types for graph construction and execution.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or driving a [`crate::graph::Graph`].
///
/// Node executors are expected to catch their own failures and express them
/// as state rather than raising to the engine. `GraphError` exists for the
/// engine's own bookkeeping: a malformed graph, a missing routing target, or
/// a node executor that panicked or returned `Err` despite the convention
/// above.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph validation failed: {0}")]
    Validation(String),

    #[error("node '{node}' is not registered")]
    UnknownNode { node: String },

    #[error("node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("conditional edge at '{node}' routed to unregistered branch '{branch}'")]
    UnknownBranch { node: String, branch: String },

    #[error("execution exceeded {0} steps without reaching a terminal node")]
    StepBudgetExceeded(usize),

    #[error("graph execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("graph execution cancelled")]
    Cancelled,
}
