//! Error taxonomy for the workflow.
//!
//! Agents never raise: they classify a failure into an [`ErrorKind`] and
//! return it as part of their [`crate::state::StateUpdate`]. The engine's
//! [`langgraph_core::RouteOverride`] impl on [`crate::state::State`] sends
//! any state carrying an `error_state` to the `error` node, where
//! [`crate::agents::error_handler`] decides whether to retry or terminate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which node's step the error originated from, so `ErrorHandler` knows
/// where to re-route a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginStep {
    Triage,
    Planning,
    Hyde,
    Research,
    Synthesis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    #[error("operation timed out")]
    Timeout,
    #[error("connection to a provider failed")]
    Connection,
    #[error("provider rate-limited the request")]
    RateLimit,
    #[error("a transient failure occurred")]
    Transient,
    #[error("a provider response could not be parsed")]
    Parse,
    #[error("a required provider is unavailable (auth/config)")]
    ProviderUnavailable,
    #[error("no sub-query reached the validation threshold")]
    RetrievalExhausted,
    #[error("the turn was cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Transient I/O and parse errors are recoverable (retry or default);
    /// provider/auth failures are not; retrieval exhaustion gets exactly one
    /// recovery attempt, which the error handler tracks via `retry_count`
    /// like any other recoverable kind.
    pub fn recoverable(self) -> bool {
        !matches!(
            self,
            ErrorKind::ProviderUnavailable | ErrorKind::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorState {
    pub kind: ErrorKind,
    pub message: String,
    pub origin_step: OriginStep,
    pub recoverable: bool,
}

impl ErrorState {
    pub fn new(kind: ErrorKind, message: impl Into<String>, origin_step: OriginStep) -> Self {
        Self {
            recoverable: kind.recoverable(),
            kind,
            message: message.into(),
            origin_step,
        }
    }
}

/// Non-fatal error surface returned by individual agent functions before
/// they are folded into a [`crate::state::StateUpdate`]. Distinct from
/// [`ErrorState`], which lives in `State` and drives workflow routing.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm call failed: {0}")]
    Llm(#[from] llm::LlmError),
    #[error("provider call failed: {0}")]
    Provider(String),
    #[error("{0}")]
    Other(String),
}
