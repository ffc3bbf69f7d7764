//! Error types for chat-model calls.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to provider timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("response could not be parsed as the expected shape: {0}")]
    Parse(String),

    #[error("provider rejected the request: {0}")]
    RateLimited(String),
}

impl LlmError {
    /// Whether retrying the same request is likely to help. Mirrors the
    /// transient/non-recoverable split the orchestrator's error handler uses.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout | LlmError::Transport(_) | LlmError::RateLimited(_)
        )
    }
}
