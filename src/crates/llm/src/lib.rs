//! Provider-agnostic chat-model client.
//!
//! This crate is intentionally small: the research orchestration engine only
//! needs to send messages and get text back, at one of two capability tiers
//! (`Quality` for planning/synthesis, `Fast` for triage/validation/strategy/
//! memory). Everything provider-specific — request shape, auth, retries on
//! the HTTP layer — lives behind [`ChatModel`].

pub mod error;
pub mod openai_compatible;
pub mod scripted;

use async_trait::async_trait;
pub use error::LlmError;
use serde::{Deserialize, Serialize};

/// Capability tier an agent asks for. The same logical model may map to
/// different concrete models (or the same one) per tier; that mapping is a
/// client concern, not a graph concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelTier {
    /// Used for planning and synthesis: favors quality over latency.
    Quality,
    /// Used for triage, validation, strategy refinement, memory summarization:
    /// favors latency.
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tier: ModelTier,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider to constrain output to a JSON object. Agents that
    /// rely on structured output (triage, planning, validation) set this;
    /// on providers that don't support it, the client degrades to a plain
    /// request and the caller's parser is expected to be lenient.
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn new(tier: ModelTier, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tier,
            temperature: 0.2,
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Usage,
}

/// Minimal provider-agnostic interface for text generation.
///
/// Implementations must be `Send + Sync` so a single client can be shared as
/// `Arc<dyn ChatModel>` across concurrently-running sub-queries.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for std::sync::Arc<T> {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        (**self).generate(request).await
    }
}
