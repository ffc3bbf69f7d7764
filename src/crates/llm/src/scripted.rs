//! A deterministic `ChatModel` for tests.
//!
//! Responses are matched against the last user message by substring, falling
//! back to a default. This keeps end-to-end tests free of network calls and
//! non-determinism while still exercising the parsing code paths in each
//! agent.

use crate::{ChatModel, ChatRequest, ChatResponse, LlmError, Usage};
use async_trait::async_trait;
use std::sync::Mutex;

pub struct ScriptedModel {
    rules: Vec<(String, String)>,
    default: String,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: default.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Respond with `response` whenever the latest user message contains
    /// `trigger`. Rules are checked in insertion order; first match wins.
    pub fn on(mut self, trigger: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((trigger.into(), response.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let text = self
            .rules
            .iter()
            .find(|(trigger, _)| last_user.contains(trigger.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default.clone());

        self.calls.lock().unwrap().push(request);

        Ok(ChatResponse {
            text,
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatMessage, ChatRequest, ModelTier};

    #[tokio::test]
    async fn matches_first_rule_in_order() {
        let model = ScriptedModel::new("{}")
            .on("Section 1607", r#"{"class":"direct_retrieval"}"#)
            .on("Section", r#"{"class":"engage"}"#);

        let response = model
            .generate(ChatRequest::new(
                ModelTier::Fast,
                vec![ChatMessage::user("Tell me about Section 1607 loads")],
            ))
            .await
            .unwrap();

        assert_eq!(response.text, r#"{"class":"direct_retrieval"}"#);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_default() {
        let model = ScriptedModel::new("fallback");
        let response = model
            .generate(ChatRequest::new(
                ModelTier::Fast,
                vec![ChatMessage::user("anything")],
            ))
            .await
            .unwrap();
        assert_eq!(response.text, "fallback");
    }
}
