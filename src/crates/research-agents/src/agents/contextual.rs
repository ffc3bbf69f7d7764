//! Contextual responder.
//!
//! Reached when Triage classifies a follow-up question as answerable from
//! `context_payload` alone, skipping a fresh planning/research cycle.

use super::Deps;
use crate::error::{ErrorKind, ErrorState, OriginStep};
use crate::state::{State, Step, StateUpdate, WorkflowStatus};
use llm::{ChatMessage, ChatRequest, ModelTier};

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    let prompt = format!(
        "Answer the follow-up question using only the conversation context \
         below; do not invent new facts beyond it. Cite sources inline as \
         [uid] where the context already names one.\n\
         Context: {}\nFollow-up question: {}",
        state.context_payload, state.user_query
    );
    let request = ChatRequest::new(ModelTier::Fast, vec![ChatMessage::user(prompt)]);

    match deps.llm.generate(request).await {
        Ok(response) => StateUpdate::default()
            .with_step(Step::Memory)
            .with_status(WorkflowStatus::Running)
            .with_final_answer(response.text)
            .with_confidence(0.6),
        Err(err) => StateUpdate::default().with_error(ErrorState::new(
            ErrorKind::Transient,
            format!("contextual responder failed: {err}"),
            OriginStep::Triage,
        )),
    }
}

trait ContextualUpdateExt {
    fn with_final_answer(self, answer: String) -> Self;
    fn with_confidence(self, confidence: f32) -> Self;
}

impl ContextualUpdateExt for StateUpdate {
    fn with_final_answer(mut self, answer: String) -> Self {
        self.final_answer = Some(answer);
        self
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
