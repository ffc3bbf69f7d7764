//! Memory Agent — summarizes the conversation's goals, established facts,
//! and unresolved questions after each turn and appends it to the session.

use super::Deps;
use crate::model::StructuredMemory;
use crate::state::{State, Step, StateUpdate, WorkflowStatus};
use llm::{ChatMessage, ChatRequest, ModelTier};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SummaryJson {
    #[serde(default)]
    user_goals: Vec<String>,
    #[serde(default)]
    key_facts: Vec<String>,
    #[serde(default)]
    unresolved_questions: Vec<String>,
}

/// 4 chars/token heuristic used throughout the corpus's token-budgeting
/// code; good enough to bound the summarization prompt without an actual
/// tokenizer dependency.
fn truncate_to_token_budget(text: &str, token_budget: usize) -> String {
    let char_budget = token_budget * 4;
    if text.len() <= char_budget {
        text.to_string()
    } else {
        text.chars().take(char_budget).collect()
    }
}

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    let answer = state.final_answer.clone().unwrap_or_default();
    let session = deps.memory.load(&state.session_id).await;

    let history_excerpt = truncate_to_token_budget(
        &session
            .history
            .turns
            .iter()
            .rev()
            .take(6)
            .rev()
            .map(|t| format!("User: {}\nAssistant: {}", t.user_query, t.assistant_answer))
            .collect::<Vec<_>>()
            .join("\n"),
        deps.config.memory_summary_token_budget,
    );

    let prompt = format!(
        "Summarize this conversation's ongoing goals, key established facts, \
         and unresolved questions.\n{history_excerpt}\n\
         New turn - User: {}\nAssistant: {answer}\n\
         Respond as JSON: {{\"user_goals\": [...], \"key_facts\": [...], \
         \"unresolved_questions\": [...]}}",
        state.user_query
    );
    let request = ChatRequest::new(ModelTier::Fast, vec![ChatMessage::user(prompt)]).with_json_mode();

    // Failure here is non-fatal: the turn still completes, we just skip
    // refreshing StructuredMemory and append the raw Turn.
    let structured_memory = match deps.llm.generate(request).await {
        Ok(response) => serde_json::from_str::<SummaryJson>(&response.text)
            .ok()
            .map(|parsed| StructuredMemory {
                user_goals: parsed.user_goals,
                key_facts: parsed.key_facts,
                unresolved_questions: parsed.unresolved_questions,
            }),
        Err(_) => None,
    };

    deps.memory
        .append(&state.session_id, state.user_query.clone(), answer, structured_memory)
        .await;

    StateUpdate::default()
        .with_step(Step::Finish)
        .with_status(WorkflowStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Deps;
    use crate::cache::AnswerCache;
    use crate::config::Config;
    use crate::memory::ConversationMemory;
    use crate::providers::fake::{FakeGraphStore, FakeWebSearch, NoopReranker};
    use llm::scripted::ScriptedModel;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn deps_with(model: ScriptedModel) -> Deps {
        Deps {
            llm: Arc::new(model),
            graph_store: Arc::new(FakeGraphStore::new()),
            web_search: Arc::new(FakeWebSearch::new(vec![])),
            reranker: Arc::new(NoopReranker),
            cache: AnswerCache::new(chrono::Duration::days(30), std::time::Duration::from_secs(5)),
            memory: ConversationMemory::new(),
            config: Arc::new(Config::default()),
            pending_build: Arc::new(Mutex::new(None)),
        }
    }

    #[tokio::test]
    async fn appends_turn_and_completes() {
        let mut state = State::new("What is Section 1607?".into(), "".into(), "s1".into(), 3);
        state.final_answer = Some("Section 1607 covers live loads.".into());
        let deps = deps_with(ScriptedModel::new(
            r#"{"user_goals":["understand live loads"],"key_facts":[],"unresolved_questions":[]}"#,
        ));
        let memory = deps.memory.clone();
        let update = run(state, deps).await;

        assert_eq!(update.workflow_status, Some(WorkflowStatus::Completed));
        let session = memory.load(&"s1".to_string()).await;
        assert_eq!(session.history.turns.len(), 1);
        assert_eq!(session.structured_memory.user_goals, vec!["understand live loads"]);
    }

    #[tokio::test]
    async fn summarization_failure_still_appends_turn() {
        let mut state = State::new("q".into(), "".into(), "s1".into(), 3);
        state.final_answer = Some("a".into());
        let deps = deps_with(ScriptedModel::new("not json"));
        let memory = deps.memory.clone();
        let update = run(state, deps).await;

        assert_eq!(update.workflow_status, Some(WorkflowStatus::Completed));
        let session = memory.load(&"s1".to_string()).await;
        assert_eq!(session.history.turns.len(), 1);
        assert!(session.structured_memory.user_goals.is_empty());
    }
}
