//! Validation Agent — scores how well a cached answer or a sub-query's
//! retrieved chunks address the question. Both call sites share the same
//! LLM-as-judge shape, so this module exposes two thin entry points over
//! one scorer.

use super::Deps;
use crate::model::{RetrievedChunk, ValidationResult};
use llm::{ChatMessage, ChatRequest, ModelTier};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScoreJson {
    score: u8,
    reasoning: String,
}

async fn score(deps: &Deps, instruction: &str) -> ValidationResult {
    let request = ChatRequest::new(ModelTier::Fast, vec![ChatMessage::user(instruction.to_string())])
        .with_json_mode();
    match deps.llm.generate(request).await {
        Ok(response) => match serde_json::from_str::<ScoreJson>(&response.text) {
            Ok(parsed) => ValidationResult {
                score: parsed.score.min(10),
                reasoning: parsed.reasoning,
            },
            Err(_) => ValidationResult::neutral("validator returned non-JSON"),
        },
        Err(_) => ValidationResult::neutral("validator call failed"),
    }
}

/// Revalidates a cached answer against the current (possibly rephrased)
/// question. Threshold is `config.validation_threshold_cache` (7).
pub async fn validate(deps: &Deps, query: &str, cached_answer: &str) -> ValidationResult {
    let instruction = format!(
        "Rate 0-10 how well this cached answer still addresses the question. \
         Question: {query}\nCached answer: {cached_answer}\n\
         Respond as JSON: {{\"score\": 0-10, \"reasoning\": \"...\"}}"
    );
    score(deps, &instruction).await
}

/// Scores whether retrieved chunks actually support a sub-query. Threshold
/// is `config.validation_threshold_subquery` (6); a score below it triggers
/// the fallback chain in the research orchestrator.
pub async fn validate_subquery(deps: &Deps, sub_query: &str, chunks: &[RetrievedChunk]) -> ValidationResult {
    if chunks.is_empty() {
        return ValidationResult {
            score: 0,
            reasoning: "no chunks retrieved".to_string(),
        };
    }
    let excerpt = chunks
        .iter()
        .take(5)
        .map(|c| format!("- [{}] {}", c.uid, c.text.chars().take(240).collect::<String>()))
        .collect::<Vec<_>>()
        .join("\n");
    let instruction = format!(
        "Rate 0-10 how well these retrieved passages answer the sub-question. \
         Sub-question: {sub_query}\nPassages:\n{excerpt}\n\
         Respond as JSON: {{\"score\": 0-10, \"reasoning\": \"...\"}}"
    );
    score(deps, &instruction).await
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn parses_valid_score_json() {
        let deps = deps_with(ScriptedModel::new(r#"{"score": 8, "reasoning": "solid match"}"#));
        let result = validate(&deps, "q", "a").await;
        assert_eq!(result.score, 8);
    }

    #[tokio::test]
    async fn non_json_response_falls_back_to_neutral() {
        let deps = deps_with(ScriptedModel::new("garbage"));
        let result = validate(&deps, "q", "a").await;
        assert_eq!(result.score, 5);
    }

    #[tokio::test]
    async fn empty_chunks_score_zero_without_llm_call() {
        let deps = deps_with(ScriptedModel::new(r#"{"score": 9, "reasoning": "n/a"}"#));
        let result = validate_subquery(&deps, "sub", &[]).await;
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn out_of_range_score_is_clamped() {
        let deps = deps_with(ScriptedModel::new(r#"{"score": 250, "reasoning": "way above scale"}"#));
        let result = validate(&deps, "q", "a").await;
        assert_eq!(result.score, 10);
    }
}
