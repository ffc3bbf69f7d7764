//! Triage Agent — the first node on every turn: rejects empty queries,
//! revalidates a cache hit, takes the direct-retrieval fast path for an
//! explicit section/table/figure reference, or classifies the question via
//! the LLM and routes to Contextual, Research, Planning, or a terminal
//! finish.

use super::Deps;
use crate::cache::Lookup;
use crate::error::{ErrorState, OriginStep};
use crate::fingerprint;
use crate::state::{State, Step, TriageClass, WorkflowStatus};
use crate::state::StateUpdate;
use llm::{ChatMessage, ChatRequest, ModelTier};
use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::Deserialize;

/// Common direct-retrieval phrasings, covering the purely-referential entity
/// kinds the corpus exposes. Equation references are deliberately excluded:
/// a question naming an equation is usually a calculation request, which
/// Planning's specialist mode needs to see rather than have
/// short-circuited here.
static FAST_PATH_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)section\s+\d+(\.\d+)*",
        r"(?i)table\s+\d+(\.\d+)*",
        r"(?i)figure\s+\d+(\.\d+)*",
    ])
    .expect("fast-path patterns are valid")
});

static ENTITY_EXTRACT: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"(?i)(section|table|figure)\s+([\d.\-]+)").unwrap()
});

#[derive(Debug, Deserialize)]
struct TriageJson {
    class: String,
    #[allow(dead_code)]
    confidence: f32,
    reason: Option<String>,
}

fn parse_class(label: &str) -> TriageClass {
    match label {
        "simple" => TriageClass::Simple,
        "contextual" => TriageClass::Contextual,
        "direct_retrieval" => TriageClass::DirectRetrieval,
        "clarify" => TriageClass::Clarify,
        "reject" => TriageClass::Reject,
        _ => TriageClass::Engage,
    }
}

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    if state.user_query.trim().is_empty() {
        return StateUpdate::default()
            .with_step(Step::Finish)
            .with_status(WorkflowStatus::Completed)
            .with_final_answer_reject();
    }

    let fp = fingerprint::fingerprint(&state.user_query);
    match deps.cache.acquire(&fp).await {
        Lookup::Hit(entry) => {
            let validation = super::validation::validate(&deps, &state.user_query, &entry.answer).await;
            if validation.score >= deps.config.validation_threshold_cache {
                deps.cache.record_reuse(&fp).await;
                return StateUpdate::default()
                    .with_step(Step::Finish)
                    .with_status(WorkflowStatus::Completed)
                    .with_triage_class(TriageClass::Simple)
                    .with_triage_reason("cache hit, revalidated")
                    .with_cache_answer(entry.answer, entry.citations, entry.confidence, fp);
            }
            // Stale hit: fall through to a fresh turn. We intentionally do
            // not register a build permit here (see agents::finalize_cache);
            // a second admission just overwrites the stale entry.
            classify(state, deps, Some(fp)).await
        }
        Lookup::Miss(permit) => {
            *deps.pending_build.lock().await = Some(permit);
            classify(state, deps, Some(fp)).await
        }
    }
}

async fn classify(state: State, deps: Deps, fp: Option<String>) -> StateUpdate {
    if let Some(captures) = ENTITY_EXTRACT.captures(&state.user_query) {
        if FAST_PATH_PATTERNS.is_match(&state.user_query) {
            let entity = captures.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
            return StateUpdate::default()
                .with_step(Step::Research)
                .with_triage_class(TriageClass::DirectRetrieval)
                .with_triage_reason(format!("fast-path match: {entity}"))
                .with_fingerprint(fp);
        }
    }

    let prompt = format!(
        "Classify this question into exactly one of: simple, contextual, direct_retrieval, engage, clarify, reject.\n\
         Conversation context: {}\n\
         Question: {}\n\
         Respond as JSON: {{\"class\": \"...\", \"confidence\": 0.0-1.0, \"reason\": \"...\"}}",
        state.context_payload, state.user_query
    );
    let request = ChatRequest::new(ModelTier::Fast, vec![ChatMessage::user(prompt)]).with_json_mode();

    let (class, reason) = match deps.llm.generate(request).await {
        Ok(response) => match serde_json::from_str::<TriageJson>(&response.text) {
            Ok(parsed) => (parse_class(&parsed.class), parsed.reason.unwrap_or_default()),
            Err(_) => (TriageClass::Engage, "LLM returned non-JSON, defaulting".to_string()),
        },
        Err(_) => (TriageClass::Engage, "LLM call failed, defaulting".to_string()),
    };

    let next_step = match class {
        TriageClass::Contextual => Step::Contextual,
        TriageClass::DirectRetrieval => Step::Research,
        TriageClass::Clarify | TriageClass::Reject => Step::Finish,
        TriageClass::Simple | TriageClass::Engage => Step::Planning,
    };

    let mut update = StateUpdate::default()
        .with_step(next_step)
        .with_triage_class(class)
        .with_triage_reason(reason)
        .with_fingerprint(fp);

    if matches!(class, TriageClass::Reject) {
        update = update
            .with_status(WorkflowStatus::Completed)
            .with_final_answer_value(
                "I can only help with questions about the building-code corpus.".to_string(),
            );
    } else if matches!(class, TriageClass::Clarify) {
        update = update.with_status(WorkflowStatus::Completed).with_final_answer_value(
            "Could you clarify which section, table, or topic you're asking about?".to_string(),
        );
    }

    update
}

/// Degraded terminal error routed by `ErrorHandler` if `retry_count` is
/// already exhausted when Triage itself can't proceed (defensive: in
/// practice Triage never sets `error_state` directly).
#[allow(dead_code)]
pub fn timeout_error_state() -> ErrorState {
    ErrorState::new(crate::error::ErrorKind::Timeout, "triage timed out", OriginStep::Triage)
}

// Small builder extensions kept local to this module's needs; StateUpdate's
// core with_* live in `state.rs`, these compose the triage-specific cases.
trait TriageUpdateExt {
    fn with_triage_class(self, class: TriageClass) -> Self;
    fn with_triage_reason(self, reason: impl Into<String>) -> Self;
    fn with_fingerprint(self, fp: Option<String>) -> Self;
    fn with_final_answer_value(self, answer: String) -> Self;
    fn with_final_answer_reject(self) -> Self;
    fn with_cache_answer(
        self,
        answer: String,
        citations: Vec<crate::model::Citation>,
        confidence: f32,
        fp: String,
    ) -> Self;
}

impl TriageUpdateExt for StateUpdate {
    fn with_triage_class(mut self, class: TriageClass) -> Self {
        self.triage_class = Some(class);
        self
    }

    fn with_triage_reason(mut self, reason: impl Into<String>) -> Self {
        self.triage_reason = Some(reason.into());
        self
    }

    fn with_fingerprint(mut self, fp: Option<String>) -> Self {
        self.cache_fingerprint = fp;
        self
    }

    fn with_final_answer_value(mut self, answer: String) -> Self {
        self.final_answer = Some(answer);
        self.confidence = Some(1.0);
        self
    }

    fn with_final_answer_reject(self) -> Self {
        self.with_triage_class(TriageClass::Reject)
            .with_triage_reason("empty query")
            .with_final_answer_value("Please ask a question about the building-code corpus.".to_string())
    }

    fn with_cache_answer(
        mut self,
        answer: String,
        citations: Vec<crate::model::Citation>,
        confidence: f32,
        fp: String,
    ) -> Self {
        self.final_answer = Some(answer);
        self.citations = Some(citations);
        self.confidence = Some(confidence);
        self.served_from_cache = Some(true);
        self.cache_fingerprint = Some(fp);
        self
    }
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
    async fn empty_query_rejects_without_retrieval() {
        let state = State::new("".into(), "".into(), "s1".into(), 3);
        let deps = deps_with(ScriptedModel::new("{}"));
        let update = run(state, deps).await;
        assert_eq!(update.triage_class, Some(TriageClass::Reject));
        assert_eq!(update.current_step, Some(Step::Finish));
    }

    #[tokio::test]
    async fn fast_path_matches_direct_retrieval_phrasing() {
        let state = State::new("Show me Table 1607.9.1".into(), "".into(), "s1".into(), 3);
        let deps = deps_with(ScriptedModel::new("{}"));
        let update = run(state, deps).await;
        assert_eq!(update.triage_class, Some(TriageClass::DirectRetrieval));
        assert_eq!(update.current_step, Some(Step::Research));
    }

    #[tokio::test]
    async fn llm_parse_failure_defaults_to_engage() {
        let state = State::new("Tell me something".into(), "".into(), "s1".into(), 3);
        let deps = deps_with(ScriptedModel::new("not json"));
        let update = run(state, deps).await;
        assert_eq!(update.triage_class, Some(TriageClass::Engage));
        assert_eq!(update.current_step, Some(Step::Planning));
    }

    #[tokio::test]
    async fn rejection_query_gets_canned_terminal_message() {
        let state = State::new("Best chocolate chip cookie recipe?".into(), "".into(), "s1".into(), 3);
        let deps = deps_with(ScriptedModel::new(
            r#"{"class": "reject", "confidence": 0.9, "reason": "off-topic"}"#,
        ));
        let update = run(state, deps).await;
        assert_eq!(update.triage_class, Some(TriageClass::Reject));
        assert_eq!(update.workflow_status, Some(WorkflowStatus::Completed));
        assert!(update.final_answer.is_some());
    }
}
