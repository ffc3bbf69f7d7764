//! Planning Agent — decomposes an engaged question into a research plan,
//! choosing strategist mode for broad questions and specialist mode for
//! calculation-shaped ones.

use super::Deps;
use crate::error::{ErrorKind, ErrorState, OriginStep};
use crate::model::{PlanClassification, PlanMode, ResearchPlan, SubQuery};
use crate::state::{State, Step, StateUpdate};
use llm::{ChatMessage, ChatRequest, ModelTier};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

const CALCULATION_KEYWORDS: &[&str] = &[
    "calculate",
    "compute",
    "determine the required",
    "what is the reduced",
];

static NUMERIC_WITH_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+(\.\d+)?\s*(psf|sq\s*ft|ft|in|lb|kip)").unwrap());

fn is_calculation_intent(query: &str) -> bool {
    let lower = query.to_lowercase();
    CALCULATION_KEYWORDS.iter().any(|kw| lower.contains(kw)) || NUMERIC_WITH_UNIT.is_match(query)
}

#[derive(Debug, Deserialize)]
struct PlanStepJson {
    sub_query: String,
    hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanJson {
    #[allow(dead_code)]
    reasoning: String,
    plan: Vec<PlanStepJson>,
    classification: Option<String>,
    message: Option<String>,
}

fn parse_classification(label: Option<&str>) -> PlanClassification {
    match label {
        Some("clarify") => PlanClassification::Clarify,
        Some("reject") => PlanClassification::Reject,
        Some("direct_retrieval") => PlanClassification::DirectRetrieval,
        _ => PlanClassification::Engage,
    }
}

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    let mode = if is_calculation_intent(&state.user_query) {
        PlanMode::Specialist
    } else {
        PlanMode::Strategist
    };

    let step_guidance = match mode {
        PlanMode::Specialist => {
            "Produce 6-8 granular steps: locate the governing formula, define each \
             variable, extract given values from the question, look up any required \
             tables, perform the computation, and validate the result against code limits."
        }
        PlanMode::Strategist => {
            "Produce 2-4 consolidated steps spanning the relevant chapters or themes."
        }
    };

    let prompt = format!(
        "Decompose this question into a research plan.\n\
         Conversation context: {}\n\
         Question: {}\n\
         {step_guidance}\n\
         If the question cannot be answered from a building-code corpus, set \
         classification to \"reject\" or \"clarify\" and include a user-facing \
         \"message\", leaving \"plan\" empty.\n\
         Respond as JSON: {{\"reasoning\": \"...\", \"classification\": \"engage\", \
         \"plan\": [{{\"sub_query\": \"...\", \"hint\": \"...\"}}]}}",
        state.context_payload, state.user_query
    );
    let request = ChatRequest::new(ModelTier::Quality, vec![ChatMessage::user(prompt)]).with_json_mode();

    let parsed = match deps.llm.generate(request).await {
        Ok(response) => serde_json::from_str::<PlanJson>(&response.text).ok(),
        Err(_) => None,
    };

    let Some(parsed) = parsed else {
        // Parse/LLM failure: fall back to a single-step plan and log a
        // warning. The warning lives in the `ExecutionLogEntry` the
        // `run_node` wrapper always attaches.
        let plan = ResearchPlan {
            sub_queries: vec![SubQuery::new(state.user_query.clone(), None)],
            mode,
            classification: PlanClassification::Engage,
        };
        return StateUpdate::default().with_step(Step::Hyde).with_plan(plan);
    };

    let classification = parse_classification(parsed.classification.as_deref());
    if matches!(classification, PlanClassification::Clarify | PlanClassification::Reject) {
        return StateUpdate::default()
            .with_step(Step::Finish)
            .with_status(crate::state::WorkflowStatus::Completed)
            .with_final_answer(
                parsed
                    .message
                    .unwrap_or_else(|| "Could you clarify your question?".to_string()),
            );
    }

    if parsed.plan.is_empty() {
        return StateUpdate::default().with_error(ErrorState::new(
            ErrorKind::Parse,
            "planning produced an empty plan",
            OriginStep::Planning,
        ));
    }

    let sub_queries = parsed
        .plan
        .into_iter()
        .map(|step| SubQuery::new(step.sub_query, step.hint))
        .collect();

    let plan = ResearchPlan {
        sub_queries,
        mode,
        classification,
    };

    StateUpdate::default().with_step(Step::Hyde).with_plan(plan)
}

trait PlanningUpdateExt {
    fn with_plan(self, plan: ResearchPlan) -> Self;
    fn with_final_answer(self, answer: String) -> Self;
}

impl PlanningUpdateExt for StateUpdate {
    fn with_plan(mut self, plan: ResearchPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    fn with_final_answer(mut self, answer: String) -> Self {
        self.final_answer = Some(answer);
        self.confidence = Some(1.0);
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

    #[test]
    fn calculation_intent_detects_keyword() {
        assert!(is_calculation_intent("Calculate the required beam depth"));
    }

    #[test]
    fn calculation_intent_detects_numeric_unit() {
        assert!(is_calculation_intent("tributary area 500 sq ft, L0=50 psf"));
    }

    #[test]
    fn calculation_intent_false_for_plain_question() {
        assert!(!is_calculation_intent("What is Section 1607 about?"));
    }

    #[tokio::test]
    async fn calculation_query_selects_specialist_mode_with_many_steps() {
        let json = r#"{"reasoning":"r","classification":"engage","plan":[
            {"sub_query":"locate formula"},{"sub_query":"define variables"},
            {"sub_query":"extract values"},{"sub_query":"lookup KLL table"},
            {"sub_query":"compute result"},{"sub_query":"validate against limits"}
        ]}"#;
        let state = State::new(
            "Calculate the reduced live load for tributary area 500 sq ft, L0=50 psf, using Equation 16-7"
                .into(),
            "".into(),
            "s1".into(),
            3,
        );
        let update = run(state, deps_with(ScriptedModel::new(json))).await;
        let plan = update.plan.expect("plan expected");
        assert_eq!(plan.mode, PlanMode::Specialist);
        assert!(plan.sub_queries.len() >= 5);
    }

    #[tokio::test]
    async fn parse_failure_falls_back_to_single_step_plan() {
        let state = State::new("What is Section 1607 about?".into(), "".into(), "s1".into(), 3);
        let update = run(state, deps_with(ScriptedModel::new("not json"))).await;
        let plan = update.plan.expect("fallback plan expected");
        assert_eq!(plan.sub_queries.len(), 1);
    }

    #[tokio::test]
    async fn empty_plan_is_an_error() {
        let json = r#"{"reasoning":"r","classification":"engage","plan":[]}"#;
        let state = State::new("What is Section 1607 about?".into(), "".into(), "s1".into(), 3);
        let update = run(state, deps_with(ScriptedModel::new(json))).await;
        assert!(update.error_state.is_some());
    }

    #[tokio::test]
    async fn reject_classification_short_circuits_to_finish() {
        let json = r#"{"reasoning":"r","classification":"reject","plan":[],"message":"not a code question"}"#;
        let state = State::new("Best cookie recipe?".into(), "".into(), "s1".into(), 3);
        let update = run(state, deps_with(ScriptedModel::new(json))).await;
        assert_eq!(update.current_step, Some(Step::Finish));
        assert!(update.final_answer.is_some());
    }
}
