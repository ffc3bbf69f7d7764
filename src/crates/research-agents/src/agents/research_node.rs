//! Research Orchestrator node wrapper — bridges the workflow engine's
//! `(State, Deps) -> StateUpdate` node shape to [`crate::research::run`].

use super::Deps;
use crate::error::{ErrorKind, ErrorState, OriginStep};
use crate::model::{PlanClassification, PlanMode, ResearchPlan, SubQuery};
use crate::research::Outcome;
use crate::state::{State, Step, StateUpdate};
use once_cell::sync::Lazy;
use regex::Regex;

static ENTITY_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(section|table|equation|figure)\s+[\d.\-]+").unwrap());

/// Triage's direct-retrieval fast path routes straight here without a
/// Planning stage, so there is no `state.plan` yet; synthesize the minimal
/// one-SubQuery plan the orchestrator needs.
fn plan_or_direct_fallback(state: &State) -> ResearchPlan {
    if let Some(plan) = state.plan.clone() {
        return plan;
    }
    let hint = ENTITY_HINT.find(&state.user_query).map(|m| m.as_str().to_string());
    ResearchPlan {
        sub_queries: vec![SubQuery::new(state.user_query.clone(), hint)],
        mode: PlanMode::Strategist,
        classification: PlanClassification::DirectRetrieval,
    }
}

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    let plan = plan_or_direct_fallback(&state);

    match crate::research::run(&deps, plan.sub_queries).await {
        Outcome::Settled(sub_queries, _metrics) => StateUpdate::default()
            .with_step(Step::Synthesis)
            .with_sub_query_answers(sub_queries),
        Outcome::Exhausted(sub_queries) => StateUpdate::default()
            .with_sub_query_answers(sub_queries)
            .with_error(ErrorState::new(
                ErrorKind::RetrievalExhausted,
                "no sub-query reached the validation threshold",
                OriginStep::Research,
            )),
    }
}

trait ResearchUpdateExt {
    fn with_sub_query_answers(self, sub_queries: Vec<SubQuery>) -> Self;
}

impl ResearchUpdateExt for StateUpdate {
    fn with_sub_query_answers(mut self, sub_queries: Vec<SubQuery>) -> Self {
        self.sub_query_answers = Some(sub_queries);
        self
    }
}
