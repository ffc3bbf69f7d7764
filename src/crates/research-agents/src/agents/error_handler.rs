//! Error Handler. The only node that decides retry vs. terminate; every
//! other agent just classifies a failure into [`crate::error::ErrorState`].

use super::Deps;
use crate::error::OriginStep;
use crate::model::{PlanClassification, PlanMode, ResearchPlan, SubQuery};
use crate::state::{State, Step, StateUpdate, WorkflowStatus};

fn origin_to_step(origin: OriginStep) -> Step {
    match origin {
        OriginStep::Triage => Step::Triage,
        OriginStep::Planning => Step::Planning,
        OriginStep::Hyde => Step::Hyde,
        OriginStep::Research => Step::Research,
        OriginStep::Synthesis => Step::Synthesis,
        OriginStep::Memory => Step::Memory,
    }
}

fn user_facing_failure_message(kind: crate::error::ErrorKind) -> String {
    use crate::error::ErrorKind::*;
    match kind {
        Timeout | Connection | RateLimit | Transient => {
            "A temporary provider issue interrupted this request. Please try again.".to_string()
        }
        Parse => "We had trouble interpreting a provider response. Please try again.".to_string(),
        ProviderUnavailable => {
            "A required service is currently unavailable. Please try again later.".to_string()
        }
        RetrievalExhausted => {
            "We could not find enough supporting material to answer confidently.".to_string()
        }
        Cancelled => "The request was cancelled.".to_string(),
    }
}

pub async fn run(state: State, _deps: Deps) -> StateUpdate {
    let Some(error) = state.error_state.clone() else {
        // Defensive: the engine only routes here when `error_state` is set.
        return StateUpdate::default().with_step(Step::Finish).with_status(WorkflowStatus::Completed);
    };

    if error.recoverable && state.retry_count < state.max_retries {
        return StateUpdate::default()
            .clear_error()
            .with_step(origin_to_step(error.origin_step))
            .with_status(WorkflowStatus::Retry)
            .with_retry_count(state.retry_count + 1);
    }

    // Retry budget exhausted (or never recoverable): either degrade or
    // terminate, depending on which step raised the error.
    match error.origin_step {
        OriginStep::Planning => {
            let plan = ResearchPlan {
                sub_queries: vec![SubQuery::new(state.user_query.clone(), None)],
                mode: PlanMode::Strategist,
                classification: PlanClassification::Engage,
            };
            StateUpdate::default()
                .clear_error()
                .with_step(Step::Hyde)
                .with_status(WorkflowStatus::Retry)
                .with_plan(plan)
        }
        OriginStep::Research => {
            let answer = format!(
                "We were unable to retrieve enough supporting material to fully \
                 answer \"{}\". This response may be incomplete.",
                state.user_query
            );
            StateUpdate::default()
                .clear_error()
                .with_step(Step::Finish)
                .with_status(WorkflowStatus::Completed)
                .with_final_answer(answer)
                .with_confidence(0.3)
        }
        OriginStep::Synthesis => {
            let summaries = state
                .sub_query_answers
                .as_ref()
                .map(|subs| {
                    subs.iter()
                        .filter_map(|sq| sq.result.as_ref())
                        .flatten()
                        .map(|chunk| format!("- [{}] {}", chunk.uid, chunk.text))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            let answer = format!(
                "Synthesis could not complete; here is the raw supporting material \
                 found so far (unverified, no narrative synthesis applied):\n{summaries}"
            );
            StateUpdate::default()
                .clear_error()
                .with_step(Step::Finish)
                .with_status(WorkflowStatus::Completed)
                .with_final_answer(answer)
                .with_confidence(0.3)
        }
        OriginStep::Triage | OriginStep::Hyde | OriginStep::Memory => StateUpdate::default()
            .clear_error()
            .with_step(Step::Finish)
            .with_status(WorkflowStatus::Failed)
            .with_final_answer(user_facing_failure_message(error.kind)),
    }
}

trait ErrorHandlerUpdateExt {
    fn with_retry_count(self, retry_count: u32) -> Self;
    fn with_plan(self, plan: ResearchPlan) -> Self;
    fn with_final_answer(self, answer: String) -> Self;
    fn with_confidence(self, confidence: f32) -> Self;
}

impl ErrorHandlerUpdateExt for StateUpdate {
    fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    fn with_plan(mut self, plan: ResearchPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    fn with_final_answer(mut self, answer: String) -> Self {
        self.final_answer = Some(answer);
        self
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
