//! HyDE Agent — optional stage between Planning and Research Orchestrator
//! that generates a hypothetical passage for each sub-query to embed
//! against, instead of the raw question text.

use super::Deps;
use crate::state::{State, Step, StateUpdate};
use llm::{ChatMessage, ChatRequest, ModelTier};
use once_cell::sync::Lazy;
use regex::Regex;

static ENTITY_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(section|table|equation|figure)\s+[\d.\-]+$").unwrap());

fn has_confident_entity_hint(hint: &Option<String>) -> bool {
    hint.as_deref().is_some_and(|h| ENTITY_HINT.is_match(h.trim()))
}

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    let Some(mut plan) = state.plan.clone() else {
        // Planning always attaches a plan before routing here; nothing to do
        // otherwise.
        return StateUpdate::default().with_step(Step::Research);
    };

    for sub_query in plan.sub_queries.iter_mut() {
        if has_confident_entity_hint(&sub_query.hint) {
            continue;
        }
        let prompt = format!(
            "Write a short hypothetical passage, in the style of a building code \
             section, that would answer this question. Do not label it or add \
             commentary, just the passage text.\nQuestion: {}",
            sub_query.text
        );
        let request = ChatRequest::new(ModelTier::Fast, vec![ChatMessage::user(prompt)]);
        if let Ok(response) = deps.llm.generate(request).await {
            sub_query.hyde_document = Some(response.text);
        }
        // On LLM failure `hyde_document` stays `None`; the orchestrator
        // falls back to embedding the raw sub-query text instead.
    }

    StateUpdate::default().with_step(Step::Research).with_plan(plan)
}

trait HydeUpdateExt {
    fn with_plan(self, plan: crate::model::ResearchPlan) -> Self;
}

impl HydeUpdateExt for StateUpdate {
    fn with_plan(mut self, plan: crate::model::ResearchPlan) -> Self {
        self.plan = Some(plan);
        self
    }
}
