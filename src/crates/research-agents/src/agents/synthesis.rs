//! Synthesis Agent — composes the final answer from the research results
//! and derives a confidence score for it.

use super::Deps;
use crate::error::{ErrorKind, ErrorState, OriginStep};
use crate::model::{Citation, SubQuery, SubQueryStatus};
use crate::state::{State, Step, StateUpdate, WorkflowStatus};
use llm::{ChatMessage, ChatRequest, ModelTier};
use std::collections::HashSet;

fn citations_from(sub_queries: &[SubQuery]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    sub_queries
        .iter()
        .filter(|sq| sq.status == SubQueryStatus::Ok)
        .flat_map(|sq| sq.result.iter().flatten())
        .filter(|chunk| seen.insert(chunk.uid.clone()))
        .map(|chunk| Citation {
            source_tag: chunk.source_tag,
            uid: chunk.uid.clone(),
            title: chunk.title.clone(),
        })
        .collect()
}

/// Cheap proxy for answer quality: rewards source diversity, length, and the
/// presence of inline citation markers, rather than a second LLM judging call.
fn confidence(answer: &str, citations: &[Citation]) -> f32 {
    let mut score = 0.5_f32;
    let distinct_sources: HashSet<&str> = citations.iter().map(|c| c.uid.as_str()).collect();
    if distinct_sources.len() >= 3 {
        score += 0.2;
    }
    if answer.split_whitespace().count() >= 100 {
        score += 0.15;
    }
    if answer.contains('[') && answer.contains(']') {
        score += 0.15;
    }
    score.min(1.0)
}

fn research_context(sub_queries: &[SubQuery]) -> String {
    sub_queries
        .iter()
        .enumerate()
        .map(|(i, sq)| {
            let chunks = sq
                .result
                .iter()
                .flatten()
                .map(|c| format!("  [{}] {}", c.uid, c.text))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}. {} ({:?})\n{}", i + 1, sq.text, sq.status, chunks)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub async fn run(state: State, deps: Deps) -> StateUpdate {
    let Some(plan) = state.plan.clone() else {
        return StateUpdate::default().with_error(ErrorState::new(
            ErrorKind::Transient,
            "synthesis reached with no plan",
            OriginStep::Synthesis,
        ));
    };
    let sub_queries = state.sub_query_answers.clone().unwrap_or(plan.sub_queries);

    let prompt = format!(
        "Compose the final answer to the user's question from the research \
         below. Lead with the direct conclusion, then supporting details, then \
         calculations if relevant. Cite sources inline as [uid]. If information \
         is missing, label it explicitly rather than inventing it.\n\
         Question: {}\n\nResearch:\n{}",
        state.user_query,
        research_context(&sub_queries)
    );
    let request = ChatRequest::new(ModelTier::Quality, vec![ChatMessage::user(prompt)]);

    let answer = match deps.llm.generate(request).await {
        Ok(response) => response.text,
        Err(err) => {
            return StateUpdate::default().with_error(ErrorState::new(
                ErrorKind::Transient,
                format!("synthesis LLM call failed: {err}"),
                OriginStep::Synthesis,
            ));
        }
    };

    let citations = citations_from(&sub_queries);
    let confidence = confidence(&answer, &citations);

    StateUpdate::default()
        .with_step(Step::Memory)
        .with_status(WorkflowStatus::Running)
        .with_final_answer(answer)
        .with_citations(citations)
        .with_confidence(confidence)
}

trait SynthesisUpdateExt {
    fn with_final_answer(self, answer: String) -> Self;
    fn with_citations(self, citations: Vec<Citation>) -> Self;
    fn with_confidence(self, confidence: f32) -> Self;
}

impl SynthesisUpdateExt for StateUpdate {
    fn with_final_answer(mut self, answer: String) -> Self {
        self.final_answer = Some(answer);
        self
    }

    fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = Some(citations);
        self
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
