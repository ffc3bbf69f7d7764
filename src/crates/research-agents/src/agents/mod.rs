//! Agent nodes.
//!
//! Each agent is a pure-ish async function `(State, Deps) -> StateUpdate`.
//! They never raise to the workflow engine: a failed LLM call or provider
//! call is caught locally and turned into `error_state` on the returned
//! update. [`run_node`] is a thin instrumentation wrapper built on the
//! teacher's `tooling::logging::timed` helper: it times the call, computes
//! input/output digests, and appends one `ExecutionLogEntry`.

pub mod contextual;
pub mod error_handler;
pub mod hyde;
pub mod memory_agent;
pub mod planning;
pub mod research_node;
pub mod synthesis;
pub mod triage;
pub mod validation;

use crate::cache::{passes_quality_gate, AnswerCache, BuildPermit};
use crate::config::Config;
use crate::memory::ConversationMemory;
use crate::model::{CacheEntry, ExecutionLogEntry};
use crate::providers::{GraphStore, Reranker, WebSearch};
use crate::state::{State, StateUpdate, WorkflowStatus};
use chrono::Utc;
use langgraph_core::Result as GraphResult;
use llm::ChatModel;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything an agent needs besides the state itself. Cloned once per node
/// invocation by the graph engine (`D: Clone` bound on `CompiledGraph`); all
/// fields are cheap `Arc` handles.
///
/// `pending_build` carries the [`BuildPermit`] Triage registers on a cache
/// miss through to the end of the turn, since a `BuildPermit` holds a
/// `watch::Sender` and cannot live inside the cloned, serializable `State`
/// itself. [`finalize_cache`] consumes it once the turn settles.
#[derive(Clone)]
pub struct Deps {
    pub llm: Arc<dyn ChatModel>,
    pub graph_store: Arc<dyn GraphStore>,
    pub web_search: Arc<dyn WebSearch>,
    pub reranker: Arc<dyn Reranker>,
    pub cache: AnswerCache,
    pub memory: ConversationMemory,
    pub config: Arc<Config>,
    pub pending_build: Arc<Mutex<Option<BuildPermit>>>,
}

/// Admits the turn's final answer into the cache if it passes the quality
/// gate, releasing any requesters that were waiting on the same fingerprint
/// either way. Called once after the graph reaches a terminal state; a
/// no-op if Triage never registered a build permit (cache hit, or a
/// stale-hit revalidation miss — see `DESIGN.md`).
pub async fn finalize_cache(state: &State, deps: &Deps) {
    let mut slot = deps.pending_build.lock().await;
    let Some(permit) = slot.take() else {
        return;
    };

    let admissible = state.workflow_status == WorkflowStatus::Completed
        && state.error_state.is_none()
        && !state.served_from_cache
        && state.final_answer.as_deref().is_some_and(|answer| {
            passes_quality_gate(
                answer,
                state.confidence.unwrap_or(0.0),
                state.served_from_cache,
                state.error_state.is_some(),
                deps.config.quality_min_answer_len,
                deps.config.quality_min_confidence,
            )
        });

    let entry = admissible.then(|| CacheEntry {
        normalized_query: crate::fingerprint::normalize(&state.original_query),
        answer: state.final_answer.clone().unwrap_or_default(),
        citations: state.citations.clone().unwrap_or_default(),
        confidence: state.confidence.unwrap_or(0.0),
        created_at: Utc::now(),
        last_validated_at: Utc::now(),
        usage_count: 0,
        source_plan_fingerprint: crate::fingerprint::fingerprint(
            &serde_json::to_string(&state.plan).unwrap_or_default(),
        ),
    });
    permit.finish(entry).await;
}

fn short_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Wraps an agent function with timing, digesting, and `ExecutionLogEntry`
/// bookkeeping so individual agents stay free of logging side effects.
pub async fn run_node<F, Fut>(
    name: &'static str,
    state: State,
    deps: Deps,
    agent: F,
) -> GraphResult<StateUpdate>
where
    F: FnOnce(State, Deps) -> Fut,
    Fut: Future<Output = StateUpdate>,
{
    let t_start = Utc::now();
    let input_digest = short_digest(&format!("{:?}", state));

    let update = tooling::logging::timed(name, agent(state, deps)).await;

    let t_end = Utc::now();
    let output_digest = short_digest(&format!("{:?}", update));
    let error = update
        .error_state
        .as_ref()
        .and_then(|maybe| maybe.as_ref())
        .map(|e| e.message.clone());
    let ok = error.is_none();

    let mut update = update;
    update.execution_log_entries.push(ExecutionLogEntry {
        agent: name.to_string(),
        t_start,
        t_end,
        ok,
        input_digest,
        output_digest,
        error,
    });
    Ok(update)
}
