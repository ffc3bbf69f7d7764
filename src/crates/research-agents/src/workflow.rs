//! Wires the agent nodes into the executable graph and exposes [`run_turn`],
//! the single entry point both the HTTP surface and the CLI drive a turn
//! through.

use crate::agents::{self, Deps};
use crate::cache::Lookup;
use crate::state::{State, Step, StateUpdate};
use langgraph_core::graph::{CompiledGraph, Graph, NodeSpec, END, START};
use langgraph_core::{GraphError, Result as GraphResult};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Hard backstop against a routing bug oscillating forever; unrelated to the
/// application-level `retry_count` budget the error handler enforces.
const MAX_GRAPH_STEPS: usize = 64;

macro_rules! node {
    ($name:literal, $agent:path) => {
        NodeSpec::new($name, |state: State, deps: Deps| {
            Box::pin(agents::run_node($name, state, deps, $agent))
        })
    };
}

/// Builds and validates the turn-processing graph: `triage` fans out to
/// `contextual`, `research` (direct-retrieval fast path), `planning`, or a
/// terminal finish; `planning` fans out to `hyde` or a terminal finish;
/// `hyde` always flows to `research`; `research` and `synthesis` each flow
/// forward on success; `memory` always finishes; `error` routes back to
/// whichever step raised it, or to a terminal finish once a degraded answer
/// has been substituted.
pub fn build() -> GraphResult<CompiledGraph<State, StateUpdate, Deps>> {
    let mut graph: Graph<State, StateUpdate, Deps> = Graph::new();

    graph.add_node(node!("triage", agents::triage::run));
    graph.add_node(node!("contextual", agents::contextual::run));
    graph.add_node(node!("planning", agents::planning::run));
    graph.add_node(node!("hyde", agents::hyde::run));
    graph.add_node(node!("research", agents::research_node::run));
    graph.add_node(node!("synthesis", agents::synthesis::run));
    graph.add_node(node!("memory", agents::memory_agent::run));
    graph.add_node(node!("error", agents::error_handler::run));

    graph.add_conditional_edge(
        "triage",
        Arc::new(|state: &State| match state.current_step {
            Step::Contextual => "contextual".to_string(),
            Step::Research => "research".to_string(),
            Step::Planning => "planning".to_string(),
            _ => END.to_string(),
        }),
        vec!["contextual".to_string(), "research".to_string(), "planning".to_string()],
    );
    graph.add_edge("contextual", "memory");
    graph.add_conditional_edge(
        "planning",
        Arc::new(|state: &State| match state.current_step {
            Step::Hyde => "hyde".to_string(),
            _ => END.to_string(),
        }),
        vec!["hyde".to_string()],
    );
    graph.add_edge("hyde", "research");
    graph.add_edge("research", "synthesis");
    graph.add_edge("synthesis", "memory");
    graph.add_edge("memory", END);
    graph.add_conditional_edge(
        "error",
        Arc::new(|state: &State| match state.current_step {
            Step::Triage => "triage".to_string(),
            Step::Planning => "planning".to_string(),
            Step::Hyde => "hyde".to_string(),
            Step::Research => "research".to_string(),
            Step::Synthesis => "synthesis".to_string(),
            Step::Memory => "memory".to_string(),
            _ => END.to_string(),
        }),
        vec![
            "triage".to_string(),
            "planning".to_string(),
            "hyde".to_string(),
            "research".to_string(),
            "synthesis".to_string(),
            "memory".to_string(),
        ],
    );

    graph.add_edge(START, "triage");
    graph.set_entry("triage");
    graph.compile()
}

/// Runs one full turn: resolves the session's conversation context, builds
/// the initial [`State`], drives it through the compiled graph, and admits
/// (or declines) the result into the answer cache.
///
/// `deps` must carry a fresh `pending_build` (see [`Deps`]) — callers
/// typically clone a long-lived `Deps` template and replace that one field
/// per turn.
pub async fn run_turn(
    compiled: &CompiledGraph<State, StateUpdate, Deps>,
    user_query: String,
    session_id: String,
    deps: Deps,
) -> GraphResult<State> {
    let context_payload = deps.memory.context_payload(&session_id).await;
    let initial = State::new(user_query, context_payload, session_id, deps.config.max_retries);

    let final_state = compiled.invoke(initial, deps.clone(), MAX_GRAPH_STEPS).await?;
    agents::finalize_cache(&final_state, &deps).await;
    Ok(final_state)
}

/// Convenience constructor for a turn-scoped [`Deps`] from a long-lived
/// template, swapping in a fresh `pending_build` slot and registering a
/// cache entry (or revalidating one) is left to the graph itself — this
/// just guarantees two concurrent turns never share a `BuildPermit`.
pub fn deps_for_turn(template: &Deps) -> Deps {
    Deps {
        llm: template.llm.clone(),
        graph_store: template.graph_store.clone(),
        web_search: template.web_search.clone(),
        reranker: template.reranker.clone(),
        cache: template.cache.clone(),
        memory: template.memory.clone(),
        config: template.config.clone(),
        pending_build: Arc::new(Mutex::new(None)),
    }
}

/// Whether `fingerprint` currently has a live cache entry, used by the API
/// layer to short-circuit a would-be duplicate build announcement. Not part
/// of the graph itself.
pub async fn is_cached(deps: &Deps, fingerprint: &str) -> bool {
    matches!(deps.cache.acquire(fingerprint).await, Lookup::Hit(_))
}
