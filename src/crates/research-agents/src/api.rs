//! HTTP surface, in the teacher's `api::{routes, handlers, error, response}`
//! shape collapsed into one module: a thin `AppState`, a
//! `SuccessResponse`/`ErrorResponse` envelope, and one handler per route.

use crate::agents::Deps;
use crate::cache::{CacheStats, SearchHit};
use crate::state::State;
use crate::workflow;
use axum::extract::{Query, State as AxumState};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use langgraph_core::CompiledGraph;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone)]
pub struct AppState {
    pub deps: Deps,
    pub graph: Arc<CompiledGraph<State, crate::state::StateUpdate, Deps>>,
}

impl AppState {
    pub fn new(deps: Deps) -> Result<Self, langgraph_core::GraphError> {
        Ok(Self {
            deps,
            graph: Arc::new(workflow::build()?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/turn", post(turn))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/search", get(cache_search))
        .route("/cache/clear", delete(cache_clear))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        tracing::error!(error = %self, "api: request failed");
        (status, Json(ErrorResponse { success: false, error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

impl<T> SuccessResponse<T> {
    fn new(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct TurnResult {
    answer: Option<String>,
    citations: Vec<crate::model::Citation>,
    confidence: Option<f32>,
    served_from_cache: bool,
    workflow_status: crate::state::WorkflowStatus,
}

/// `POST /turn`. Streams one `trace` event per `ExecutionLogEntry` the run
/// produced, in order, followed by a single terminal `result` event; errors
/// surface as a `result` event with `workflow_status: "failed"` rather than
/// an HTTP error, since by the time we have a `State` the turn itself ran to
/// completion.
async fn turn(
    AxumState(app): AxumState<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }

    let turn_deps = workflow::deps_for_turn(&app.deps);
    let final_state = workflow::run_turn(&app.graph, request.query, request.session_id, turn_deps)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let mut events: Vec<Result<Event, Infallible>> = final_state
        .execution_log
        .iter()
        .map(|entry| Ok(Event::default().event("trace").json_data(entry).unwrap_or_else(|_| Event::default())))
        .collect();

    let result = TurnResult {
        answer: final_state.final_answer.clone(),
        citations: final_state.citations.clone().unwrap_or_default(),
        confidence: final_state.confidence,
        served_from_cache: final_state.served_from_cache,
        workflow_status: final_state.workflow_status,
    };
    events.push(Ok(Event::default()
        .event("result")
        .json_data(&result)
        .unwrap_or_else(|_| Event::default())));

    Ok(Sse::new(stream::iter(events)).keep_alive(KeepAlive::default()))
}

async fn cache_stats(AxumState(app): AxumState<AppState>) -> Json<SuccessResponse<CacheStats>> {
    Json(SuccessResponse::new(app.deps.cache.stats().await))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

async fn cache_search(
    AxumState(app): AxumState<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SuccessResponse<Vec<SearchHit>>> {
    Json(SuccessResponse::new(app.deps.cache.search(&params.q, params.limit).await))
}

async fn cache_clear(AxumState(app): AxumState<AppState>) -> StatusCode {
    app.deps.cache.clear().await;
    StatusCode::NO_CONTENT
}
