//! Workflow state: a typed struct with `Option<T>` fields instead of a
//! `serde_json::Value` plus a `StateSchema` of reducers.

use crate::error::{ErrorState, OriginStep};
use crate::model::{
    Citation, ExecutionLogEntry, ResearchPlan, SessionId, SubQuery, ThinkingEvent,
};
use langgraph_core::graph::{FromEngineFailure, MergeUpdate, NodeId, RouteOverride, END};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Triage,
    Contextual,
    Planning,
    Hyde,
    Research,
    Synthesis,
    Memory,
    Error,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageClass {
    Simple,
    Contextual,
    DirectRetrieval,
    Engage,
    Clarify,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    // Input (immutable after creation)
    pub user_query: String,
    pub original_query: String,
    pub context_payload: String,
    pub session_id: SessionId,
    // Control
    pub current_step: Step,
    pub workflow_status: WorkflowStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    // Results
    pub triage_class: Option<TriageClass>,
    pub triage_reason: Option<String>,
    pub served_from_cache: bool,
    pub cache_fingerprint: Option<String>,
    pub plan: Option<ResearchPlan>,
    pub sub_query_answers: Option<Vec<SubQuery>>,
    pub final_answer: Option<String>,
    pub citations: Option<Vec<Citation>>,
    pub confidence: Option<f32>,
    // Observability
    pub execution_log: Vec<ExecutionLogEntry>,
    pub thinking_trace: Vec<ThinkingEvent>,
    // Error
    pub error_state: Option<ErrorState>,
}

impl State {
    pub fn new(user_query: String, context_payload: String, session_id: SessionId, max_retries: u32) -> Self {
        Self {
            original_query: user_query.clone(),
            user_query,
            context_payload,
            session_id,
            current_step: Step::Triage,
            workflow_status: WorkflowStatus::Running,
            retry_count: 0,
            max_retries,
            triage_class: None,
            triage_reason: None,
            served_from_cache: false,
            cache_fingerprint: None,
            plan: None,
            sub_query_answers: None,
            final_answer: None,
            citations: None,
            confidence: None,
            execution_log: Vec::new(),
            thinking_trace: Vec::new(),
            error_state: None,
        }
    }
}

/// Partial update produced by one agent node. `Option<T>` fields overwrite
/// the corresponding `State` field when `Some`; `execution_log_entries` and
/// `thinking_events` always append, since every field has a single writer
/// except `execution_log`, which always appends.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub current_step: Option<Step>,
    pub workflow_status: Option<WorkflowStatus>,
    pub retry_count: Option<u32>,
    pub triage_class: Option<TriageClass>,
    pub triage_reason: Option<String>,
    pub served_from_cache: Option<bool>,
    pub cache_fingerprint: Option<String>,
    pub plan: Option<ResearchPlan>,
    pub sub_query_answers: Option<Vec<SubQuery>>,
    pub final_answer: Option<String>,
    pub citations: Option<Vec<Citation>>,
    pub confidence: Option<f32>,
    pub execution_log_entries: Vec<ExecutionLogEntry>,
    pub thinking_events: Vec<ThinkingEvent>,
    pub error_state: Option<Option<ErrorState>>,
}

impl StateUpdate {
    pub fn with_step(mut self, step: Step) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.workflow_status = Some(status);
        self
    }

    pub fn with_error(mut self, error: ErrorState) -> Self {
        self.error_state = Some(Some(error));
        self
    }

    /// Explicitly clear a previously set error, e.g. after a successful
    /// retry routes back through the originating node.
    pub fn clear_error(mut self) -> Self {
        self.error_state = Some(None);
        self
    }

    pub fn with_log(mut self, entry: ExecutionLogEntry) -> Self {
        self.execution_log_entries.push(entry);
        self
    }
}

impl MergeUpdate<StateUpdate> for State {
    fn merge(&mut self, update: StateUpdate) {
        if let Some(step) = update.current_step {
            self.current_step = step;
        }
        if let Some(status) = update.workflow_status {
            self.workflow_status = status;
        }
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if update.triage_class.is_some() {
            self.triage_class = update.triage_class;
        }
        if update.triage_reason.is_some() {
            self.triage_reason = update.triage_reason;
        }
        if let Some(served) = update.served_from_cache {
            self.served_from_cache = served;
        }
        if update.cache_fingerprint.is_some() {
            self.cache_fingerprint = update.cache_fingerprint;
        }
        if update.plan.is_some() {
            self.plan = update.plan;
        }
        if update.sub_query_answers.is_some() {
            self.sub_query_answers = update.sub_query_answers;
        }
        if update.final_answer.is_some() {
            self.final_answer = update.final_answer;
        }
        if update.citations.is_some() {
            self.citations = update.citations;
        }
        if update.confidence.is_some() {
            self.confidence = update.confidence;
        }
        if let Some(error_state) = update.error_state {
            self.error_state = error_state;
        }
        self.execution_log.extend(update.execution_log_entries);
        self.thinking_trace.extend(update.thinking_events);
    }
}

impl RouteOverride for State {
    /// If `error_state` is set when a node returns, the engine routes to
    /// `error` regardless of the node's suggested next step.
    fn route_override(&self) -> Option<NodeId> {
        if self.error_state.is_some() && self.current_step != Step::Error {
            Some("error".to_string())
        } else if self.current_step == Step::Finish {
            Some(END.to_string())
        } else {
            None
        }
    }
}

impl FromEngineFailure for StateUpdate {
    /// Only reached if a node's executor itself returns `Err` (a bug or an
    /// infrastructure fault the node didn't classify) rather than embedding
    /// `error_state` in its own `StateUpdate`, which is the normal path:
    /// agents never raise to the engine.
    fn from_engine_failure(node: &str, message: String) -> Self {
        let origin_step = match node {
            "triage" => OriginStep::Triage,
            "planning" => OriginStep::Planning,
            "hyde" => OriginStep::Hyde,
            "research" => OriginStep::Research,
            "synthesis" => OriginStep::Synthesis,
            "memory" => OriginStep::Memory,
            _ => OriginStep::Research,
        };
        StateUpdate::default().with_error(ErrorState::new(
            crate::error::ErrorKind::Transient,
            message,
            origin_step,
        ))
    }
}
