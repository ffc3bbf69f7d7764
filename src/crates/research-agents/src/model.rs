//! Core domain entities, expressed as concrete Rust types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = String;

/// Where a [`RetrievedChunk`] came from. Drives both citation rendering and
/// the fallback-chain bookkeeping in the research orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Vector,
    Direct,
    Keyword,
    Web,
    Cache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub uid: String,
    pub source_tag: SourceTag,
    pub title: Option<String>,
    pub text: String,
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Primary retrieval method chosen for a [`SubQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Vector,
    Direct,
    Keyword,
    Web,
}

impl Strategy {
    /// Fallback order tried for each primary strategy when it comes up empty.
    pub fn fallback_order(self) -> [Strategy; 3] {
        match self {
            Strategy::Vector => [Strategy::Keyword, Strategy::Direct, Strategy::Web],
            Strategy::Direct => [Strategy::Vector, Strategy::Keyword, Strategy::Web],
            Strategy::Keyword => [Strategy::Direct, Strategy::Vector, Strategy::Web],
            Strategy::Web => [Strategy::Vector, Strategy::Keyword, Strategy::Direct],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub score: u8,
    pub reasoning: String,
}

impl ValidationResult {
    pub fn neutral(reasoning: impl Into<String>) -> Self {
        Self {
            score: 5,
            reasoning: reasoning.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubQueryStatus {
    Pending,
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub text: String,
    pub hint: Option<String>,
    pub hyde_document: Option<String>,
    pub strategy: Option<Strategy>,
    pub result: Option<Vec<RetrievedChunk>>,
    pub validation: Option<ValidationResult>,
    pub status: SubQueryStatus,
    /// Strategies tried in order, for the `fallback_usage_ratio` metric.
    #[serde(default)]
    pub strategies_tried: Vec<Strategy>,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            text: text.into(),
            hint,
            hyde_document: None,
            strategy: None,
            result: None,
            validation: None,
            status: SubQueryStatus::Pending,
            strategies_tried: Vec::new(),
        }
    }

    pub fn used_fallback(&self) -> bool {
        self.strategies_tried.len() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Strategist,
    Specialist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanClassification {
    Engage,
    DirectRetrieval,
    Clarify,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub sub_queries: Vec<SubQuery>,
    pub mode: PlanMode,
    pub classification: PlanClassification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source_tag: SourceTag,
    pub uid: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub normalized_query: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub last_validated_at: DateTime<Utc>,
    pub usage_count: u64,
    pub source_plan_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub agent: String,
    pub t_start: DateTime<Utc>,
    pub t_end: DateTime<Utc>,
    pub ok: bool,
    pub input_digest: String,
    pub output_digest: String,
    pub error: Option<String>,
}

/// Optional structured reasoning events for streaming UIs. The workflow
/// engine works identically whether or not anything reads these; they're a
/// sink the engine optionally emits to, not an input to any decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingEvent {
    pub origin_step: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user_query: String,
    pub assistant_answer: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredMemory {
    pub user_goals: Vec<String>,
    pub key_facts: Vec<String>,
    pub unresolved_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub turns: Vec<Turn>,
}

impl ConversationHistory {
    /// History length after turn N equals 2N (user + assistant messages).
    pub fn message_count(&self) -> usize {
        self.turns.len() * 2
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub history: ConversationHistory,
    pub structured_memory: StructuredMemory,
}
