//! Conversation Memory.
//!
//! An explicit, tested collaborator rather than just a trait: unlike the
//! knowledge-graph store, which is an external collaborator reached through
//! a provider trait, Conversation Memory is in-scope core.

use crate::model::{Session, SessionId, StructuredMemory, Turn};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Per-session conversation store. Writes are serialized via a per-session
/// lock so that a new Turn for the same Session never starts until the
/// prior Turn's Memory write has completed.
#[derive(Clone)]
pub struct ConversationMemory {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    locks: Arc<RwLock<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn lock_for(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(session_id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load a Session, creating an empty one if it does not yet exist.
    pub async fn load(&self, session_id: &SessionId) -> Session {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return session.clone();
        }
        let session = Session {
            id: session_id.clone(),
            ..Default::default()
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());
        session
    }

    /// Append a completed Turn and, optionally, a refreshed StructuredMemory.
    /// Serialized per session by the Turn-ordering lock.
    pub async fn append(
        &self,
        session_id: &SessionId,
        user_query: String,
        assistant_answer: String,
        structured_memory: Option<StructuredMemory>,
    ) {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session {
                id: session_id.clone(),
                ..Default::default()
            });
        session.history.turns.push(Turn {
            user_query,
            assistant_answer,
            ts: Utc::now(),
        });
        if let Some(memory) = structured_memory {
            session.structured_memory = memory;
        }
    }

    /// Renders the conversation so far into a context string fed back into
    /// Triage. Most-recent turns last, truncated to avoid unbounded prompt
    /// growth.
    pub async fn context_payload(&self, session_id: &SessionId) -> String {
        const MAX_TURNS: usize = 6;
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else {
            return String::new();
        };

        let mut parts = Vec::new();
        if !session.structured_memory.user_goals.is_empty() {
            parts.push(format!(
                "Goals: {}",
                session.structured_memory.user_goals.join("; ")
            ));
        }
        if !session.structured_memory.key_facts.is_empty() {
            parts.push(format!(
                "Known facts: {}",
                session.structured_memory.key_facts.join("; ")
            ));
        }
        let recent = session
            .history
            .turns
            .iter()
            .rev()
            .take(MAX_TURNS)
            .rev();
        for turn in recent {
            parts.push(format!("User: {}", turn.user_query));
            parts.push(format!("Assistant: {}", turn.assistant_answer));
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_creates_empty_session_on_first_access() {
        let memory = ConversationMemory::new();
        let session = memory.load(&"s1".to_string()).await;
        assert_eq!(session.history.turns.len(), 0);
    }

    #[tokio::test]
    async fn append_grows_history_and_message_count_is_twice_turn_count() {
        let memory = ConversationMemory::new();
        let session_id = "s1".to_string();
        memory
            .append(&session_id, "q1".into(), "a1".into(), None)
            .await;
        memory
            .append(&session_id, "q2".into(), "a2".into(), None)
            .await;

        let session = memory.load(&session_id).await;
        assert_eq!(session.history.turns.len(), 2);
        assert_eq!(session.history.message_count(), 4);
    }

    #[tokio::test]
    async fn context_payload_includes_recent_turns_and_memory() {
        let memory = ConversationMemory::new();
        let session_id = "s1".to_string();
        memory
            .append(
                &session_id,
                "What is Section 1607?".into(),
                "Section 1607 covers live loads.".into(),
                Some(StructuredMemory {
                    user_goals: vec!["understand live loads".into()],
                    key_facts: vec![],
                    unresolved_questions: vec![],
                }),
            )
            .await;

        let payload = memory.context_payload(&session_id).await;
        assert!(payload.contains("understand live loads"));
        assert!(payload.contains("Section 1607"));
    }
}
