//! In-memory provider fakes used by tests and by `ask`/`serve` when no real
//! backend is configured.

use super::{GraphStore, ProviderError, Reranker, WebSearch};
use crate::model::{RetrievedChunk, SourceTag};
use async_trait::async_trait;
use std::collections::HashMap;

/// A single seeded document in the fake knowledge graph.
#[derive(Debug, Clone)]
pub struct SeedChunk {
    pub uid: String,
    pub title: Option<String>,
    pub text: String,
}

/// An in-memory stand-in for the knowledge-graph store. Vector and keyword
/// search both do substring scoring against seeded text; direct lookup is an
/// exact `uid` match. Good enough to drive the orchestrator's fallback chain
/// deterministically in tests.
#[derive(Default)]
pub struct FakeGraphStore {
    by_uid: HashMap<String, SeedChunk>,
}

impl FakeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, chunk: SeedChunk) -> Self {
        self.by_uid.insert(chunk.uid.clone(), chunk);
        self
    }

    fn score(text: &str, query: &str) -> f32 {
        let query = query.to_lowercase();
        let terms: Vec<&str> = query.split_whitespace().filter(|t| t.len() > 2).collect();
        if terms.is_empty() {
            return 0.0;
        }
        let text_lower = text.to_lowercase();
        let hits = terms.iter().filter(|t| text_lower.contains(**t)).count();
        hits as f32 / terms.len() as f32
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn vector_search(
        &self,
        embedding_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ProviderError> {
        let mut scored: Vec<(f32, &SeedChunk)> = self
            .by_uid
            .values()
            .map(|c| (Self::score(&c.text, embedding_text), c))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, c)| RetrievedChunk {
                uid: c.uid.clone(),
                source_tag: SourceTag::Vector,
                title: c.title.clone(),
                text: c.text.clone(),
                score: Some(score),
                metadata: serde_json::Value::Null,
            })
            .collect())
    }

    async fn direct_lookup(&self, entity_id: &str) -> Result<Vec<RetrievedChunk>, ProviderError> {
        self.by_uid
            .iter()
            .filter(|(uid, _)| uid.as_str() == entity_id || uid.starts_with(entity_id))
            .map(|(_, c)| {
                Ok(RetrievedChunk {
                    uid: c.uid.clone(),
                    source_tag: SourceTag::Direct,
                    title: c.title.clone(),
                    text: c.text.clone(),
                    score: Some(1.0),
                    metadata: serde_json::Value::Null,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()
            .and_then(|v| {
                if v.is_empty() {
                    Err(ProviderError::NotFound(entity_id.to_string()))
                } else {
                    Ok(v)
                }
            })
    }

    async fn keyword_search(
        &self,
        boolean_query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ProviderError> {
        let mut scored: Vec<(f32, &SeedChunk)> = self
            .by_uid
            .values()
            .map(|c| (Self::score(&c.text, boolean_query), c))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, c)| RetrievedChunk {
                uid: c.uid.clone(),
                source_tag: SourceTag::Keyword,
                title: c.title.clone(),
                text: c.text.clone(),
                score: Some(score),
                metadata: serde_json::Value::Null,
            })
            .collect())
    }
}

/// Always returns a fixed set of canned web results; real deployments swap
/// this for an HTTP-backed crawler client.
pub struct FakeWebSearch {
    pub canned: Vec<RetrievedChunk>,
}

impl FakeWebSearch {
    pub fn new(canned: Vec<RetrievedChunk>) -> Self {
        Self { canned }
    }
}

#[async_trait]
impl WebSearch for FakeWebSearch {
    async fn search(&self, _query: &str) -> Result<Vec<RetrievedChunk>, ProviderError> {
        Ok(self.canned.clone())
    }
}

/// No-op reranker: returns the candidate set in its original order. Real
/// rerankers are an external model, not implemented here.
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(
        &self,
        _query: &str,
        docs: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>, ProviderError> {
        Ok(docs)
    }
}
