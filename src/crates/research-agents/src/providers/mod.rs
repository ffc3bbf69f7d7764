//! Retrieval provider contracts.
//!
//! These are external collaborators out of core scope: the knowledge-graph
//! store's query engine, the web-search crawler, and the reranker's model
//! are not implemented here, only the seams the orchestrator calls through.

pub mod fake;

use crate::model::RetrievedChunk;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("entity '{0}' was not found")]
    NotFound(String),
}

/// Knowledge-graph store: vector search, direct entity lookup, keyword search.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn vector_search(
        &self,
        embedding_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ProviderError>;

    async fn direct_lookup(&self, entity_id: &str) -> Result<Vec<RetrievedChunk>, ProviderError>;

    async fn keyword_search(
        &self,
        boolean_query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ProviderError>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>, ProviderError>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        docs: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>, ProviderError>;
}
