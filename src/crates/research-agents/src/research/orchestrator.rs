//! Research Orchestrator — the hard core. Runs every SubQuery concurrently,
//! each with its own strategy selection, fallback chain, and validation
//! gate, then aggregates deterministically by plan index.

use super::strategy::{equation_sibling_sections, select_strategy};
use crate::agents::validation::validate_subquery;
use crate::agents::Deps;
use crate::model::{RetrievedChunk, Strategy, SubQuery, SubQueryStatus};
use crate::providers::ProviderError;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinSet;

const RETRIEVAL_K: usize = 8;

static ID_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d][\d.\-]*$").unwrap());

/// A hint like `"Table 1607.9.1"` carries the label the strategy selector
/// keys off of, but `GraphStore::direct_lookup` wants the bare identifier
/// the corpus indexes by; strip the label down to its trailing id.
fn entity_id_from(hint: &str) -> &str {
    ID_TAIL.find(hint).map(|m| m.as_str()).unwrap_or(hint)
}

/// Aggregate metrics over a settled plan.
#[derive(Debug, Clone, Default)]
pub struct ResearchMetrics {
    pub success_rate: f32,
    pub fallback_usage_ratio: f32,
    pub avg_validation_score: f32,
    pub source_diversity: usize,
}

pub enum Outcome {
    /// At least one SubQuery reached `ok`.
    Settled(Vec<SubQuery>, ResearchMetrics),
    /// Zero SubQueries reached `ok`; the caller routes this to an error
    /// state with kind `retrieval_exhausted`.
    Exhausted(Vec<SubQuery>),
}

fn flatten_timeout(
    result: Result<Vec<RetrievedChunk>, tooling::async_utils::timeout::TimeoutError<ProviderError>>,
) -> Result<Vec<RetrievedChunk>, ProviderError> {
    use tooling::async_utils::timeout::TimeoutError;
    result.map_err(|err| match err {
        TimeoutError::Timeout(_) => ProviderError::Timeout,
        TimeoutError::OperationFailed(err) => err,
    })
}

async fn retrieve(
    deps: &Deps,
    strategy: Strategy,
    sub_query: &SubQuery,
) -> Result<Vec<RetrievedChunk>, ProviderError> {
    let embed_text = sub_query.hyde_document.as_deref().unwrap_or(&sub_query.text);
    match strategy {
        Strategy::Vector => flatten_timeout(
            tooling::async_utils::timeout::with_timeout(
                deps.config.retrieval_timeout(),
                deps.graph_store.vector_search(embed_text, RETRIEVAL_K),
            )
            .await,
        ),
        Strategy::Direct => {
            let entity_id = entity_id_from(sub_query.hint.as_deref().unwrap_or(&sub_query.text));
            flatten_timeout(
                tooling::async_utils::timeout::with_timeout(
                    deps.config.retrieval_timeout(),
                    deps.graph_store.direct_lookup(entity_id),
                )
                .await,
            )
        }
        Strategy::Keyword => flatten_timeout(
            tooling::async_utils::timeout::with_timeout(
                deps.config.retrieval_timeout(),
                deps.graph_store.keyword_search(&sub_query.text, RETRIEVAL_K),
            )
            .await,
        ),
        Strategy::Web => flatten_timeout(
            tooling::async_utils::timeout::with_timeout(
                deps.config.web_timeout(),
                deps.web_search.search(&sub_query.text),
            )
            .await,
        ),
    }
}

/// Expands a sub-query's retrieved chunks with any sibling sections implied
/// by an equation reference in the sub-query or its results. Mis-inference
/// is a normal validation miss, not an error: a sibling id that doesn't
/// exist just yields `NotFound`, which we silently skip.
async fn expand_equation_siblings(deps: &Deps, sub_query: &SubQuery, chunks: &mut Vec<RetrievedChunk>) {
    let mut candidates = equation_sibling_sections(&sub_query.text);
    for chunk in chunks.iter() {
        candidates.extend(equation_sibling_sections(&chunk.text));
    }
    for entity_id in candidates {
        if let Ok(extra) = deps.graph_store.direct_lookup(&entity_id).await {
            for chunk in extra {
                if !chunks.iter().any(|c| c.uid == chunk.uid) {
                    chunks.push(chunk);
                }
            }
        }
    }
}

async fn run_one(deps: Deps, mut sub_query: SubQuery) -> SubQuery {
    let primary = select_strategy(&sub_query.text, sub_query.hint.as_deref());
    sub_query.strategy = Some(primary);
    sub_query.strategies_tried.push(primary);

    let mut chunks = retrieve(&deps, primary, &sub_query).await.unwrap_or_default();
    expand_equation_siblings(&deps, &sub_query, &mut chunks).await;

    if deps.config.use_reranker {
        if let Ok(reranked) = deps.reranker.rerank(&sub_query.text, chunks.clone()).await {
            chunks = reranked;
        }
    }

    let mut validation = validate_subquery(&deps, &sub_query.text, &chunks).await;

    if validation.score < deps.config.validation_threshold_subquery {
        for fallback in primary.fallback_order() {
            sub_query.strategies_tried.push(fallback);
            let mut candidate = retrieve(&deps, fallback, &sub_query).await.unwrap_or_default();
            expand_equation_siblings(&deps, &sub_query, &mut candidate).await;
            if deps.config.use_reranker {
                if let Ok(reranked) = deps.reranker.rerank(&sub_query.text, candidate.clone()).await {
                    candidate = reranked;
                }
            }
            let candidate_validation = validate_subquery(&deps, &sub_query.text, &candidate).await;
            if candidate_validation.score >= deps.config.validation_threshold_subquery {
                chunks = candidate;
                validation = candidate_validation;
                sub_query.strategy = Some(fallback);
                break;
            }
            // keep the best-scoring attempt even if every fallback misses,
            // so a degraded synthesis still has something to work with.
            if candidate_validation.score > validation.score {
                chunks = candidate;
                validation = candidate_validation;
            }
        }
    }

    sub_query.status = if validation.score >= deps.config.validation_threshold_subquery {
        SubQueryStatus::Ok
    } else {
        SubQueryStatus::Failed
    };
    sub_query.result = Some(chunks);
    sub_query.validation = Some(validation);
    sub_query
}

/// Executes every SubQuery in `sub_queries` concurrently
/// (`config.parallel_research`), bounding each by `subquery_budget`, and
/// aggregates results back into plan order regardless of completion order.
pub async fn run(deps: &Deps, sub_queries: Vec<SubQuery>) -> Outcome {
    let budget = deps.config.subquery_budget();

    if !deps.config.parallel_research {
        let mut settled = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            let deps = deps.clone();
            let result = tokio::time::timeout(budget, run_one(deps, sub_query.clone()))
                .await
                .unwrap_or_else(|_| timed_out(sub_query));
            settled.push(result);
        }
        return finalize(settled);
    }

    let mut join_set: JoinSet<(usize, SubQuery)> = JoinSet::new();
    for (index, sub_query) in sub_queries.into_iter().enumerate() {
        let deps = deps.clone();
        let original = sub_query.clone();
        join_set.spawn(async move {
            let outcome = tokio::time::timeout(budget, run_one(deps, sub_query))
                .await
                .unwrap_or_else(|_| timed_out(original));
            (index, outcome)
        });
    }

    let mut by_index: Vec<Option<SubQuery>> = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        // A panic inside one SubQuery task must never affect the others; we
        // just record it as failed.
        if let Ok((index, sub_query)) = joined {
            if by_index.len() <= index {
                by_index.resize(index + 1, None);
            }
            by_index[index] = Some(sub_query);
        }
    }

    let settled = by_index.into_iter().flatten().collect();
    finalize(settled)
}

fn timed_out(mut sub_query: SubQuery) -> SubQuery {
    sub_query.status = SubQueryStatus::Failed;
    sub_query.validation = Some(crate::model::ValidationResult {
        score: 0,
        reasoning: "sub-query exceeded its time budget".to_string(),
    });
    sub_query
}

fn finalize(sub_queries: Vec<SubQuery>) -> Outcome {
    let ok_count = sub_queries.iter().filter(|s| s.status == SubQueryStatus::Ok).count();
    if ok_count == 0 {
        return Outcome::Exhausted(sub_queries);
    }

    let total = sub_queries.len().max(1) as f32;
    let fallback_count = sub_queries.iter().filter(|s| s.used_fallback()).count() as f32;
    let avg_score = sub_queries
        .iter()
        .filter_map(|s| s.validation.as_ref())
        .map(|v| v.score as f32)
        .sum::<f32>()
        / total;
    let distinct_sources: std::collections::HashSet<&str> = sub_queries
        .iter()
        .flat_map(|s| s.result.iter().flatten())
        .map(|c| c.uid.as_str())
        .collect();

    let metrics = ResearchMetrics {
        success_rate: ok_count as f32 / total,
        fallback_usage_ratio: fallback_count / total,
        avg_validation_score: avg_score,
        source_diversity: distinct_sources.len(),
    };
    Outcome::Settled(sub_queries, metrics)
}
