//! Answer Cache.
//!
//! Modeled on the teacher's generic `Cache<K, V>` (`RwLock<HashMap>` +
//! metrics, see `langgraph-core::cache`), specialized to the fingerprint key
//! and `CacheEntry` value, plus a single-builder-per-fingerprint concurrency
//! contract.
//!
//! **Wait policy (documented in `DESIGN.md`).** The first requester for a
//! fingerprint registers a `Building` slot holding a `watch` channel.
//! Concurrent requesters for the same fingerprint await that channel,
//! bounded by `cache_build_wait_timeout_s`; on timeout (or if the build
//! finishes without being admitted) they fall through to an independent
//! build and skip cache admission themselves, so a stalled or failed build
//! never wedges every other requester for the same query.

use crate::model::CacheEntry;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

enum Slot {
    Building(watch::Receiver<Option<CacheEntry>>),
    Ready(CacheEntry),
}

#[derive(Debug, Default, Clone)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub stores: u64,
    pub hit_rate: f64,
    pub avg_usage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub fingerprint: String,
    pub preview: String,
    pub usage_count: u64,
}

/// What a caller gets back from [`AnswerCache::acquire`].
pub enum Lookup {
    /// A validated, non-expired entry.
    Hit(CacheEntry),
    /// No usable entry exists; holds a permit the caller uses to admit a
    /// freshly synthesized answer once ready.
    Miss(BuildPermit),
}

/// Returned on a cache miss. `admit` is `true` only for the requester that
/// registered the in-flight marker; everyone who joined via the wait path
/// (timed out or arrived after the build failed) gets `admit = false` and
/// must not write to the cache themselves, per the wait-vs-skip contract.
pub struct BuildPermit {
    fingerprint: String,
    admit: bool,
    sender: Option<watch::Sender<Option<CacheEntry>>>,
    cache: AnswerCache,
}

impl BuildPermit {
    pub fn can_admit(&self) -> bool {
        self.admit
    }

    /// Admit a freshly synthesized answer if it passes the quality gate.
    /// Always releases any waiters, admitted or not.
    pub async fn finish(self, entry: Option<CacheEntry>) {
        if self.admit {
            if let Some(entry) = entry.clone() {
                self.cache.store(self.fingerprint.clone(), entry).await;
            } else {
                self.cache.abandon(&self.fingerprint).await;
            }
        }
        if let Some(sender) = self.sender {
            let _ = sender.send(entry);
        }
    }
}

pub struct AnswerCache {
    storage: Arc<RwLock<HashMap<String, Slot>>>,
    metrics: Arc<RwLock<CacheMetrics>>,
    ttl: chrono::Duration,
    wait_timeout: Duration,
}

impl Clone for AnswerCache {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            metrics: self.metrics.clone(),
            ttl: self.ttl,
            wait_timeout: self.wait_timeout,
        }
    }
}

impl AnswerCache {
    pub fn new(ttl: chrono::Duration, wait_timeout: Duration) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(RwLock::new(CacheMetrics::default())),
            ttl,
            wait_timeout,
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        Utc::now() - entry.created_at > self.ttl
    }

    /// Look up a fingerprint, registering as the builder on a miss. Callers
    /// must re-validate a `Hit` via the Validation Agent before reuse.
    pub async fn acquire(&self, fingerprint: &str) -> Lookup {
        {
            let storage = self.storage.read().await;
            match storage.get(fingerprint) {
                Some(Slot::Ready(entry)) if !self.is_expired(entry) => {
                    let mut metrics = self.metrics.write().await;
                    metrics.hits += 1;
                    return Lookup::Hit(entry.clone());
                }
                Some(Slot::Building(receiver)) => {
                    let mut receiver = receiver.clone();
                    drop(storage);
                    let waited = tokio::time::timeout(self.wait_timeout, async {
                        loop {
                            if receiver.changed().await.is_err() {
                                return None;
                            }
                            if let Some(entry) = receiver.borrow().clone() {
                                return Some(entry);
                            }
                        }
                    })
                    .await;
                    if let Ok(Some(entry)) = waited {
                        if !self.is_expired(&entry) {
                            let mut metrics = self.metrics.write().await;
                            metrics.hits += 1;
                            return Lookup::Hit(entry);
                        }
                    }
                    // Timed out, or the in-flight build didn't admit: fall
                    // through to an independent build that skips admission.
                    let mut metrics = self.metrics.write().await;
                    metrics.misses += 1;
                    return Lookup::Miss(BuildPermit {
                        fingerprint: fingerprint.to_string(),
                        admit: false,
                        sender: None,
                        cache: self.clone(),
                    });
                }
                _ => {}
            }
        }

        let mut storage = self.storage.write().await;
        // Re-check under the write lock: another task may have registered
        // the builder between the read above and here.
        if let Some(slot) = storage.get(fingerprint) {
            match slot {
                Slot::Ready(entry) if !self.is_expired(entry) => {
                    let entry = entry.clone();
                    drop(storage);
                    let mut metrics = self.metrics.write().await;
                    metrics.hits += 1;
                    return Lookup::Hit(entry);
                }
                _ => {}
            }
        }
        let (sender, receiver) = watch::channel(None);
        storage.insert(fingerprint.to_string(), Slot::Building(receiver));
        drop(storage);
        let mut metrics = self.metrics.write().await;
        metrics.misses += 1;
        Lookup::Miss(BuildPermit {
            fingerprint: fingerprint.to_string(),
            admit: true,
            sender: Some(sender),
            cache: self.clone(),
        })
    }

    async fn store(&self, fingerprint: String, mut entry: CacheEntry) {
        entry.last_validated_at = Utc::now();
        let mut storage = self.storage.write().await;
        storage.insert(fingerprint, Slot::Ready(entry));
        let mut metrics = self.metrics.write().await;
        metrics.stores += 1;
    }

    async fn abandon(&self, fingerprint: &str) {
        let mut storage = self.storage.write().await;
        storage.remove(fingerprint);
    }

    /// Refresh `last_validated_at` and bump `usage_count` on reuse.
    pub async fn record_reuse(&self, fingerprint: &str) {
        let mut storage = self.storage.write().await;
        if let Some(Slot::Ready(entry)) = storage.get_mut(fingerprint) {
            entry.usage_count += 1;
            entry.last_validated_at = Utc::now();
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let storage = self.storage.read().await;
        let ready: Vec<&CacheEntry> = storage
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready(entry) => Some(entry),
                Slot::Building(_) => None,
            })
            .collect();
        let metrics = self.metrics.read().await.clone();
        let total = metrics.hits + metrics.misses;
        let avg_usage = if ready.is_empty() {
            0.0
        } else {
            ready.iter().map(|e| e.usage_count as f64).sum::<f64>() / ready.len() as f64
        };
        CacheStats {
            entries: ready.len(),
            hits: metrics.hits,
            stores: metrics.stores,
            hit_rate: if total == 0 {
                0.0
            } else {
                metrics.hits as f64 / total as f64
            },
            avg_usage,
        }
    }

    pub async fn search(&self, substring: &str, limit: usize) -> Vec<SearchHit> {
        let storage = self.storage.read().await;
        let needle = substring.to_lowercase();
        storage
            .iter()
            .filter_map(|(fingerprint, slot)| match slot {
                Slot::Ready(entry) if entry.normalized_query.contains(&needle) => Some(SearchHit {
                    fingerprint: fingerprint.clone(),
                    preview: entry.answer.chars().take(160).collect(),
                    usage_count: entry.usage_count,
                }),
                _ => None,
            })
            .take(limit)
            .collect()
    }

    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
        let mut metrics = self.metrics.write().await;
        *metrics = CacheMetrics::default();
    }
}

/// Admission quality gate: long enough, confident enough, carries at least
/// one citation marker, and wasn't itself served from cache or an error path.
pub fn passes_quality_gate(
    answer: &str,
    confidence: f32,
    served_from_cache: bool,
    has_error: bool,
    min_len: usize,
    min_confidence: f32,
) -> bool {
    answer.len() > min_len
        && confidence >= min_confidence
        && has_citation_marker(answer)
        && !served_from_cache
        && !has_error
}

fn has_citation_marker(answer: &str) -> bool {
    answer.contains('[') && answer.contains(']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Citation;

    fn sample_entry(answer: &str) -> CacheEntry {
        CacheEntry {
            normalized_query: "what is section 1607 about?".into(),
            answer: answer.into(),
            citations: vec![Citation {
                source_tag: crate::model::SourceTag::Direct,
                uid: "1607".into(),
                title: None,
            }],
            confidence: 0.9,
            created_at: Utc::now(),
            last_validated_at: Utc::now(),
            usage_count: 0,
            source_plan_fingerprint: "fp".into(),
        }
    }

    #[tokio::test]
    async fn miss_then_admit_then_hit() {
        let cache = AnswerCache::new(chrono::Duration::days(30), Duration::from_secs(5));
        let permit = match cache.acquire("fp1").await {
            Lookup::Miss(permit) => permit,
            Lookup::Hit(_) => panic!("expected miss on first lookup"),
        };
        assert!(permit.can_admit());
        permit.finish(Some(sample_entry("answer [1607]"))).await;

        match cache.acquire("fp1").await {
            Lookup::Hit(entry) => assert_eq!(entry.answer, "answer [1607]"),
            Lookup::Miss(_) => panic!("expected hit after admission"),
        }
    }

    #[tokio::test]
    async fn concurrent_requesters_wait_for_builder() {
        let cache = AnswerCache::new(chrono::Duration::days(30), Duration::from_secs(5));
        let permit = match cache.acquire("fp1").await {
            Lookup::Miss(permit) => permit,
            Lookup::Hit(_) => panic!("expected miss"),
        };

        let waiter_cache = cache.clone();
        let waiter = tokio::spawn(async move { waiter_cache.acquire("fp1").await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        permit.finish(Some(sample_entry("answer [1607]"))).await;

        match waiter.await.unwrap() {
            Lookup::Hit(entry) => assert_eq!(entry.answer, "answer [1607]"),
            Lookup::Miss(_) => panic!("waiter should have seen the admitted entry"),
        }
    }

    #[tokio::test]
    async fn abandoned_build_releases_waiters_to_independent_build() {
        let cache = AnswerCache::new(chrono::Duration::days(30), Duration::from_secs(5));
        let permit = match cache.acquire("fp1").await {
            Lookup::Miss(permit) => permit,
            Lookup::Hit(_) => panic!("expected miss"),
        };

        let waiter_cache = cache.clone();
        let waiter = tokio::spawn(async move { waiter_cache.acquire("fp1").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        permit.finish(None).await;

        match waiter.await.unwrap() {
            Lookup::Miss(permit) => assert!(!permit.can_admit()),
            Lookup::Hit(_) => panic!("no entry was admitted, waiter must independently build"),
        }
    }

    #[test]
    fn quality_gate_enforces_length_confidence_and_citation_thresholds() {
        let long_answer = format!("{} [1607]", "x".repeat(101));
        assert!(passes_quality_gate(&long_answer, 0.7, false, false, 100, 0.7));
        assert!(!passes_quality_gate("short [1607]", 0.7, false, false, 100, 0.7));
        assert!(!passes_quality_gate(&long_answer, 0.5, false, false, 100, 0.7));
        assert!(!passes_quality_gate(&long_answer, 0.7, true, false, 100, 0.7));
        assert!(!passes_quality_gate(&long_answer, 0.7, false, true, 100, 0.7));
    }
}
