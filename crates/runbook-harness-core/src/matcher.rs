//! Alert-to-runbook matching.
//!
//! [`AlertMatcher::find`] runs a per-call pipeline:
//!
//! 1. **Cache**: a fresh [`ResultCache`] entry short-circuits everything.
//! 2. **First-line tier**: each exact candidate (extraction order) against
//!    each stored document's first non-empty line (store order). First hit
//!    wins with `distance = 0.0`.
//! 3. **Full-text tier**: the same scan against whole document bodies.
//! 4. **Semantic fallback**: nearest neighbours from the store, re-sorted
//!    by `(!has_first_line_match, distance)`.
//! 5. The resulting list, empty or not, is cached before returning.
//!
//! Store failures propagate as [`StoreError`](crate::StoreError); only a
//! successful search is ever cached.

use std::sync::Arc;

use tracing::debug;

use crate::cache::ResultCache;
use crate::error::Result;
use crate::keywords::{extract_candidates, first_line, is_exact_match};
use crate::models::{AlertQuery, CollectionKey, MatchResult, MatchType, StoredDocument};
use crate::store::DocumentStore;

pub struct AlertMatcher {
    store: Arc<dyn DocumentStore>,
    cache: Arc<ResultCache>,
}

impl AlertMatcher {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ResultCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Finds the runbook entries for `query_text` in `key`'s collection, best first.
    pub async fn find(
        &self,
        key: CollectionKey,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<MatchResult>> {
        let cache_key = ResultCache::key(key, query_text, k);
        if let Some(results) = self.cache.get(&cache_key) {
            debug!(collection = %key, results = results.len(), "match cache hit");
            return Ok(results);
        }

        let query = extract_candidates(query_text);
        debug!(
            collection = %key,
            candidates = ?query.candidate_names,
            codes = ?query.codes,
            "extracted alert candidates"
        );

        let results = match self.exact_match(key, &query).await? {
            Some(hit) => vec![hit],
            None => self.semantic_match(key, &query, k).await?,
        };

        self.cache.insert(cache_key, results.clone());
        Ok(results)
    }

    async fn exact_match(
        &self,
        key: CollectionKey,
        query: &AlertQuery,
    ) -> Result<Option<MatchResult>> {
        let candidates = query.exact_candidates();
        if candidates.is_empty() {
            return Ok(None);
        }

        let docs = self.store.list_all(key).await?;
        if docs.is_empty() {
            return Ok(None);
        }

        if let Some(hit) = scan(&candidates, &docs, MatchType::FirstLine) {
            return Ok(Some(hit));
        }
        Ok(scan(&candidates, &docs, MatchType::FullText))
    }

    async fn semantic_match(
        &self,
        key: CollectionKey,
        query: &AlertQuery,
        k: usize,
    ) -> Result<Vec<MatchResult>> {
        let mut results = self.store.query_nearest(key, &query.raw_text, k).await?;
        for r in &mut results {
            r.has_first_line_match = first_line_echoes(&r.first_line, query);
        }
        rank_semantic(&mut results);
        Ok(results)
    }
}

fn scan(candidates: &[&str], docs: &[StoredDocument], tier: MatchType) -> Option<MatchResult> {
    for candidate in candidates {
        for doc in docs {
            let haystack = match tier {
                MatchType::FirstLine => first_line(&doc.text),
                _ => doc.text.as_str(),
            };
            if !haystack.is_empty() && is_exact_match(candidate, haystack) {
                debug!(candidate, document = %doc.id, tier = %tier, "exact match");
                return Some(MatchResult::exact(doc, tier, candidate));
            }
        }
    }
    None
}

fn first_line_echoes(line: &str, query: &AlertQuery) -> bool {
    let line = line.to_lowercase();
    query.keywords.iter().any(|kw| line.contains(kw.as_str()))
}

/// Sorts semantic results: first-line keyword hits ahead, then ascending distance.
///
/// The sort is stable, so equal entries keep the store's order.
pub fn rank_semantic(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        (!a.has_first_line_match)
            .cmp(&!b.has_first_line_match)
            .then(a.distance.total_cmp(&b.distance))
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{ManualClock, DEFAULT_TTL};
    use crate::error::StoreError;

    /// Scripted store that counts every call.
    #[derive(Default)]
    struct FakeStore {
        docs: Vec<StoredDocument>,
        nearest: Vec<MatchResult>,
        fail: bool,
        list_calls: AtomicUsize,
        query_calls: AtomicUsize,
    }

    impl FakeStore {
        fn calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst) + self.query_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn add_documents(&self, _: CollectionKey, _: &[StoredDocument]) -> bool {
            true
        }

        async fn query_nearest(
            &self,
            _: CollectionKey,
            _: &str,
            k: usize,
        ) -> Result<Vec<MatchResult>> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Index("disk I/O error".to_string()));
            }
            Ok(self.nearest.iter().take(k).cloned().collect())
        }

        async fn list_all(&self, _: CollectionKey) -> Result<Vec<StoredDocument>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Unavailable {
                    path: "/nowhere".to_string(),
                    message: "cannot open".to_string(),
                });
            }
            Ok(self.docs.clone())
        }

        async fn drop_collection(&self, _: CollectionKey) -> bool {
            true
        }

        async fn count(&self, _: CollectionKey) -> Result<usize> {
            Ok(self.docs.len())
        }
    }

    fn doc(id: &str, text: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            text: text.to_string(),
            filename: format!("{id}.md"),
            file_type: "md".to_string(),
            uploaded_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn matcher(store: Arc<FakeStore>) -> (AlertMatcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(ResultCache::with_clock(DEFAULT_TTL, clock.clone()));
        (AlertMatcher::new(store, cache), clock)
    }

    const KEY: CollectionKey = CollectionKey {
        tenant_id: 1,
        agent_id: 5,
    };

    #[tokio::test]
    async fn test_first_line_match_beats_semantic() {
        let store = Arc::new(FakeStore {
            docs: vec![
                doc("other", "Memory pressure\nmentions High CPU Usage in passing"),
                doc("cpu", "[Alerting] High CPU Usage alert\nКак реагировать: restart service X"),
            ],
            nearest: vec![MatchResult::semantic(&doc("other", "Memory pressure"), 0.01)],
            ..Default::default()
        });
        let (m, _) = matcher(store.clone());
        let results = m
            .find(KEY, "[Alerting] High CPU Usage alert firing at 10:00", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.document_id, "cpu");
        assert_eq!(results[0].match_type(), MatchType::FirstLine);
        assert_eq!(results[0].distance, 0.0);
        assert!(results[0].has_first_line_match);
        assert_eq!(store.query_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_text_tier_when_no_header_matches() {
        let store = Arc::new(FakeStore {
            docs: vec![
                doc("a", "Storage runbook\nnothing here"),
                doc("b", "Network runbook\nz735 Invalid packets\nHow to respond: page netops"),
            ],
            ..Default::default()
        });
        let (m, _) = matcher(store);
        let results = m.find(KEY, "z735 Invalid packets alert", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.document_id, "b");
        assert_eq!(results[0].match_type(), MatchType::FullText);
        assert!(!results[0].has_first_line_match);
        assert_eq!(results[0].matched_candidate.as_deref(), Some("Invalid packets"));
    }

    #[tokio::test]
    async fn test_no_candidates_and_empty_collection_yield_empty() {
        let store = Arc::new(FakeStore::default());
        let (m, _) = matcher(store.clone());
        let results = m.find(KEY, "something odd happened", 3).await.unwrap();
        assert!(results.is_empty());
        // no candidates: the exact tiers never list the collection
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.query_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_semantic_results_promote_first_line_hits() {
        let a = doc("plain", "Gateway certificates\nrotate them");
        let b = doc("hit", "Disk latency on storage\nsteps");
        let store = Arc::new(FakeStore {
            nearest: vec![MatchResult::semantic(&a, 0.25), MatchResult::semantic(&b, 0.40)],
            ..Default::default()
        });
        let (m, _) = matcher(store);
        let results = m
            .find(KEY, "[Alerting] Storage Latency Warning alert", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.document_id, "hit");
        assert!(results[0].has_first_line_match);
        assert_eq!(results[1].metadata.document_id, "plain");
        assert_eq!(results[1].distance, 0.25);
    }

    #[test]
    fn test_rank_tie_break_on_equal_distance() {
        let mut results = vec![
            MatchResult::semantic(&doc("first", "x"), 0.3),
            MatchResult::semantic(&doc("second", "y"), 0.3),
        ];
        results[1].has_first_line_match = true;
        rank_semantic(&mut results);
        assert_eq!(results[0].metadata.document_id, "second");
    }

    #[test]
    fn test_rank_within_tier_by_distance() {
        let mut results = vec![
            MatchResult::semantic(&doc("c", "x"), 0.9),
            MatchResult::semantic(&doc("a", "x"), 0.1),
            MatchResult::semantic(&doc("b", "x"), 0.5),
        ];
        rank_semantic(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.metadata.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_repeat_query_is_served_from_cache() {
        let store = Arc::new(FakeStore {
            docs: vec![doc("cpu", "[Alerting] High CPU Usage alert\nHow to respond: scale out")],
            ..Default::default()
        });
        let (m, clock) = matcher(store.clone());
        let text = "[Alerting] High CPU Usage alert";
        let first = m.find(KEY, text, 3).await.unwrap();
        clock.advance(Duration::from_secs(1));
        let second = m.find(KEY, text, 3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_hits_store_again() {
        let store = Arc::new(FakeStore::default());
        let (m, clock) = matcher(store.clone());
        m.find(KEY, "z999 unknown spike", 3).await.unwrap();
        let after_first = store.calls();
        m.find(KEY, "z999 unknown spike", 3).await.unwrap();
        assert_eq!(store.calls(), after_first);
        clock.advance(DEFAULT_TTL);
        m.find(KEY, "z999 unknown spike", 3).await.unwrap();
        assert_eq!(store.calls(), after_first * 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates_and_is_not_cached() {
        let store = Arc::new(FakeStore {
            fail: true,
            ..Default::default()
        });
        let (m, _) = matcher(store.clone());
        let err = m.find(KEY, "[Alerting] High CPU Usage alert", 3).await;
        assert!(matches!(err, Err(StoreError::Unavailable { .. })));
        assert!(m.cache().is_empty());
    }
}
