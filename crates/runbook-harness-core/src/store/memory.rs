//! In-memory [`DocumentStore`] for tests and embedded use.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Nearest
//! neighbour search is brute-force cosine distance over the collection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::warn;

use crate::embedding::{cosine_distance, embed_one, Embedder};
use crate::error::{Result, StoreError};
use crate::models::{CollectionKey, MatchResult, StoredDocument};

use super::DocumentStore;

struct Entry {
    doc: StoredDocument,
    vector: Vec<f32>,
}

/// In-memory document store.
pub struct InMemoryDocumentStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<CollectionKey, Vec<Entry>>>,
}

impl InMemoryDocumentStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add_documents(&self, key: CollectionKey, documents: &[StoredDocument]) -> bool {
        if let Some(doc) = documents.iter().find(|d| d.text.trim().is_empty()) {
            warn!(collection = %key, document = %doc.id, "refusing document with blank text");
            return false;
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = match self.embedder.embed(&texts).await {
            Ok(v) if v.len() == documents.len() => v,
            Ok(v) => {
                warn!(
                    collection = %key,
                    expected = documents.len(),
                    got = v.len(),
                    "embedding count mismatch"
                );
                return false;
            }
            Err(e) => {
                warn!(collection = %key, error = %e, "failed to embed documents");
                return false;
            }
        };

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let entries = collections.entry(key).or_default();
        for (doc, vector) in documents.iter().zip(vectors) {
            match entries.iter_mut().find(|e| e.doc.id == doc.id) {
                Some(existing) => {
                    existing.doc = doc.clone();
                    existing.vector = vector;
                }
                None => entries.push(Entry {
                    doc: doc.clone(),
                    vector,
                }),
            }
        }
        true
    }

    async fn query_nearest(
        &self,
        key: CollectionKey,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<MatchResult>> {
        let exists = self
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&key);
        if !exists {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), query_text)
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;

        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = collections.get(&key) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &StoredDocument)> = entries
            .iter()
            .map(|e| (cosine_distance(&query_vec, &e.vector), &e.doc))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, doc)| MatchResult::semantic(doc, distance))
            .collect())
    }

    async fn list_all(&self, key: CollectionKey) -> Result<Vec<StoredDocument>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(&key)
            .map(|entries| entries.iter().map(|e| e.doc.clone()).collect())
            .unwrap_or_default())
    }

    async fn drop_collection(&self, key: CollectionKey) -> bool {
        self.collections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        true
    }

    async fn count(&self, key: CollectionKey) -> Result<usize> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections.get(&key).map(Vec::len).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    fn doc(id: &str, text: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            text: text.to_string(),
            filename: format!("{id}.md"),
            file_type: "md".to_string(),
            uploaded_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new(Arc::new(HashEmbedder::default()))
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty_not_error() {
        let s = store();
        let key = CollectionKey::new(1, 1);
        assert!(s.query_nearest(key, "anything", 3).await.unwrap().is_empty());
        assert!(s.list_all(key).await.unwrap().is_empty());
        assert_eq!(s.count(key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id_in_place() {
        let s = store();
        let key = CollectionKey::new(1, 1);
        assert!(s.add_documents(key, &[doc("a", "first"), doc("b", "second")]).await);
        assert!(s.add_documents(key, &[doc("a", "first v2")]).await);
        let all = s.list_all(key).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "first v2");
        assert_eq!(all[1].id, "b");
    }

    #[tokio::test]
    async fn test_collections_are_isolated_by_tenant() {
        let s = store();
        assert!(
            s.add_documents(CollectionKey::new(1, 5), &[doc("a", "disk full runbook")])
                .await
        );
        let other = CollectionKey::new(2, 5);
        assert!(s.query_nearest(other, "disk full", 3).await.unwrap().is_empty());
        assert!(s.list_all(other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_nearest_orders_by_distance_and_limits() {
        let s = store();
        let key = CollectionKey::new(1, 1);
        s.add_documents(
            key,
            &[
                doc("far", "certificate expired on gateway"),
                doc("near", "disk usage high on storage"),
                doc("mid", "disk latency"),
            ],
        )
        .await;
        let results = s.query_nearest(key, "disk usage high", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.document_id, "near");
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_blank_text_rejects_whole_batch() {
        let s = store();
        let key = CollectionKey::new(4, 4);
        assert!(!s.add_documents(key, &[doc("a", "disk full"), doc("b", "  \n\t")]).await);
        assert_eq!(s.count(key).await.unwrap(), 0);
        assert!(s.list_all(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_is_idempotent() {
        let s = store();
        let key = CollectionKey::new(3, 3);
        s.add_documents(key, &[doc("a", "x")]).await;
        assert!(s.drop_collection(key).await);
        assert!(s.drop_collection(key).await);
        assert_eq!(s.count(key).await.unwrap(), 0);
    }
}
