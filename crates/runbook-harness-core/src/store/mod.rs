//! Storage abstraction for per-agent document collections.
//!
//! The [`DocumentStore`] trait defines everything the matcher needs from a
//! backend. Every operation is namespaced by a [`CollectionKey`]; no call
//! ever reads across tenants or agents.
//!
//! Implementations must be `Send + Sync`. Reads may run concurrently;
//! concurrent writes to one collection are the caller's to serialize.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CollectionKey, MatchResult, StoredDocument};

/// Per-(tenant, agent) document collection with nearest-neighbour search.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_documents`](DocumentStore::add_documents) | Embed and upsert documents, creating the collection |
/// | [`query_nearest`](DocumentStore::query_nearest) | Up to `k` nearest documents by embedding distance |
/// | [`list_all`](DocumentStore::list_all) | Full collection dump, in store order |
/// | [`drop_collection`](DocumentStore::drop_collection) | Delete the whole collection |
/// | [`count`](DocumentStore::count) | Number of stored documents |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Embeds and upserts `documents` into the collection, creating it if absent.
    ///
    /// Returns `false` on any embedding or index failure instead of erroring;
    /// ingestion is best-effort and the caller decides whether to retry.
    async fn add_documents(&self, key: CollectionKey, documents: &[StoredDocument]) -> bool;

    /// Returns up to `k` documents nearest to `query_text`, ascending by distance.
    ///
    /// A collection that was never created yields an empty list.
    async fn query_nearest(
        &self,
        key: CollectionKey,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<MatchResult>>;

    /// Returns every document in the collection, in insertion order.
    async fn list_all(&self, key: CollectionKey) -> Result<Vec<StoredDocument>>;

    /// Deletes the collection. Idempotent: dropping an absent collection succeeds.
    ///
    /// Returns `false` only if removal failed.
    async fn drop_collection(&self, key: CollectionKey) -> bool;

    /// Number of documents in the collection (`0` if it does not exist).
    async fn count(&self, key: CollectionKey) -> Result<usize>;
}
