//! SQLite-backed document collections.
//!
//! Each (tenant, agent) collection is its own SQLite file:
//!
//! ```text
//! <store.base_path>/<tenant_id>/<agent_id>/vector_store/index.sqlite
//! ```
//!
//! [`DocumentIndexManager`] is the process-wide owner of open collection
//! handles. It keeps one pool per storage path and creates it at most once,
//! even when several tasks touch a fresh collection concurrently
//! (double-checked under a `tokio::sync::RwLock`). [`SqliteDocumentStore`]
//! implements [`DocumentStore`] on top of it; vectors are stored as
//! little-endian `f32` BLOBs and searched by brute-force cosine distance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use runbook_harness_core::embedding::{blob_to_vec, cosine_distance, embed_one, vec_to_blob, Embedder};
use runbook_harness_core::error::{Result, StoreError};
use runbook_harness_core::models::{CollectionKey, MatchResult, StoredDocument};
use runbook_harness_core::store::memory::InMemoryDocumentStore;
use runbook_harness_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::migrate;

const INDEX_FILE: &str = "index.sqlite";

/// Owner of every open collection handle, keyed by storage path.
pub struct DocumentIndexManager {
    base_path: PathBuf,
    pools: RwLock<HashMap<PathBuf, SqlitePool>>,
}

impl DocumentIndexManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding one collection's files.
    pub fn collection_dir(&self, key: CollectionKey) -> PathBuf {
        self.base_path
            .join(key.tenant_id.to_string())
            .join(key.agent_id.to_string())
            .join("vector_store")
    }

    pub fn collection_path(&self, key: CollectionKey) -> PathBuf {
        self.collection_dir(key).join(INDEX_FILE)
    }

    /// Returns the shared pool for `key`, opening it on first use.
    ///
    /// With `create = false` a collection that was never written yields
    /// `Ok(None)` and nothing is created on disk.
    pub async fn handle(&self, key: CollectionKey, create: bool) -> Result<Option<SqlitePool>> {
        let path = self.collection_path(key);

        if let Some(pool) = self.pools.read().await.get(&path) {
            return Ok(Some(pool.clone()));
        }
        if !create && !path.exists() {
            return Ok(None);
        }

        let mut pools = self.pools.write().await;
        // another task may have opened it while we waited for the lock
        if let Some(pool) = pools.get(&path) {
            return Ok(Some(pool.clone()));
        }

        let unavailable = |e: anyhow::Error| StoreError::Unavailable {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let pool = db::connect_path(&path, 4).await.map_err(unavailable)?;
        migrate::migrate_collection(&pool)
            .await
            .map_err(unavailable)?;

        debug!(path = %path.display(), "opened collection handle");
        pools.insert(path, pool.clone());
        Ok(Some(pool))
    }

    /// Closes and forgets the handle for `key`, if one is open.
    pub async fn release(&self, key: CollectionKey) {
        let path = self.collection_path(key);
        let pool = self.pools.write().await.remove(&path);
        if let Some(pool) = pool {
            pool.close().await;
        }
    }

    /// Number of handles currently cached.
    pub async fn open_handles(&self) -> usize {
        self.pools.read().await.len()
    }
}

fn index_error(e: sqlx::Error) -> StoreError {
    StoreError::Index(e.to_string())
}

/// [`DocumentStore`] backed by per-collection SQLite files.
pub struct SqliteDocumentStore {
    manager: Arc<DocumentIndexManager>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteDocumentStore {
    pub fn new(manager: Arc<DocumentIndexManager>, embedder: Arc<dyn Embedder>) -> Self {
        Self { manager, embedder }
    }

    pub fn manager(&self) -> &DocumentIndexManager {
        &self.manager
    }

    async fn upsert_all(
        &self,
        pool: &SqlitePool,
        documents: &[StoredDocument],
        vectors: &[Vec<f32>],
    ) -> std::result::Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for (doc, vector) in documents.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO documents (id, text, filename, file_type, uploaded_at, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    filename = excluded.filename,
                    file_type = excluded.file_type,
                    uploaded_at = excluded.uploaded_at,
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.text)
            .bind(&doc.filename)
            .bind(&doc.file_type)
            .bind(&doc.uploaded_at)
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
    StoredDocument {
        id: row.get("id"),
        text: row.get("text"),
        filename: row.get("filename"),
        file_type: row.get("file_type"),
        uploaded_at: row.get("uploaded_at"),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn add_documents(&self, key: CollectionKey, documents: &[StoredDocument]) -> bool {
        if documents.is_empty() {
            return true;
        }
        if let Some(doc) = documents.iter().find(|d| d.text.trim().is_empty()) {
            warn!(collection = %key, document = %doc.id, "refusing document with blank text");
            return false;
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = match self.embedder.embed(&texts).await {
            Ok(v) if v.len() == documents.len() => v,
            Ok(v) => {
                warn!(collection = %key, expected = documents.len(), got = v.len(), "embedding count mismatch");
                return false;
            }
            Err(e) => {
                warn!(collection = %key, error = %e, "failed to embed documents");
                return false;
            }
        };

        let pool = match self.manager.handle(key, true).await {
            Ok(Some(pool)) => pool,
            Ok(None) => return false,
            Err(e) => {
                warn!(collection = %key, error = %e, "failed to open collection");
                return false;
            }
        };

        match self.upsert_all(&pool, documents, &vectors).await {
            Ok(()) => {
                info!(collection = %key, documents = documents.len(), "documents indexed");
                true
            }
            Err(e) => {
                warn!(collection = %key, error = %e, "failed to index documents");
                false
            }
        }
    }

    async fn query_nearest(
        &self,
        key: CollectionKey,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<MatchResult>> {
        let Some(pool) = self.manager.handle(key, false).await? else {
            return Ok(Vec::new());
        };

        let query_vec = embed_one(self.embedder.as_ref(), query_text)
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;

        let rows = sqlx::query(
            "SELECT id, text, filename, file_type, uploaded_at, embedding FROM documents ORDER BY seq",
        )
        .fetch_all(&pool)
        .await
        .map_err(index_error)?;

        let mut scored: Vec<(f32, StoredDocument)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (cosine_distance(&query_vec, &blob_to_vec(&blob)), row_to_document(row))
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, doc)| MatchResult::semantic(&doc, distance))
            .collect())
    }

    async fn list_all(&self, key: CollectionKey) -> Result<Vec<StoredDocument>> {
        let Some(pool) = self.manager.handle(key, false).await? else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT id, text, filename, file_type, uploaded_at FROM documents ORDER BY seq",
        )
        .fetch_all(&pool)
        .await
        .map_err(index_error)?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn drop_collection(&self, key: CollectionKey) -> bool {
        self.manager.release(key).await;

        let dir = self.manager.collection_dir(key);
        if !dir.exists() {
            return true;
        }
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(collection = %key, path = %dir.display(), "collection dropped");
                true
            }
            Err(e) => {
                warn!(collection = %key, path = %dir.display(), error = %e, "failed to drop collection");
                false
            }
        }
    }

    async fn count(&self, key: CollectionKey) -> Result<usize> {
        let Some(pool) = self.manager.handle(key, false).await? else {
            return Ok(0);
        };
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .map_err(index_error)?;
        Ok(n as usize)
    }
}

/// Builds the store selected by `[store] backend`.
pub fn open_store(config: &Config, embedder: Arc<dyn Embedder>) -> Arc<dyn DocumentStore> {
    match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryDocumentStore::new(embedder)),
        _ => {
            let manager = Arc::new(DocumentIndexManager::new(&config.store.base_path));
            Arc::new(SqliteDocumentStore::new(manager, embedder))
        }
    }
}
