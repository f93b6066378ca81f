//! Schema setup for both database kinds.
//!
//! The analysis log lives in one database (`[db] path`). Each document
//! collection is its own SQLite file with a `documents` table. All
//! statements are idempotent.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Creates the analysis log schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_analysis_log(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_analysis_log(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_log (
            id TEXT PRIMARY KEY,
            tenant_id INTEGER NOT NULL,
            agent_id INTEGER NOT NULL,
            alert_text TEXT NOT NULL,
            response TEXT NOT NULL,
            match_type TEXT,
            documents_used INTEGER NOT NULL,
            processing_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_log_agent ON analysis_log(tenant_id, agent_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Creates the per-collection document schema.
pub async fn migrate_collection(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            filename TEXT NOT NULL,
            file_type TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
