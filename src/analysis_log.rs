//! Append-only record of completed alert analyses.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use runbook_harness_core::models::CollectionKey;

use crate::config::Config;
use crate::db;
use crate::migrate;

/// One logged analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub tenant_id: u64,
    pub agent_id: u64,
    pub alert_text: String,
    pub response: String,
    pub match_type: Option<String>,
    pub documents_used: u64,
    pub processing_ms: u64,
    pub created_at: String,
}

#[derive(Clone)]
pub struct AnalysisLog {
    pool: SqlitePool,
}

impl AnalysisLog {
    /// Opens the log database from `[db] path`, creating the schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_analysis_log(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn append(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_log
                (id, tenant_id, agent_id, alert_text, response, match_type, documents_used, processing_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.tenant_id as i64)
        .bind(record.agent_id as i64)
        .bind(&record.alert_text)
        .bind(&record.response)
        .bind(&record.match_type)
        .bind(record.documents_used as i64)
        .bind(record.processing_ms as i64)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent records first, optionally for a single collection.
    pub async fn recent(&self, key: Option<CollectionKey>, limit: i64) -> Result<Vec<AnalysisRecord>> {
        let rows = match key {
            Some(k) => {
                sqlx::query(
                    "SELECT * FROM analysis_log WHERE tenant_id = ? AND agent_id = ? \
                     ORDER BY created_at DESC LIMIT ?",
                )
                .bind(k.tenant_id as i64)
                .bind(k.agent_id as i64)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM analysis_log ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| AnalysisRecord {
                id: row.get("id"),
                tenant_id: row.get::<i64, _>("tenant_id") as u64,
                agent_id: row.get::<i64, _>("agent_id") as u64,
                alert_text: row.get("alert_text"),
                response: row.get("response"),
                match_type: row.get("match_type"),
                documents_used: row.get::<i64, _>("documents_used") as u64,
                processing_ms: row.get::<i64, _>("processing_ms") as u64,
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

/// Run the `logs` command: print recent analyses.
pub async fn run_logs(config: &Config, key: Option<CollectionKey>, limit: i64) -> Result<()> {
    let log = AnalysisLog::open(config).await?;
    let records = log.recent(key, limit).await?;

    if records.is_empty() {
        println!("No analyses logged.");
        return Ok(());
    }

    for r in records {
        println!(
            "{}  {}/{}  {:<10}  docs={}  {}ms",
            r.created_at,
            r.tenant_id,
            r.agent_id,
            r.match_type.as_deref().unwrap_or("-"),
            r.documents_used,
            r.processing_ms
        );
        println!("    alert:    {}", first_line_preview(&r.alert_text));
        println!("    response: {}", first_line_preview(&r.response));
    }
    Ok(())
}

fn first_line_preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    let preview: String = line.chars().take(100).collect();
    if preview.len() < line.len() {
        format!("{}...", preview)
    } else {
        preview
    }
}
