//! Collection statistics.
//!
//! A quick summary of what is indexed for one agent: document count, where
//! the collection lives and how big it is on disk. Used by `rbh stats` and
//! `GET /v1/collections/{tenant}/{agent}`.

use anyhow::Result;
use serde::Serialize;

use runbook_harness_core::models::CollectionKey;

use crate::analyze::AlertService;
use crate::config::Config;
use crate::index::DocumentIndexManager;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectionStats {
    pub tenant_id: u64,
    pub agent_id: u64,
    pub documents: usize,
    /// `None` for the in-memory backend.
    pub path: Option<String>,
    pub size_bytes: u64,
}

pub async fn collection_stats(service: &AlertService, key: CollectionKey) -> Result<CollectionStats> {
    let documents = service.store().count(key).await?;
    let config = service.config();

    let (path, size_bytes) = if config.store.backend == "memory" {
        (None, 0)
    } else {
        let path = DocumentIndexManager::new(&config.store.base_path).collection_path(key);
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        (Some(path.display().to_string()), size)
    };

    Ok(CollectionStats {
        tenant_id: key.tenant_id,
        agent_id: key.agent_id,
        documents,
        path,
        size_bytes,
    })
}

/// Run the `stats` command.
pub async fn run_stats(config: &Config, key: CollectionKey) -> Result<()> {
    let service = AlertService::from_config(config).await?;
    let stats = collection_stats(&service, key).await?;
    let agent = config.agent(key).map(|a| a.name.as_str()).unwrap_or("(unregistered)");

    println!("Collection {}", key);
    println!("================");
    println!();
    println!("  Agent:       {}", agent);
    println!("  Backend:     {}", config.store.backend);
    if let Some(path) = &stats.path {
        println!("  Path:        {}", path);
        println!("  Size:        {}", format_bytes(stats.size_bytes));
    }
    println!("  Documents:   {}", stats.documents);
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
