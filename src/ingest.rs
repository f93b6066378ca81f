//! Plain-text document ingestion.
//!
//! Walks a file or directory for `.txt` and `.md` files and adds each one to
//! a (tenant, agent) collection as a single [`StoredDocument`]. Text
//! extraction from binary formats happens elsewhere; this path only reads
//! UTF-8 text.

use std::path::Path;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use runbook_harness_core::models::{CollectionKey, StoredDocument};

use crate::analyze::AlertService;
use crate::config::Config;

const EXTENSIONS: &[&str] = &["txt", "md"];

/// Stable document id derived from the file name.
pub fn document_id(filename: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(filename.as_bytes()));
    format!("doc_{}", &digest[..16])
}

/// Collects ingestible documents under `root`.
///
/// Filenames are relative to `root` (or the bare file name when `root` is a
/// file) so ids do not depend on where the tree is mounted. Empty files are
/// skipped.
pub fn collect_documents(root: &Path) -> Result<Vec<StoredDocument>> {
    if !root.exists() {
        bail!("Path does not exist: {}", root.display());
    }

    let uploaded_at = chrono::Utc::now().to_rfc3339();
    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_lowercase();
        if !EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if text.trim().is_empty() {
            warn!(path = %path.display(), "skipping empty document");
            continue;
        }

        let filename = match path.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().replace('\\', "/"),
            _ => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        documents.push(StoredDocument {
            id: document_id(&filename),
            text,
            filename,
            file_type: ext,
            uploaded_at: uploaded_at.clone(),
        });
    }

    Ok(documents)
}

/// Run the `ingest` command.
pub async fn run_ingest(config: &Config, key: CollectionKey, path: &Path) -> Result<()> {
    let documents = collect_documents(path)?;
    if documents.is_empty() {
        println!("No .txt or .md documents found under {}", path.display());
        return Ok(());
    }

    let service = AlertService::from_config(config).await?;
    if !service.add_documents(key, &documents).await {
        bail!(
            "Failed to add {} documents to collection {}",
            documents.len(),
            key
        );
    }

    info!(collection = %key, documents = documents.len(), "ingest complete");
    println!("ingested {} documents into {}", documents.len(), key);
    for d in &documents {
        println!("  {}  {}", d.id, d.filename);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_id_is_stable() {
        let a = document_id("runbooks/payments.md");
        assert_eq!(a, document_id("runbooks/payments.md"));
        assert_ne!(a, document_id("runbooks/orders.md"));
        assert!(a.starts_with("doc_"));
        assert_eq!(a.len(), 4 + 16);
    }

    #[test]
    fn test_collects_text_files_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a.md"), "[Alerting] Disk full alert\nHow to respond: clean /var").unwrap();
        std::fs::write(tmp.path().join("sub/b.TXT"), "Z12 Queue lag\nHow to respond: scale").unwrap();
        std::fs::write(tmp.path().join("c.pdf"), "binary").unwrap();
        std::fs::write(tmp.path().join("empty.md"), "  \n").unwrap();

        let docs = collect_documents(tmp.path()).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.md", "sub/b.TXT"]);
        assert_eq!(docs[1].file_type, "txt");
        assert_eq!(docs[0].id, document_id("a.md"));
    }

    #[test]
    fn test_single_file_uses_bare_name() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("one.txt");
        std::fs::write(&file, "content here").unwrap();
        let docs = collect_documents(&file).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "one.txt");
    }

    #[test]
    fn test_missing_path_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(collect_documents(&tmp.path().join("nope")).is_err());
    }
}
