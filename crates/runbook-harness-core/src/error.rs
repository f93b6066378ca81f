//! Typed storage errors.
//!
//! Store failures cross the matcher boundary as [`StoreError`] so callers
//! can tell "no runbook found" (an empty result) apart from "the search
//! itself failed".

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The collection's backing storage could not be opened or read.
    #[error("store unavailable at {path}: {message}")]
    Unavailable { path: String, message: String },

    /// The index rejected a read or write.
    #[error("index error: {0}")]
    Index(String),

    /// The query text could not be embedded.
    #[error("embedding error: {0}")]
    Embedding(String),
}
