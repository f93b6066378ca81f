//! # Runbook Harness Core
//!
//! Runtime-free logic for Runbook Harness: alert data models, candidate
//! extraction, the document store abstraction, the alert matcher, the
//! result cache, and response post-processing.
//!
//! This crate contains no tokio, sqlx, network, or filesystem code.
//! Concrete SQLite storage, embedding and completion providers live in
//! the `runbook-harness` app crate.
//!
//! ```text
//! alert text ─▶ keywords::extract_candidates ─▶ AlertMatcher ─▶ response
//!                                               │    ▲
//!                                     ResultCache    DocumentStore
//! ```

pub mod cache;
pub mod embedding;
pub mod error;
pub mod keywords;
pub mod matcher;
pub mod models;
pub mod response;
pub mod store;

pub use error::StoreError;
