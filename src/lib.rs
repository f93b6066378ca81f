//! # Runbook Harness
//!
//! Alert-to-runbook matching for on-call agents.
//!
//! Each (tenant, agent) pair owns a collection of runbook documents. An
//! incoming alert is parsed for alert names, codes and metric keywords,
//! matched against the collection (first-line exact, then full-text exact,
//! then semantic), and answered either verbatim from the matched runbook or
//! by a tightly constrained completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────────────┐
//! │  Alert   │──▶│  Extractor   │──▶│   Matcher   │──▶│ ResponseGenerator │
//! └──────────┘   └──────────────┘   │ (+ cache)   │   └───────────────────┘
//!                                   └──────┬──────┘
//!                                          ▼
//!                                  ┌───────────────┐
//!                                  │ DocumentStore │  one SQLite file per
//!                                  └───────────────┘  (tenant, agent)
//! ```
//!
//! The pure pieces (models, extractor, matcher, cache, post-processing) live
//! in `runbook-harness-core`; this crate adds storage, providers and the
//! CLI/HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`analyze`] | [`AlertService`](analyze::AlertService) entry point |
//! | [`index`] | SQLite collection store and handle pool |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`completion`] | Completion provider abstraction |
//! | [`generate`] | Constrained answer generation |
//! | [`analysis_log`] | Record of completed analyses |
//! | [`ingest`] | Plain-text document ingestion |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis_log;
pub mod analyze;
pub mod completion;
pub mod config;
pub mod db;
pub mod doctor;
pub mod embedding;
pub mod generate;
pub mod http;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod stats;
