//! Alert analysis entry point.
//!
//! [`AlertService`] is the long-lived object a process builds once and
//! shares: it owns the document store, the result cache, the matcher and
//! the generator. A transport layer calls [`AlertService::analyze`] with
//! `(tenant, agent, alert text)` and relays the [`AnalysisOutcome`].
//!
//! # Flow
//!
//! ```text
//! validate agent ─▶ AlertMatcher::find ─┬─ []            ─▶ not-found (no model call)
//!                                       ├─ exact + field ─▶ verbatim runbook field
//!                                       └─ otherwise     ─▶ ResponseGenerator
//! ```
//!
//! Store failures are returned as `Err`; everything after matching yields text.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use runbook_harness_core::cache::ResultCache;
use runbook_harness_core::matcher::AlertMatcher;
use runbook_harness_core::models::{CollectionKey, MatchResult, MatchType, StoredDocument};
use runbook_harness_core::response::{build_context, runbook_answer};
use runbook_harness_core::store::DocumentStore;
use runbook_harness_core::StoreError;

use crate::analysis_log::{AnalysisLog, AnalysisRecord};
use crate::completion::{create_completion, CompletionProvider};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::ResponseGenerator;
use crate::index::open_store;

/// What a transport layer gets back for one alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub response: String,
    pub match_type: Option<MatchType>,
    pub documents_used: usize,
    pub processing_ms: u64,
}

impl AnalysisOutcome {
    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            response: message.to_string(),
            match_type: None,
            documents_used: 0,
            processing_ms: 0,
        }
    }
}

pub struct AlertService {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    matcher: AlertMatcher,
    generator: ResponseGenerator,
    log: Option<AnalysisLog>,
}

impl AlertService {
    /// Builds the service and all of its collaborators from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let store = open_store(config, embedder);
        let completion = create_completion(&config.completion)?;
        let log = AnalysisLog::open(config).await?;
        Ok(Self::new(config.clone(), store, completion, Some(log)))
    }

    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        completion: Arc<dyn CompletionProvider>,
        log: Option<AnalysisLog>,
    ) -> Self {
        let cache = Arc::new(ResultCache::new(Duration::from_secs(
            config.retrieval.cache_ttl_secs,
        )));
        Self::with_cache(config, store, cache, completion, log)
    }

    pub fn with_cache(
        config: Config,
        store: Arc<dyn DocumentStore>,
        cache: Arc<ResultCache>,
        completion: Arc<dyn CompletionProvider>,
        log: Option<AnalysisLog>,
    ) -> Self {
        let generator = ResponseGenerator::new(
            completion,
            config.generation.policy(),
            Duration::from_secs(config.completion.timeout_secs),
        );
        Self {
            matcher: AlertMatcher::new(store.clone(), cache),
            store,
            generator,
            log,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn cache(&self) -> &ResultCache {
        self.matcher.cache()
    }

    /// Ranked matches for `text`; `k` defaults to `retrieval.result_count`.
    pub async fn find_matches(
        &self,
        key: CollectionKey,
        text: &str,
        k: Option<usize>,
    ) -> Result<Vec<MatchResult>, StoreError> {
        let k = k.unwrap_or(self.config.retrieval.result_count);
        self.matcher.find(key, text, k).await
    }

    /// Adds documents and, on success, clears the result cache so new
    /// runbooks are visible immediately.
    pub async fn add_documents(&self, key: CollectionKey, documents: &[StoredDocument]) -> bool {
        let added = self.store.add_documents(key, documents).await;
        if added {
            self.cache().clear();
        }
        added
    }

    pub async fn drop_collection(&self, key: CollectionKey) -> bool {
        let dropped = self.store.drop_collection(key).await;
        if dropped {
            self.cache().clear();
        }
        dropped
    }

    /// Answers one alert for the agent at `key`.
    pub async fn analyze(&self, key: CollectionKey, text: &str) -> Result<AnalysisOutcome, StoreError> {
        let started = Instant::now();

        if text.trim().is_empty() {
            return Ok(AnalysisOutcome::rejected("Alert text must not be empty"));
        }
        let Some(agent) = self.config.agent(key) else {
            return Ok(AnalysisOutcome::rejected("Agent not found"));
        };
        if !agent.active {
            return Ok(AnalysisOutcome::rejected("Agent is inactive"));
        }
        if agent.prompt.trim().is_empty() {
            return Ok(AnalysisOutcome::rejected("Agent prompt is not configured"));
        }

        let results = self.find_matches(key, text, None).await?;
        let match_type = results.first().map(MatchResult::match_type);
        let policy = self.generator.policy();

        let verbatim = results
            .first()
            .filter(|r| r.match_type().is_exact())
            .and_then(|r| runbook_answer(r, policy));

        let (response, documents_used) = match verbatim {
            Some(answer) => (answer, 1),
            None => {
                let context = build_context(&results, self.config.retrieval.excerpt_chars);
                let answer = self.generator.generate(&agent.prompt, &context, text).await;
                (answer, results.len())
            }
        };

        let outcome = AnalysisOutcome {
            success: true,
            response,
            match_type,
            documents_used,
            processing_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            collection = %key,
            match_type = match_type.map(|m| m.as_str()).unwrap_or("none"),
            documents_used,
            processing_ms = outcome.processing_ms,
            "alert analyzed"
        );
        self.record(key, text, &outcome).await;
        Ok(outcome)
    }

    async fn record(&self, key: CollectionKey, text: &str, outcome: &AnalysisOutcome) {
        let Some(log) = &self.log else {
            return;
        };
        let record = AnalysisRecord {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: key.tenant_id,
            agent_id: key.agent_id,
            alert_text: text.to_string(),
            response: outcome.response.clone(),
            match_type: outcome.match_type.map(|m| m.as_str().to_string()),
            documents_used: outcome.documents_used as u64,
            processing_ms: outcome.processing_ms,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = log.append(&record).await {
            warn!(collection = %key, error = %e, "failed to write analysis log");
        }
    }
}

/// Run the `analyze` command: answer one alert and print the response.
pub async fn run_analyze(config: &Config, key: CollectionKey, text: &str, json: bool) -> Result<()> {
    let service = AlertService::from_config(config).await?;
    let outcome = service.analyze(key, text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    if !outcome.success {
        anyhow::bail!("{}", outcome.response);
    }
    println!("{}", outcome.response);
    Ok(())
}

/// Run the `match` command: print ranked matches without generating an answer.
pub async fn run_match(config: &Config, key: CollectionKey, text: &str, k: Option<usize>) -> Result<()> {
    let service = AlertService::from_config(config).await?;
    let results = service.find_matches(key, text, k).await?;

    if results.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{}] {}  distance={:.4}  first_line_match={}",
            i + 1,
            r.match_type(),
            r.metadata.filename,
            r.distance,
            r.has_first_line_match
        );
        println!("    {}", r.first_line);
    }
    Ok(())
}
