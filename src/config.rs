//! TOML configuration.
//!
//! One file configures storage, retrieval, generation, providers, the HTTP
//! server, logging and the agent registry. Every optional field has a
//! default; [`load_config`] validates the result and names the offending
//! field on failure.
//!
//! ```toml
//! [db]
//! path = "./data/rbh.sqlite"
//!
//! [store]
//! backend = "sqlite"
//! base_path = "./data/collections"
//!
//! [retrieval]
//! result_count = 3
//! cache_ttl_secs = 300
//!
//! [completion]
//! provider = "ollama"
//! model = "llama3.2:3b"
//!
//! [[agents]]
//! tenant_id = 1
//! agent_id = 5
//! name = "oncall"
//! prompt = "You are the on-call assistant."
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use runbook_harness_core::models::CollectionKey;
use runbook_harness_core::response::ResponsePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// Location of the analysis log database.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `"sqlite"` (one file per collection) or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            base_path: default_base_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_base_path() -> PathBuf {
    PathBuf::from("./data/collections")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_result_count")]
    pub result_count: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            result_count: default_result_count(),
            cache_ttl_secs: default_cache_ttl_secs(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_result_count() -> usize {
    3
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_excerpt_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_repetition_threshold")]
    pub repetition_threshold: f64,
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,
    #[serde(default = "default_response_labels")]
    pub response_labels: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            repetition_threshold: default_repetition_threshold(),
            min_response_chars: default_min_response_chars(),
            response_labels: default_response_labels(),
        }
    }
}

impl GenerationConfig {
    pub fn policy(&self) -> ResponsePolicy {
        ResponsePolicy {
            min_chars: self.min_response_chars,
            repetition_threshold: self.repetition_threshold,
            labels: self.response_labels.clone(),
        }
    }
}

fn default_repetition_threshold() -> f64 {
    0.3
}
fn default_min_response_chars() -> usize {
    10
}
fn default_response_labels() -> Vec<String> {
    vec!["Как реагировать".to_string(), "How to respond".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"`, `"hash"`, `"openai"`, `"ollama"` or `"local"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Providers that call out to a real model and need `model` + `dims`.
    pub fn needs_model(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `"disabled"`, `"ollama"` or `"openai"`.
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repeat_penalty: default_repeat_penalty(),
            timeout_secs: default_completion_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_completion_provider() -> String {
    "disabled".to_string()
}
fn default_completion_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_temperature() -> f32 {
    0.05
}
fn default_top_p() -> f32 {
    0.9
}
fn default_top_k() -> u32 {
    40
}
fn default_repeat_penalty() -> f32 {
    1.1
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One agent: an instruction prompt bound to a (tenant, agent) collection.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub tenant_id: u64,
    pub agent_id: u64,
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AgentConfig {
    pub fn key(&self) -> CollectionKey {
        CollectionKey::new(self.tenant_id, self.agent_id)
    }
}

impl Config {
    /// Looks up the agent registered for `key`.
    pub fn agent(&self, key: CollectionKey) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.key() == key)
    }

    /// Config with every default and the given database path, for tests and tooling.
    pub fn minimal(db_path: PathBuf) -> Self {
        Self {
            db: DbConfig { path: db_path },
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            agents: Vec::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    // Validate retrieval
    if config.retrieval.result_count < 1 {
        bail!("retrieval.result_count must be >= 1");
    }
    if config.retrieval.cache_ttl_secs < 1 {
        bail!("retrieval.cache_ttl_secs must be >= 1");
    }
    if config.retrieval.excerpt_chars < 1 {
        bail!("retrieval.excerpt_chars must be >= 1");
    }

    // Validate generation
    let threshold = config.generation.repetition_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        bail!("generation.repetition_threshold must be in (0.0, 1.0]");
    }
    if config.generation.response_labels.is_empty()
        || config
            .generation
            .response_labels
            .iter()
            .any(|l| l.trim().is_empty())
    {
        bail!("generation.response_labels must be a non-empty list of non-empty labels");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.needs_model() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.completion.timeout_secs == 0 {
        bail!("completion.timeout_secs must be > 0");
    }

    // Validate agents
    let mut seen = HashSet::new();
    for agent in &config.agents {
        if !seen.insert(agent.key()) {
            bail!(
                "duplicate agent for tenant {} / agent {}",
                agent.tenant_id,
                agent.agent_id
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let cfg = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(cfg.retrieval.result_count, 3);
        assert_eq!(cfg.retrieval.cache_ttl_secs, 300);
        assert_eq!(cfg.retrieval.excerpt_chars, 500);
        assert_eq!(cfg.store.backend, "sqlite");
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.completion.provider, "disabled");
        assert_eq!(cfg.completion.model, "llama3.2:3b");
        assert_eq!(cfg.completion.timeout_secs, 60);
        assert!((cfg.completion.temperature - 0.05).abs() < f32::EPSILON);
        assert_eq!(cfg.generation.policy(), ResponsePolicy::default());
    }

    #[test]
    fn test_agents_lookup() {
        let cfg = parse(
            r#"
[db]
path = "x.sqlite"

[[agents]]
tenant_id = 1
agent_id = 5
name = "oncall"
prompt = "be terse"

[[agents]]
tenant_id = 2
agent_id = 5
name = "other"
active = false
"#,
        )
        .unwrap();
        let a = cfg.agent(CollectionKey::new(1, 5)).unwrap();
        assert_eq!(a.name, "oncall");
        assert!(a.active);
        assert!(!cfg.agent(CollectionKey::new(2, 5)).unwrap().active);
        assert!(cfg.agent(CollectionKey::new(3, 5)).is_none());
    }

    #[test]
    fn test_rejects_duplicate_agents() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"

[[agents]]
tenant_id = 1
agent_id = 5
name = "a"

[[agents]]
tenant_id = 1
agent_id = 5
name = "b"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate agent"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        for (extra, needle) in [
            ("[retrieval]\nresult_count = 0\n", "result_count"),
            ("[retrieval]\ncache_ttl_secs = 0\n", "cache_ttl_secs"),
            ("[generation]\nrepetition_threshold = 1.5\n", "repetition_threshold"),
            ("[generation]\nresponse_labels = []\n", "response_labels"),
            ("[embedding]\nprovider = \"openai\"\n", "embedding.dims"),
            ("[embedding]\nprovider = \"bogus\"\n", "Unknown embedding provider"),
            ("[completion]\nprovider = \"bogus\"\n", "Unknown completion provider"),
            ("[completion]\ntimeout_secs = 0\n", "timeout_secs"),
            ("[store]\nbackend = \"redis\"\n", "Unknown store backend"),
        ] {
            let err = parse(&format!("{base}{extra}")).unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "expected '{needle}' in '{err}'"
            );
        }
    }
}
