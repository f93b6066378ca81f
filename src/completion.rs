//! Text-completion backends.
//!
//! The generator needs exactly one capability: `complete(prompt) -> text`,
//! single-turn, non-streaming. [`create_completion`] picks the backend from
//! `[completion] provider`:
//!
//! | Config Value | Backend | Endpoint |
//! |-------------|---------|----------|
//! | `"disabled"` | [`DisabledCompletion`] | none |
//! | `"ollama"` | [`OllamaCompletion`] | `POST {url}/api/generate` |
//! | `"openai"` | [`OpenAICompletion`] | `POST {url}/chat/completions` |
//!
//! Sampling is kept narrow (low temperature, bounded top-p/top-k) so the
//! model copies rather than composes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::generate::GenerationError;
use crate::http::{get_ok, post_json_with_retry};

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Completes `prompt` and returns the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<()>;
}

/// Backend used when `completion.provider = "disabled"`.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(GenerationError::Disabled.into())
    }

    async fn health_check(&self) -> Result<()> {
        bail!("Completion provider is disabled")
    }
}

/// Ollama `/api/generate`, non-streaming.
pub struct OllamaCompletion {
    config: CompletionConfig,
    url: String,
    client: reqwest::Client,
}

impl OllamaCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            url,
            client,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "top_k": self.config.top_k,
                "repeat_penalty": self.config.repeat_penalty,
            },
        })
    }
}

#[async_trait]
impl CompletionProvider for OllamaCompletion {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url),
            None,
            &self.request_body(prompt),
            self.config.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }

    async fn health_check(&self) -> Result<()> {
        get_ok(&self.client, &format!("{}/api/tags", self.url), None, "Ollama").await
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

/// OpenAI-compatible chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAICompletion {
    config: CompletionConfig,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAICompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.config.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }

    async fn health_check(&self) -> Result<()> {
        get_ok(
            &self.client,
            &format!("{}/models", self.url),
            Some(&self.api_key),
            "OpenAI",
        )
        .await
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

pub fn create_completion(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "ollama" => Ok(Arc::new(OllamaCompletion::new(config)?)),
        "openai" => Ok(Arc::new(OpenAICompletion::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}
