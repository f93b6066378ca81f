//! Constrained answer generation.
//!
//! [`ResponseGenerator`] is the only place where failures turn into text.
//! It short-circuits to the not-found answer when there is no context,
//! enforces a hard timeout on the completion call, sanitizes whatever the
//! model returns, and converts every failure into the generic error string.
//! Nothing raised by a completion backend escapes [`ResponseGenerator::generate`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use runbook_harness_core::response::{build_prompt, error_message, sanitize, ResponsePolicy, NOT_FOUND};

use crate::completion::CompletionProvider;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("completion timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Backend failure. The detail is logged, never shown.
    #[error("completion provider error")]
    Provider(String),

    #[error("completion provider is disabled")]
    Disabled,
}

pub struct ResponseGenerator {
    provider: Arc<dyn CompletionProvider>,
    policy: ResponsePolicy,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>, policy: ResponsePolicy, timeout: Duration) -> Self {
        Self {
            provider,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &ResponsePolicy {
        &self.policy
    }

    /// Produces the final answer for `alert_text` from `context`.
    ///
    /// Returns the sanitized model answer, [`NOT_FOUND`], or the generic
    /// error string.
    pub async fn generate(&self, instructions: &str, context: &str, alert_text: &str) -> String {
        if context.trim().is_empty() {
            debug!("empty context, skipping completion");
            return NOT_FOUND.to_string();
        }

        let prompt = build_prompt(instructions, context, alert_text, &self.policy.labels);
        match self.complete(&prompt).await {
            Ok(raw) => {
                let answer = sanitize(&raw, &self.policy);
                if answer == NOT_FOUND {
                    debug!(raw_len = raw.len(), "model answer rejected by post-processing");
                }
                answer
            }
            Err(e) => {
                if let GenerationError::Provider(detail) = &e {
                    warn!(provider = self.provider.name(), error = %detail, "completion failed");
                } else {
                    warn!(provider = self.provider.name(), error = %e, "completion failed");
                }
                error_message(&e)
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.timeout, self.provider.complete(prompt)).await {
            Err(_) => Err(GenerationError::Timeout {
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(match e.downcast::<GenerationError>() {
                Ok(typed) => typed,
                Err(other) => GenerationError::Provider(format!("{:#}", other)),
            }),
            Ok(Ok(text)) => Ok(text),
        }
    }
}
