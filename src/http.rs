//! Shared HTTP plumbing for model providers.
//!
//! Provider calls retry transient failures with exponential backoff:
//! HTTP 429 and 5xx retry, other 4xx fail at once, network errors retry.
//! Delays run 1s, 2s, 4s, ... capped at 32s.

use anyhow::{bail, Result};
use std::time::Duration;

/// POSTs `body` to `url`, retrying 429/5xx and network errors with backoff.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, delay_secs = delay.as_secs(), "{label} retry");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} connection error at {}: {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

/// GETs `url` once and fails on any non-success status.
pub async fn get_ok(client: &reqwest::Client, url: &str, bearer: Option<&str>, label: &str) -> Result<()> {
    let mut req = client.get(url);
    if let Some(token) = bearer {
        req = req.header("Authorization", format!("Bearer {}", token));
    }
    let response = req
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{} connection error at {}: {}", label, url, e))?;
    let status = response.status();
    if !status.is_success() {
        bail!("{} health check failed: HTTP {}", label, status);
    }
    Ok(())
}
