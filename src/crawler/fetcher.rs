//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with a proper user agent string
//! - GET requests with a per-attempt timeout
//! - Linear backoff between attempts
//! - Turning an exhausted retry budget into one terminal error

use crate::config::{CrawlerConfig, UserAgentConfig};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// How hard the fetcher tries before giving up on a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,
    /// Timeout of each single attempt
    pub timeout: Duration,
    /// Attempt `n` is followed by a pause of `n * base_delay`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: config.timeout(),
            base_delay: config.retry_base_delay(),
        }
    }

    /// Pause after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Failure of a single attempt; retried
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

/// Terminal fetch failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Builds an HTTP client with proper configuration
///
/// Request timeouts are applied per attempt by [`fetch_page`]; the client
/// only bounds connection setup.
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL)
    let user_agent = format!(
        "{}/{} (+{})",
        config.crawler_name, config.crawler_version, config.contact_url
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches `url` and returns its body
///
/// Any transport error or non-2xx status counts as a failed attempt. Failed
/// attempts are logged and retried after a linearly growing pause until
/// `policy.max_retries` attempts were made; only then is an error returned.
pub async fn fetch_page(
    client: &Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<String, FetchError> {
    let attempts = policy.max_retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match fetch_once(client, url, policy.timeout).await {
            Ok(body) => {
                if attempt > 1 {
                    tracing::debug!("Fetched {} on attempt {}", url, attempt);
                }
                return Ok(body);
            }
            Err(e) => {
                tracing::warn!(
                    "Fetch of {} failed on attempt {}/{}: {}",
                    url,
                    attempt,
                    attempts,
                    e
                );
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }

    Err(FetchError::Exhausted {
        url: url.to_string(),
        attempts,
        last_error,
    })
}

async fn fetch_once(client: &Client, url: &str, timeout: Duration) -> Result<String, TransportError> {
    let response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }

    Ok(response.text().await?)
}
