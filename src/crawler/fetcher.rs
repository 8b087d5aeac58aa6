//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the discoverer, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - GET requests to fetch page content
//! - Bounded retry with exponential backoff for transient failures
//! - Error classification

use crate::config::HttpConfig;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// A terminal (non-retried) HTTP response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The requested URL
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Page body content
    pub body: String,
}

impl FetchResponse {
    /// Returns true for 2xx responses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why the last attempt of a fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Transport(String),
}

/// Returned once every allowed attempt has failed
#[derive(Debug, Clone, Error)]
#[error("Fetch failed for {url} after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub cause: FetchCause,
}

/// Retry schedule: `max_retries` extra attempts, waiting
/// `backoff_base * 2^(n-1)` before retry `n`
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Returns true for statuses worth another attempt (429 and 5xx)
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use octagon_harvest::config::HttpConfig;
/// use octagon_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP GET with bounded automatic retry
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx/3xx/4xx (not 429) | Returned to the caller |
/// | HTTP 429 | Retry with backoff |
/// | HTTP 5xx | Retry with backoff |
/// | Timeout | Retry with backoff |
/// | Connection / transport error | Retry with backoff |
///
/// Nothing is kept between calls apart from the pooled connections of the
/// underlying client.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    policy: RetryPolicy,
}

impl FetchClient {
    /// Creates a client from the `[http]` configuration
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches a URL using the client's configured timeout
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.fetch_inner(url, None).await
    }

    /// Fetches a URL with an explicit per-request timeout
    pub async fn fetch_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        self.fetch_inner(url, Some(timeout)).await
    }

    async fn fetch_inner(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<FetchResponse, FetchError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let cause = match self.attempt(url, timeout).await {
                Ok(response) => return Ok(response),
                Err(cause) => cause,
            };

            if attempts > self.policy.max_retries {
                return Err(FetchError {
                    url: url.to_string(),
                    attempts,
                    cause,
                });
            }

            let delay = self.policy.delay_for(attempts);
            tracing::warn!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempts,
                url,
                cause,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One request; `Err` means the attempt is retryable
    async fn attempt(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<FetchResponse, FetchCause> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify_error(&e))?;
        let status = response.status();

        if is_retryable_status(status) {
            return Err(FetchCause::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| classify_error(&e))?;
        tracing::debug!("GET {} -> {}", url, status.as_u16());

        Ok(FetchResponse {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

fn classify_error(e: &reqwest::Error) -> FetchCause {
    if e.is_timeout() {
        FetchCause::Timeout
    } else if e.is_connect() {
        FetchCause::Connect(e.to_string())
    } else {
        FetchCause::Transport(e.to_string())
    }
}
