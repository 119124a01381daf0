//! Outbound fetch capability.
//!
//! One HTTP GET of the target URL routed through a proxy endpoint on
//! port 80, with a fixed browser-like User-Agent, a bounded redirect
//! chain, a hard timeout, and only 2xx responses accepted. The response
//! carries its measured wall-clock duration so callers can attribute
//! bandwidth without re-measuring.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config;

/// Port fetches are routed through on the proxy host.
const PROXY_PORT: u16 = 80;

/// Errors that can occur during an outbound fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The proxy address could not be used as an HTTP proxy.
    #[error("Invalid proxy address '{address}': {message}")]
    InvalidProxy { address: String, message: String },

    /// The request failed on the network path.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The fetch exceeded its hard timeout.
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The target answered outside the 2xx range.
    #[error("Unexpected status {0}")]
    Status(u16),
}

/// A fetched response with its transfer measurements.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code of the final response.
    pub status: u16,
    /// Content-Length header, when the target sent one.
    pub content_length: Option<u64>,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Wall-clock time from request start to body fully read.
    pub elapsed: Duration,
}

impl FetchResponse {
    /// Returns the transferred byte count: the Content-Length header when
    /// present, otherwise the serialized body length.
    pub fn transferred_bytes(&self) -> u64 {
        self.content_length.unwrap_or(self.body.len() as u64)
    }
}

/// Computes bandwidth in Mbps from a byte count and elapsed wall-clock
/// time: `bytes * 8 / (seconds * 1_000_000)`.
///
/// A zero-duration transfer yields 0.0 rather than infinity.
pub fn bandwidth_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds == 0.0 {
        return 0.0;
    }

    (bytes as f64 * 8.0) / (seconds * 1_000_000.0)
}

/// Capability interface for issuing a GET through a proxy.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetches `target_url` through the proxy at `proxy_address`.
    ///
    /// # Errors
    ///
    /// Any outcome other than a fully read 2xx response within the
    /// timeout is a `FetchError`.
    async fn fetch(&self, target_url: &str, proxy_address: &str)
        -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetch client.
///
/// A client is built per fetch because the proxy differs per call; the
/// shared process-wide handles of the coordination and record stores are
/// unaffected by this.
pub struct HttpFetchClient {
    timeout: Duration,
    max_redirects: usize,
}

impl HttpFetchClient {
    /// Creates a client with the given timeout and redirect limit.
    pub fn new(timeout: Duration, max_redirects: usize) -> Self {
        Self {
            timeout,
            max_redirects,
        }
    }

    fn build_client(&self, proxy_address: &str) -> Result<reqwest::Client, FetchError> {
        let proxy_url = format!("http://{}:{}", proxy_address, PROXY_PORT);
        let proxy =
            reqwest::Proxy::all(&proxy_url).map_err(|e| FetchError::InvalidProxy {
                address: proxy_address.to_string(),
                message: e.to_string(),
            })?;

        reqwest::Client::builder()
            .proxy(proxy)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .timeout(self.timeout)
            .user_agent(config::USER_AGENT)
            .build()
            .map_err(FetchError::Request)
    }
}

impl Default for HttpFetchClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 5)
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(
        &self,
        target_url: &str,
        proxy_address: &str,
    ) -> Result<FetchResponse, FetchError> {
        let client = self.build_client(proxy_address)?;
        let started = Instant::now();

        let response = client.get(target_url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_length = response.content_length();
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Request(e)
                }
            })?
            .to_vec();
        let elapsed = started.elapsed();

        debug!(
            url = %target_url,
            proxy = %proxy_address,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = elapsed.as_millis(),
            "Fetch completed"
        );

        Ok(FetchResponse {
            status: status.as_u16(),
            content_length,
            body,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_formula() {
        // 1_000_000 bytes over 8 seconds: 8_000_000 bits / 8_000_000 = 1 Mbps.
        let mbps = bandwidth_mbps(1_000_000, Duration::from_secs(8));
        assert!((mbps - 1.0).abs() < 1e-9);

        // 250_000 bytes over 2 seconds: 2_000_000 bits / 2_000_000 = 1 Mbps.
        let mbps = bandwidth_mbps(250_000, Duration::from_secs(2));
        assert!((mbps - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bandwidth_zero_duration() {
        assert_eq!(bandwidth_mbps(1_000_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_transferred_bytes_prefers_content_length() {
        let response = FetchResponse {
            status: 200,
            content_length: Some(4096),
            body: vec![0u8; 10],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(response.transferred_bytes(), 4096);

        let response = FetchResponse {
            status: 200,
            content_length: None,
            body: vec![0u8; 10],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(response.transferred_bytes(), 10);
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Status(503);
        assert!(err.to_string().contains("503"));

        let err = FetchError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("30"));

        let err = FetchError::InvalidProxy {
            address: "bad address".to_string(),
            message: "parse error".to_string(),
        };
        assert!(err.to_string().contains("bad address"));
    }
}
