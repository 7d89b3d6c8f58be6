use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`RateLimitedHttpClient`](crate::RateLimitedHttpClient).
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Transport-level failure: DNS, connect, TLS, reset.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },
}

impl HttpClientError {
    /// Returns `true` if the error is transient and the request may succeed
    /// on retry: network and timeout failures, plus HTTP 429 and the
    /// retryable 5xx family. Every other status fails immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
        }
    }
}
