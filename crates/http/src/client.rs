use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::error::HttpClientError;
use crate::retry::RetryPolicy;

/// HTTP method for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Returns the method name as an uppercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Description of one outbound request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method (defaults to `GET`).
    pub method: HttpMethod,
    /// Target URL.
    pub url: String,
    /// Static headers applied to the request.
    pub headers: HashMap<String, String>,
    /// Optional bearer token (`Authorization: Bearer <token>`).
    pub bearer: Option<String>,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Override for the client's retry budget. `None` uses the client
    /// policy's `max_retries`.
    pub max_retries: Option<u32>,
}

impl RequestSpec {
    /// Create a `GET` spec for the given URL with a 30-second timeout.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            bearer: None,
            body: None,
            timeout: Duration::from_secs(30),
            max_retries: None,
        }
    }

    /// Create a `POST` spec with a JSON body and a 30-second timeout.
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry budget for this request alone.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Response captured from a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code (always 2xx; non-success statuses surface as errors).
    pub status: u16,
    /// Body parsed as JSON when possible, otherwise wrapped as
    /// `{"body": "<text>"}`.
    pub body: serde_json::Value,
    /// Response headers.
    pub headers: HashMap<String, String>,
}

/// Configuration for [`RateLimitedHttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Process-wide cap on in-flight requests, enforced via a
    /// [`tokio::sync::Semaphore`].
    pub max_concurrent: usize,
    /// Default retry policy; individual requests may lower or raise the
    /// retry budget through [`RequestSpec::max_retries`].
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded-concurrency, retrying outbound HTTP executor.
///
/// One instance is shared by every integration; the semaphore caps in-flight
/// requests across the whole process regardless of which integration issues
/// the call. Retryable failures (network, timeout, HTTP 429/500/502/503/504)
/// are retried with delays from the configured [`RetryPolicy`]; any other
/// non-2xx status fails immediately. The client never mutates integration
/// runtime state; callers decide what a failure means.
pub struct RateLimitedHttpClient {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    config: HttpClientConfig,
}

impl RateLimitedHttpClient {
    /// Create a client from the given configuration.
    pub fn new(config: HttpClientConfig) -> Self {
        // No client-level timeout: each attempt is bounded individually by
        // the spec's timeout.
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build HTTP client");
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            client,
            semaphore,
            config,
        }
    }

    /// Create a client with a custom `reqwest::Client`, e.g. to share a
    /// connection pool in tests.
    pub fn with_client(config: HttpClientConfig, client: reqwest::Client) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            client,
            semaphore,
            config,
        }
    }

    /// Return a reference to the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Execute a request, retrying per policy, and return the response.
    ///
    /// Acquires a concurrency permit first and holds it for the full
    /// attempt sequence. After exhausting retries the last error is
    /// propagated unchanged.
    #[instrument(skip(self, spec), fields(method = spec.method.as_str(), url = %spec.url))]
    pub async fn execute(&self, spec: &RequestSpec) -> Result<HttpResponse, HttpClientError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore should never be closed");

        let max_retries = spec.max_retries.unwrap_or(self.config.retry.max_retries);

        let mut attempt = 0;
        loop {
            debug!(attempt, max_retries, "sending request");

            let err = match self.attempt(spec).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if err.is_retryable() && attempt < max_retries {
                let delay = self.config.retry.backoff.delay_for(attempt + 1);
                warn!(
                    attempt,
                    error = %err,
                    delay_ms = %delay.as_millis(),
                    "retryable error, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            } else {
                warn!(attempt, error = %err, retryable = err.is_retryable(), "request failed");
                return Err(err);
            }
        }
    }

    /// One attempt: send, bound by the spec timeout, classify the outcome.
    async fn attempt(&self, spec: &RequestSpec) -> Result<HttpResponse, HttpClientError> {
        let request = self.build_request(spec);

        let response = match tokio::time::timeout(spec.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(if e.is_timeout() {
                    HttpClientError::Timeout(spec.timeout)
                } else {
                    HttpClientError::Network(e.to_string())
                });
            }
            Err(_elapsed) => return Err(HttpClientError::Timeout(spec.timeout)),
        };

        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|val| (k.to_string(), val.to_owned())))
            .collect();

        let text = response.text().await.unwrap_or_default();

        if (200..300).contains(&status) {
            let body = serde_json::from_str(&text)
                .unwrap_or_else(|_| serde_json::json!({ "body": text }));
            Ok(HttpResponse {
                status,
                body,
                headers,
            })
        } else {
            Err(HttpClientError::Status { status, body: text })
        }
    }

    fn build_request(&self, spec: &RequestSpec) -> reqwest::RequestBuilder {
        let mut request = match spec.method {
            HttpMethod::Get => self.client.get(&spec.url),
            HttpMethod::Post => self.client.post(&spec.url),
            HttpMethod::Put => self.client.put(&spec.url),
            HttpMethod::Patch => self.client.patch(&spec.url),
            HttpMethod::Delete => self.client.delete(&spec.url),
        };

        for (key, value) in &spec.headers {
            request = request.header(key, value);
        }
        if let Some(token) = &spec.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        request
    }
}
