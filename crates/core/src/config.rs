use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport protocol an integration speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationProtocol {
    /// Periodic polling against a REST endpoint.
    Api,
    /// Inbound webhook delivery; no long-lived task.
    Webhook,
    /// Persistent duplex streaming connection.
    Websocket,
    /// File-drop synchronization. Accepted in configuration; no runtime
    /// worker exists for it.
    FileSync,
    /// Direct database synchronization. Accepted in configuration; no
    /// runtime worker exists for it.
    Database,
}

impl IntegrationProtocol {
    /// Returns the protocol name as a lowercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Webhook => "webhook",
            Self::Websocket => "websocket",
            Self::FileSync => "file_sync",
            Self::Database => "database",
        }
    }
}

/// Static configuration for a single integration, immutable after load.
///
/// Loaded from `[[integration]]` tables in a TOML file (see
/// [`load_integrations`]) or constructed programmatically via the builder
/// methods.
#[derive(Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Unique integration name; the key everything else correlates on.
    pub name: String,

    /// Transport protocol.
    pub protocol: IntegrationProtocol,

    /// Endpoint URL polled or connected to.
    #[serde(default)]
    pub endpoint: String,

    /// Opaque API key sent as a bearer token on outbound calls.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Opaque shared secret for outbound authentication schemes.
    #[serde(default)]
    pub secret: Option<String>,

    /// Static headers applied to every outbound request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Maximum retry attempts for outbound calls.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay in seconds between failed poll ticks.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Public URL this integration delivers webhooks to, if any.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Shared secret for inbound webhook signature verification. When
    /// absent, inbound payloads are accepted unsigned.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Seconds between successful poll ticks.
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,

    /// Whether the integration participates at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_sync_interval() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

impl IntegrationConfig {
    /// Create a configuration with the given name and protocol and every
    /// other field at its default.
    pub fn new(name: impl Into<String>, protocol: IntegrationProtocol) -> Self {
        Self {
            name: name.into(),
            protocol,
            endpoint: String::new(),
            api_key: None,
            secret: None,
            headers: HashMap::new(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            webhook_url: None,
            webhook_secret: None,
            sync_interval: default_sync_interval(),
            enabled: default_enabled(),
        }
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Add a static header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the inbound webhook secret.
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Set the poll interval in seconds.
    #[must_use]
    pub fn with_sync_interval(mut self, secs: u64) -> Self {
        self.sync_interval = secs;
        self
    }

    /// Set the retry delay in seconds.
    #[must_use]
    pub fn with_retry_delay(mut self, secs: u64) -> Self {
        self.retry_delay = secs;
        self
    }

    /// Set the per-request timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Mark the integration as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Per-request timeout as a [`Duration`].
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Poll interval as a [`Duration`].
    pub fn sync_interval_duration(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }

    /// Retry delay as a [`Duration`].
    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

// Credentials never appear in logs; Debug goes through this impl.
impl std::fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "[REDACTED]" } else { "None" }
        }

        f.debug_struct("IntegrationConfig")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("secret", &redact(&self.secret))
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("webhook_url", &self.webhook_url)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("sync_interval", &self.sync_interval)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Errors raised while loading integration configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// The configuration is syntactically valid but semantically wrong.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize)]
struct IntegrationsFile {
    #[serde(default)]
    integration: Vec<IntegrationConfig>,
}

/// Load integration records from a TOML file of `[[integration]]` tables.
///
/// Duplicate names are rejected; each record's unnamed fields take the
/// documented defaults.
pub fn load_integrations(path: impl AsRef<Path>) -> Result<Vec<IntegrationConfig>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let file: IntegrationsFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let mut seen = std::collections::HashSet::new();
    for config in &file.integration {
        if config.name.is_empty() {
            return Err(ConfigError::Invalid("integration name is empty".into()));
        }
        if !seen.insert(config.name.clone()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate integration name: {}",
                config.name
            )));
        }
    }

    Ok(file.integration)
}
