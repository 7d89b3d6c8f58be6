use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use conflux_core::IntegrationConfig;
use conflux_http::{HttpClientConfig, RateLimitedHttpClient};

use crate::error::OrchestratorError;
use crate::handler::{EventHandler, HandlerTable};
use crate::metrics::MetricsCollector;
use crate::orchestrator::Orchestrator;
use crate::queue::{EventQueue, Overflow};
use crate::registry::IntegrationRegistry;
use crate::stream::{DEFAULT_RECONNECT_DELAY, StreamTransport, WsTransport};
use crate::webhook::WebhookIngestGateway;

/// Fluent builder for constructing an [`Orchestrator`].
///
/// At minimum a generic handler must be supplied; the sync and message
/// lanes fall back to it when not set. Everything else has defaults: a
/// 1024-slot blocking queue, an 8-way rate-limited HTTP client, the
/// WebSocket stream transport, and a 5-second reconnect delay.
pub struct OrchestratorBuilder {
    integrations: Vec<IntegrationConfig>,
    sync_handler: Option<Arc<dyn EventHandler>>,
    message_handler: Option<Arc<dyn EventHandler>>,
    generic_handler: Option<Arc<dyn EventHandler>>,
    queue_capacity: usize,
    overflow: Overflow,
    http_config: HttpClientConfig,
    transport: Option<Arc<dyn StreamTransport>>,
    reconnect_delay: Duration,
    require_signature: bool,
}

impl OrchestratorBuilder {
    /// Create a builder with every optional field at its default.
    pub fn new() -> Self {
        Self {
            integrations: Vec::new(),
            sync_handler: None,
            message_handler: None,
            generic_handler: None,
            queue_capacity: EventQueue::DEFAULT_CAPACITY,
            overflow: Overflow::Block,
            http_config: HttpClientConfig::default(),
            transport: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            require_signature: false,
        }
    }

    /// Register one integration.
    #[must_use]
    pub fn integration(mut self, config: IntegrationConfig) -> Self {
        self.integrations.push(config);
        self
    }

    /// Register a batch of integrations, e.g. from
    /// [`load_integrations`](conflux_core::load_integrations).
    #[must_use]
    pub fn integrations(mut self, configs: impl IntoIterator<Item = IntegrationConfig>) -> Self {
        self.integrations.extend(configs);
        self
    }

    /// Handler for sync events. Defaults to the generic handler.
    #[must_use]
    pub fn sync_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.sync_handler = Some(handler);
        self
    }

    /// Handler for stream-message events. Defaults to the generic handler.
    #[must_use]
    pub fn message_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.message_handler = Some(handler);
        self
    }

    /// Handler for everything else (webhook deliveries). Required.
    #[must_use]
    pub fn generic_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.generic_handler = Some(handler);
        self
    }

    /// Event queue capacity (default 1024).
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Overflow policy for a full queue (default [`Overflow::Block`]).
    #[must_use]
    pub fn overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }

    /// Outbound HTTP configuration: concurrency cap and retry policy.
    #[must_use]
    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Override the streaming transport (default: WebSocket).
    #[must_use]
    pub fn stream_transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Delay between stream reconnect attempts (default 5 seconds).
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Reject webhook deliveries for integrations that have no configured
    /// secret instead of accepting them unsigned.
    #[must_use]
    pub fn require_signature(mut self, require: bool) -> Self {
        self.require_signature = require;
        self
    }

    /// Build the orchestrator. Fails if no generic handler was supplied or
    /// two integrations share a name.
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let generic = self.generic_handler.ok_or_else(|| {
            OrchestratorError::Builder("a generic handler must be registered".into())
        })?;
        let handlers = HandlerTable::new(
            self.sync_handler.unwrap_or_else(|| Arc::clone(&generic)),
            self.message_handler.unwrap_or_else(|| Arc::clone(&generic)),
            generic,
        );

        let mut registry = IntegrationRegistry::new();
        for config in self.integrations {
            if registry.get(&config.name).is_some() {
                return Err(OrchestratorError::Builder(format!(
                    "duplicate integration name: {}",
                    config.name
                )));
            }
            registry.insert(config);
        }
        let registry = Arc::new(registry);

        let (events, receiver) = EventQueue::bounded(self.queue_capacity, self.overflow);
        let webhooks = WebhookIngestGateway::new(Arc::clone(&registry), events.clone())
            .with_require_signature(self.require_signature);

        Ok(Orchestrator {
            metrics: MetricsCollector::new(Arc::clone(&registry)),
            client: Arc::new(RateLimitedHttpClient::new(self.http_config)),
            handlers,
            transport: self.transport.unwrap_or_else(|| Arc::new(WsTransport)),
            reconnect_delay: self.reconnect_delay,
            events,
            receiver: Some(receiver),
            webhooks,
            registry,
            tracker: TaskTracker::new(),
            root_cancel: CancellationToken::new(),
            producer_cancels: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
