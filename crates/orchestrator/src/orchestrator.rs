use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use conflux_core::{IntegrationProtocol, IntegrationStatus, WebhookPayload};
use conflux_http::RateLimitedHttpClient;

use crate::dispatcher::EventDispatcher;
use crate::error::OrchestratorError;
use crate::handler::HandlerTable;
use crate::metrics::{AggregateMetrics, MetricsCollector};
use crate::poller::PollingSyncWorker;
use crate::queue::{EventReceiver, EventSender};
use crate::registry::{IntegrationRegistry, IntegrationStatusReport};
use crate::stream::{StreamTransport, StreamingConnector};
use crate::webhook::WebhookIngestGateway;

/// Coordinates every producer task and the single dispatcher for one set of
/// registered integrations.
///
/// Construct via [`OrchestratorBuilder`](crate::OrchestratorBuilder), then
/// [`start`](Self::start) to spawn one task per enabled polling or
/// streaming integration plus the dispatcher. Inbound webhooks are fed in
/// synchronously through [`handle_webhook`](Self::handle_webhook).
///
/// Events still queued at [`shutdown`](Self::shutdown) are dropped; the
/// queue is in-memory only and is not drained on stop.
pub struct Orchestrator {
    pub(crate) registry: Arc<IntegrationRegistry>,
    pub(crate) client: Arc<RateLimitedHttpClient>,
    pub(crate) handlers: HandlerTable,
    pub(crate) transport: Arc<dyn StreamTransport>,
    pub(crate) reconnect_delay: Duration,
    pub(crate) events: EventSender,
    pub(crate) receiver: Option<EventReceiver>,
    pub(crate) webhooks: WebhookIngestGateway,
    pub(crate) metrics: MetricsCollector,
    pub(crate) tracker: TaskTracker,
    pub(crate) root_cancel: CancellationToken,
    pub(crate) producer_cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("integrations", &self.registry.len())
            .field("reconnect_delay", &self.reconnect_delay)
            .field("started", &self.receiver.is_none())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Spawn the dispatcher and one producer task per enabled integration.
    ///
    /// Polling integrations get a [`PollingSyncWorker`], streaming
    /// integrations a [`StreamingConnector`]. Webhook integrations are
    /// inbound-only and merely marked active. Protocols without a runtime
    /// worker are logged and left inactive.
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        let receiver = self.receiver.take().ok_or(OrchestratorError::AlreadyStarted)?;

        info!(integrations = self.registry.len(), "orchestrator starting");

        let dispatcher = EventDispatcher::new(
            receiver,
            self.handlers.clone(),
            Arc::clone(&self.registry),
            self.root_cancel.child_token(),
        );
        self.tracker.spawn(dispatcher.run());

        for entry in self.registry.entries() {
            let config = &entry.config;
            if !config.enabled {
                debug!(integration = %config.name, "integration disabled, skipping");
                continue;
            }

            match config.protocol {
                IntegrationProtocol::Api => {
                    let cancel = self.root_cancel.child_token();
                    self.producer_cancels
                        .lock()
                        .insert(config.name.clone(), cancel.clone());
                    let worker = PollingSyncWorker::new(
                        config.clone(),
                        Arc::clone(&entry.state),
                        Arc::clone(&entry.counters),
                        Arc::clone(&self.client),
                        self.events.clone(),
                        cancel,
                    );
                    self.tracker.spawn(worker.run());
                }
                IntegrationProtocol::Websocket => {
                    let cancel = self.root_cancel.child_token();
                    self.producer_cancels
                        .lock()
                        .insert(config.name.clone(), cancel.clone());
                    let connector = StreamingConnector::new(
                        config.clone(),
                        Arc::clone(&entry.state),
                        Arc::clone(&entry.counters),
                        self.events.clone(),
                        Arc::clone(&self.transport),
                        cancel,
                    )
                    .with_reconnect_delay(self.reconnect_delay);
                    self.tracker.spawn(connector.run());
                }
                IntegrationProtocol::Webhook => {
                    // Inbound-only: ready to receive as soon as we are up.
                    entry.state.set_status(IntegrationStatus::Active);
                }
                IntegrationProtocol::FileSync | IntegrationProtocol::Database => {
                    warn!(
                        integration = %config.name,
                        protocol = config.protocol.as_str(),
                        "no runtime worker for protocol, integration stays inactive"
                    );
                }
            }
        }

        Ok(())
    }

    /// Verify and ingest one inbound webhook delivery.
    pub async fn handle_webhook(&self, integration_name: &str, payload: WebhookPayload) -> bool {
        self.webhooks.handle_webhook(integration_name, payload).await
    }

    /// Status report for one integration.
    pub fn integration_status(&self, name: &str) -> Option<IntegrationStatusReport> {
        self.registry.status_report(name)
    }

    /// Current status of every integration, keyed by name.
    pub fn all_integrations(&self) -> HashMap<String, IntegrationStatus> {
        self.registry.all_statuses()
    }

    /// The read-only metrics collector for this orchestrator.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// System-wide aggregate metrics snapshot.
    pub fn aggregate_metrics(&self) -> AggregateMetrics {
        self.metrics.aggregate()
    }

    /// The registry backing this orchestrator.
    pub fn registry(&self) -> &Arc<IntegrationRegistry> {
        &self.registry
    }

    /// Cancel one integration's producer task.
    ///
    /// The task notices promptly (in-flight work honors its own timeout
    /// rather than being torn down) and sets the integration inactive on
    /// exit. Inbound-only webhook integrations are marked inactive
    /// directly.
    pub fn stop_integration(&self, name: &str) -> Result<(), OrchestratorError> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownIntegration(name.to_owned()))?;

        if entry.config.protocol == IntegrationProtocol::Webhook {
            entry.state.set_status(IntegrationStatus::Inactive);
            return Ok(());
        }

        let cancel = self
            .producer_cancels
            .lock()
            .remove(name)
            .ok_or_else(|| OrchestratorError::NotRunning(name.to_owned()))?;
        cancel.cancel();
        info!(integration = %name, "integration stop requested");
        Ok(())
    }

    /// Cancel every task and wait for all of them to finish.
    ///
    /// Queued-but-undispatched events are lost; nothing is persisted.
    pub async fn shutdown(self) {
        info!("orchestrator shutting down");
        self.root_cancel.cancel();

        // Webhook integrations have no task to set them inactive.
        for entry in self.registry.entries() {
            if entry.config.protocol == IntegrationProtocol::Webhook {
                entry.state.set_status(IntegrationStatus::Inactive);
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("orchestrator stopped");
    }
}
