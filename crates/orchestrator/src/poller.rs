use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use conflux_core::{IntegrationConfig, IntegrationEvent, IntegrationRuntimeState, IntegrationStatus};
use conflux_http::{RateLimitedHttpClient, RequestSpec};

use crate::metrics::OpsCounters;
use crate::queue::EventSender;

/// Long-lived polling loop for one API-protocol integration.
///
/// Status walks `Inactive → Active` on start, `Syncing` while a call is
/// outstanding, back to `Active` on success or `Error` on failure, and
/// `Inactive` once cancelled. A failed tick never terminates the loop; it
/// sleeps `retry_delay` and tries again, indefinitely, until cancellation.
pub struct PollingSyncWorker {
    config: IntegrationConfig,
    state: Arc<IntegrationRuntimeState>,
    counters: Arc<OpsCounters>,
    client: Arc<RateLimitedHttpClient>,
    events: EventSender,
    cancel: CancellationToken,
}

impl PollingSyncWorker {
    /// Create a worker for the given integration.
    pub fn new(
        config: IntegrationConfig,
        state: Arc<IntegrationRuntimeState>,
        counters: Arc<OpsCounters>,
        client: Arc<RateLimitedHttpClient>,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            counters,
            client,
            events,
            cancel,
        }
    }

    /// Run the polling loop until cancelled.
    #[instrument(skip(self), fields(integration = %self.config.name))]
    pub async fn run(self) {
        info!("polling worker starting");
        self.state.set_status(IntegrationStatus::Active);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let slept = match self.tick().await {
                TickOutcome::Synced => self.sleep(self.config.sync_interval_duration()).await,
                TickOutcome::Failed => self.sleep(self.config.retry_delay_duration()).await,
                TickOutcome::Stopped => break,
            };
            if !slept {
                break;
            }
        }

        self.state.set_status(IntegrationStatus::Inactive);
        info!("polling worker stopped");
    }

    /// One poll tick: call the endpoint, emit a sync event on success.
    async fn tick(&self) -> TickOutcome {
        self.state.set_status(IntegrationStatus::Syncing);
        self.counters.increment_api_calls();

        let spec = self.build_spec();
        let result = tokio::select! {
            () = self.cancel.cancelled() => return TickOutcome::Stopped,
            result = self.client.execute(&spec) => result,
        };

        match result {
            Ok(response) => {
                let event = IntegrationEvent::sync(&self.config.name, response.body);
                if self.events.send(event).await.is_err() {
                    warn!("event queue closed, stopping polling worker");
                    return TickOutcome::Stopped;
                }
                self.state.record_sync(Utc::now());
                self.counters.increment_sync_operations();
                self.state.set_status(IntegrationStatus::Active);
                debug!(status = response.status, "sync tick completed");
                TickOutcome::Synced
            }
            Err(err) => {
                self.state.record_error();
                self.counters.increment_errors();
                self.state.set_status(IntegrationStatus::Error);
                warn!(error = %err, "sync tick failed, will retry");
                TickOutcome::Failed
            }
        }
    }

    fn build_spec(&self) -> RequestSpec {
        let mut spec = RequestSpec::get(&self.config.endpoint)
            .with_timeout(self.config.timeout_duration())
            .with_max_retries(self.config.retry_attempts);
        for (key, value) in &self.config.headers {
            spec = spec.with_header(key, value);
        }
        if let Some(key) = &self.config.api_key {
            spec = spec.with_bearer(key);
        }
        spec
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

enum TickOutcome {
    Synced,
    Failed,
    Stopped,
}
