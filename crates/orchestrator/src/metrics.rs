use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use conflux_core::StateSnapshot;

use crate::registry::IntegrationRegistry;

/// Atomic per-integration operation counters.
///
/// All counters use relaxed ordering; call [`snapshot`](Self::snapshot) for
/// a point-in-time view.
#[derive(Debug, Default)]
pub struct OpsCounters {
    /// Outbound API calls attempted (one per poll tick).
    pub api_calls: AtomicU64,
    /// Webhook deliveries accepted.
    pub webhook_events: AtomicU64,
    /// Well-formed stream messages received.
    pub websocket_messages: AtomicU64,
    /// Poll ticks that produced a sync event.
    pub sync_operations: AtomicU64,
    /// Failed operations of any kind, including handler failures.
    pub errors: AtomicU64,
}

impl OpsCounters {
    /// Increment the API call counter.
    pub fn increment_api_calls(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the accepted-webhook counter.
    pub fn increment_webhook_events(&self) {
        self.webhook_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the stream message counter.
    pub fn increment_websocket_messages(&self) {
        self.websocket_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the completed-sync counter.
    pub fn increment_sync_operations(&self) {
        self.sync_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the error counter.
    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> OpsSnapshot {
        OpsSnapshot {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            webhook_events: self.webhook_events.load(Ordering::Relaxed),
            websocket_messages: self.websocket_messages.load(Ordering::Relaxed),
            sync_operations: self.sync_operations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Plain data snapshot of [`OpsCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsSnapshot {
    /// Outbound API calls attempted.
    pub api_calls: u64,
    /// Webhook deliveries accepted.
    pub webhook_events: u64,
    /// Well-formed stream messages received.
    pub websocket_messages: u64,
    /// Poll ticks that produced a sync event.
    pub sync_operations: u64,
    /// Failed operations of any kind.
    pub errors: u64,
}

impl OpsSnapshot {
    /// Total external operations: API calls, accepted webhooks, and stream
    /// messages. Sync operations are a subset of API calls and are not
    /// double-counted.
    pub fn total_operations(&self) -> u64 {
        self.api_calls + self.webhook_events + self.websocket_messages
    }
}

/// Point-in-time view of one integration: operation counters plus runtime
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationMetrics {
    /// Integration name.
    pub name: String,
    /// Whether the integration is enabled.
    pub enabled: bool,
    /// Runtime state snapshot.
    pub state: StateSnapshot,
    /// Operation counter snapshot.
    pub ops: OpsSnapshot,
}

/// System-wide aggregate across every registered integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Integrations currently active or syncing.
    pub active_integrations: usize,
    /// Registered integrations.
    pub total_integrations: usize,
    /// Total operations across all integrations.
    pub total_operations: u64,
    /// Total errors across all integrations.
    pub errors: u64,
    /// `(total_operations − errors) / max(total_operations, 1)`.
    pub success_rate: f64,
}

/// Read-only aggregator over the registry's runtime state and counters.
///
/// Never mutates anything; every view is eventually consistent.
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<IntegrationRegistry>,
}

impl MetricsCollector {
    /// Create a collector observing the given registry.
    pub fn new(registry: Arc<IntegrationRegistry>) -> Self {
        Self { registry }
    }

    /// Snapshot one integration, or `None` if it is not registered.
    pub fn integration_metrics(&self, name: &str) -> Option<IntegrationMetrics> {
        let entry = self.registry.get(name)?;
        Some(IntegrationMetrics {
            name: entry.config.name.clone(),
            enabled: entry.config.enabled,
            state: entry.state.snapshot(),
            ops: entry.counters.snapshot(),
        })
    }

    /// Snapshot every integration, keyed by name.
    pub fn all_metrics(&self) -> HashMap<String, IntegrationMetrics> {
        self.registry
            .names()
            .filter_map(|name| {
                self.integration_metrics(name)
                    .map(|m| (name.to_owned(), m))
            })
            .collect()
    }

    /// System-wide aggregate snapshot.
    pub fn aggregate(&self) -> AggregateMetrics {
        let mut active = 0usize;
        let mut total_operations = 0u64;
        let mut errors = 0u64;

        for entry in self.registry.entries() {
            let state = entry.state.snapshot();
            if matches!(
                state.status,
                conflux_core::IntegrationStatus::Active | conflux_core::IntegrationStatus::Syncing
            ) {
                active += 1;
            }
            let ops = entry.counters.snapshot();
            total_operations += ops.total_operations();
            errors += ops.errors;
        }

        #[allow(clippy::cast_precision_loss)]
        let success_rate =
            (total_operations.saturating_sub(errors)) as f64 / total_operations.max(1) as f64;

        AggregateMetrics {
            active_integrations: active,
            total_integrations: self.registry.len(),
            total_operations,
            errors,
            success_rate,
        }
    }
}
