use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conflux_core::{
    IntegrationConfig, IntegrationProtocol, IntegrationRuntimeState, IntegrationStatus,
};

use crate::metrics::OpsCounters;

/// One registered integration: immutable configuration plus the shared
/// runtime state and counters its producer task writes to.
pub struct IntegrationEntry {
    /// Static configuration, immutable after load.
    pub config: IntegrationConfig,
    /// Runtime state, written only by the owning producer task.
    pub state: Arc<IntegrationRuntimeState>,
    /// Operation counters.
    pub counters: Arc<OpsCounters>,
}

/// Operational status report for one integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationStatusReport {
    /// Integration name.
    pub name: String,
    /// Transport protocol.
    pub protocol: IntegrationProtocol,
    /// Current lifecycle status.
    pub status: IntegrationStatus,
    /// Last successful sync, if any.
    pub last_sync: Option<DateTime<Utc>>,
    /// Failed operation count.
    pub error_count: u64,
    /// Successful operation count.
    pub success_count: u64,
    /// Whether the integration is enabled.
    pub enabled: bool,
}

/// Holds every registered integration for one orchestrator instance.
///
/// An explicit object passed by reference, never a process-wide map, so
/// independent orchestrators can coexist, notably in tests. Populated before
/// the orchestrator starts and immutable afterwards; producer tasks keep
/// clones of their entry's `Arc`s.
#[derive(Default)]
pub struct IntegrationRegistry {
    entries: HashMap<String, IntegrationEntry>,
}

impl IntegrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration. Replaces any previous entry with the same
    /// name and resets its runtime state.
    pub fn insert(&mut self, config: IntegrationConfig) {
        let entry = IntegrationEntry {
            state: Arc::new(IntegrationRuntimeState::new()),
            counters: Arc::new(OpsCounters::default()),
            config,
        };
        self.entries.insert(entry.config.name.clone(), entry);
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&IntegrationEntry> {
        self.entries.get(name)
    }

    /// Iterate over all entries.
    pub fn entries(&self) -> impl Iterator<Item = &IntegrationEntry> {
        self.entries.values()
    }

    /// Iterate over registered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered integrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no integrations are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Status report for one integration, or `None` if unregistered.
    pub fn status_report(&self, name: &str) -> Option<IntegrationStatusReport> {
        let entry = self.entries.get(name)?;
        let state = entry.state.snapshot();
        Some(IntegrationStatusReport {
            name: entry.config.name.clone(),
            protocol: entry.config.protocol,
            status: state.status,
            last_sync: state.last_sync,
            error_count: state.error_count,
            success_count: state.success_count,
            enabled: entry.config.enabled,
        })
    }

    /// Current status of every integration, keyed by name.
    pub fn all_statuses(&self) -> HashMap<String, IntegrationStatus> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.state.status()))
            .collect()
    }
}
