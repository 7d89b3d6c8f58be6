use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    /// Not started, or stopped.
    Inactive,
    /// Running and idle between operations.
    Active,
    /// An outbound call is in flight.
    Syncing,
    /// The most recent operation failed; the loop continues.
    Error,
    /// Administratively paused.
    Maintenance,
}

impl IntegrationStatus {
    /// Returns the status name as a lowercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        }
    }
}

/// Mutable runtime state for one active integration.
///
/// Status and `last_sync` are mutated only by the task that owns the
/// integration; counters are atomics. Readers (the metrics collector,
/// status queries) take eventually-consistent snapshots and never write.
#[derive(Debug)]
pub struct IntegrationRuntimeState {
    status: RwLock<IntegrationStatus>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    success_count: AtomicU64,
    error_count: AtomicU64,
}

impl IntegrationRuntimeState {
    /// Create a fresh state: `Inactive`, no syncs, zero counters.
    pub fn new() -> Self {
        Self {
            status: RwLock::new(IntegrationStatus::Inactive),
            last_sync: RwLock::new(None),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Current status.
    pub fn status(&self) -> IntegrationStatus {
        *self.status.read()
    }

    /// Set the status. Owner task only.
    pub fn set_status(&self, status: IntegrationStatus) {
        *self.status.write() = status;
    }

    /// Timestamp of the last successful sync, if any.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read()
    }

    /// Record a successful sync at `at`. Owner task only.
    pub fn record_sync(&self, at: DateTime<Utc>) {
        *self.last_sync.write() = Some(at);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a success that is not a sync (e.g. a stream message).
    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation. Owner task only.
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful operation count.
    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    /// Failed operation count.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Take an eventually-consistent point-in-time snapshot.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status(),
            last_sync: self.last_sync(),
            success_count: self.success_count(),
            error_count: self.error_count(),
        }
    }
}

impl Default for IntegrationRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain data snapshot of [`IntegrationRuntimeState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Status at snapshot time.
    pub status: IntegrationStatus,
    /// Last successful sync, if any.
    pub last_sync: Option<DateTime<Utc>>,
    /// Successful operations.
    pub success_count: u64,
    /// Failed operations.
    pub error_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state() {
        let state = IntegrationRuntimeState::new();
        assert_eq!(state.status(), IntegrationStatus::Inactive);
        assert!(state.last_sync().is_none());
        assert_eq!(state.success_count(), 0);
        assert_eq!(state.error_count(), 0);
    }

    #[test]
    fn record_sync_updates_both_fields() {
        let state = IntegrationRuntimeState::new();
        let at = Utc::now();
        state.record_sync(at);
        assert_eq!(state.last_sync(), Some(at));
        assert_eq!(state.success_count(), 1);
    }

    #[test]
    fn counters_accumulate() {
        let state = IntegrationRuntimeState::new();
        state.record_error();
        state.record_error();
        state.record_success();
        assert_eq!(state.error_count(), 2);
        assert_eq!(state.success_count(), 1);
    }

    #[test]
    fn snapshot_is_consistent_view() {
        let state = IntegrationRuntimeState::new();
        state.set_status(IntegrationStatus::Active);
        state.record_sync(Utc::now());
        let snap = state.snapshot();
        assert_eq!(snap.status, IntegrationStatus::Active);
        assert_eq!(snap.success_count, 1);
        assert!(snap.last_sync.is_some());
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&IntegrationStatus::Syncing).unwrap();
        assert_eq!(json, "\"syncing\"");
        assert_eq!(IntegrationStatus::Maintenance.as_str(), "maintenance");
    }
}
