use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch discriminator for an [`IntegrationEvent`].
///
/// Producers tag events at construction time, so routing never has to
/// inspect the `event_type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Result of a successful poll tick.
    Sync,
    /// Message received on a streaming connection.
    Message,
    /// Verified inbound webhook delivery.
    Webhook,
}

/// Processing status of an [`IntegrationEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Queued, not yet handled.
    Pending,
    /// Handled successfully.
    Completed,
    /// Handler failed; `error_message` carries the cause.
    Error,
}

/// A unit of work produced by an integration and consumed by the dispatcher.
///
/// Created by exactly one producer, pushed once to the event queue, marked
/// completed or error by the dispatcher, then discarded. Events carry no
/// back-reference to runtime state; correlation is by `source` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Unique event identifier.
    pub id: String,

    /// Dispatch discriminator.
    pub kind: EventKind,

    /// Domain-qualified type string, e.g. `"jobs_api_sync"`.
    pub event_type: String,

    /// Opaque structured payload.
    pub payload: serde_json::Value,

    /// When the producer created the event.
    pub timestamp: DateTime<Utc>,

    /// Name of the producing integration.
    pub source: String,

    /// Current processing status.
    pub status: EventStatus,

    /// Number of delivery attempts already made. Monotonically increasing.
    pub retry_count: u32,

    /// Failure detail when `status == Error`.
    pub error_message: Option<String>,
}

impl IntegrationEvent {
    fn new(
        kind: EventKind,
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            source: source.into(),
            status: EventStatus::Pending,
            retry_count: 0,
            error_message: None,
        }
    }

    /// Event produced by a poll tick. `event_type` becomes
    /// `"<source>_sync"`.
    pub fn sync(source: impl Into<String>, payload: serde_json::Value) -> Self {
        let source = source.into();
        let event_type = format!("{source}_sync");
        Self::new(EventKind::Sync, event_type, source, payload)
    }

    /// Event produced by a streaming connection. `event_type` becomes
    /// `"<source>_message"`.
    pub fn message(source: impl Into<String>, payload: serde_json::Value) -> Self {
        let source = source.into();
        let event_type = format!("{source}_message");
        Self::new(EventKind::Message, event_type, source, payload)
    }

    /// Event produced by a verified webhook; the inbound `event_type` is
    /// preserved verbatim.
    pub fn webhook(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(EventKind::Webhook, event_type, source, payload)
    }

    /// Mark the event successfully handled.
    pub fn mark_completed(&mut self) {
        self.status = EventStatus::Completed;
    }

    /// Mark the event failed with the given cause.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = EventStatus::Error;
        self.error_message = Some(message.into());
    }
}

/// Inbound webhook body as delivered by the external sender.
///
/// Transient: consumed entirely by the webhook gateway and either converted
/// into an [`IntegrationEvent`] or rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Sender-defined event type.
    pub event_type: String,

    /// Opaque payload object.
    pub data: serde_json::Value,

    /// ISO-8601 timestamp string; part of the signed content.
    pub timestamp: String,

    /// Hex-encoded HMAC-SHA256 signature.
    #[serde(default)]
    pub signature: String,

    /// Sender-declared source label. Informational; routing uses the
    /// integration name the payload arrived under.
    #[serde(default)]
    pub source: String,
}
