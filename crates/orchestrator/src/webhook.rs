use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use conflux_core::{IntegrationEvent, WebhookPayload, canonical_json};

use crate::queue::EventSender;
use crate::registry::IntegrationRegistry;

type HmacSha256 = Hmac<Sha256>;

/// Why a webhook signature was rejected. Internal to the gateway; callers
/// only ever see `false`.
#[derive(Debug, Error)]
enum SignatureError {
    #[error("invalid HMAC key: {0}")]
    Key(String),

    #[error("signature is not valid hex: {0}")]
    Encoding(String),

    #[error("signature mismatch")]
    Mismatch,
}

/// Stateless verifier and translator for inbound webhook deliveries.
///
/// Verifies the payload signature against the integration's configured
/// secret, converts accepted payloads into events, and enqueues them. Never
/// returns an error to the HTTP layer that received the delivery; every
/// failure is logged and collapses to `false`.
pub struct WebhookIngestGateway {
    registry: Arc<IntegrationRegistry>,
    events: EventSender,
    require_signature: bool,
}

impl WebhookIngestGateway {
    /// Create a gateway over the given registry and queue handle.
    pub fn new(registry: Arc<IntegrationRegistry>, events: EventSender) -> Self {
        Self {
            registry,
            events,
            require_signature: false,
        }
    }

    /// Reject payloads for integrations that have no configured webhook
    /// secret instead of accepting them unsigned.
    #[must_use]
    pub fn with_require_signature(mut self, require: bool) -> Self {
        self.require_signature = require;
        self
    }

    /// Verify, translate, and enqueue one inbound webhook delivery.
    ///
    /// Returns `true` and enqueues exactly one event when the payload is
    /// accepted; returns `false` and enqueues nothing otherwise.
    #[instrument(skip(self, payload), fields(integration = %integration_name, event_type = %payload.event_type))]
    pub async fn handle_webhook(&self, integration_name: &str, payload: WebhookPayload) -> bool {
        let Some(entry) = self.registry.get(integration_name) else {
            warn!("webhook for unknown integration rejected");
            return false;
        };
        if !entry.config.enabled {
            warn!("webhook for disabled integration rejected");
            return false;
        }

        match &entry.config.webhook_secret {
            Some(secret) => {
                if let Err(err) = verify_signature(secret, &payload) {
                    warn!(error = %err, "webhook signature verification failed");
                    entry.counters.increment_errors();
                    entry.state.record_error();
                    return false;
                }
                debug!("webhook signature verified");
            }
            None => {
                if self.require_signature {
                    warn!("unsigned webhook rejected: no secret configured and signatures are required");
                    return false;
                }
                warn!("no webhook secret configured, accepting unsigned payload");
            }
        }

        let event =
            IntegrationEvent::webhook(integration_name, payload.event_type, payload.data);
        if self.events.send(event).await.is_err() {
            warn!("event queue closed, webhook dropped");
            return false;
        }

        entry.counters.increment_webhook_events();
        entry.state.record_success();
        true
    }
}

/// Check `payload.signature` against
/// `HMAC-SHA256(secret, event_type + "." + canonical_json(data) + "." + timestamp)`
/// in constant time.
fn verify_signature(secret: &str, payload: &WebhookPayload) -> Result<(), SignatureError> {
    let message = format!(
        "{}.{}.{}",
        payload.event_type,
        canonical_json(&payload.data),
        payload.timestamp
    );

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::Key(e.to_string()))?;
    mac.update(message.as_bytes());
    let expected = mac.finalize().into_bytes();

    // Senders sometimes prefix the hex digest with the algorithm name.
    let signature = payload
        .signature
        .strip_prefix("sha256=")
        .unwrap_or(&payload.signature);
    let provided = hex::decode(signature).map_err(|e| SignatureError::Encoding(e.to_string()))?;

    if expected.ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use conflux_core::{IntegrationConfig, IntegrationProtocol};

    use super::*;
    use crate::queue::{EventQueue, EventReceiver, Overflow};

    fn sign(secret: &str, payload: &WebhookPayload) -> String {
        let message = format!(
            "{}.{}.{}",
            payload.event_type,
            canonical_json(&payload.data),
            payload.timestamp
        );
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn test_payload() -> WebhookPayload {
        WebhookPayload {
            event_type: "candidate_hired".into(),
            data: serde_json::json!({"candidate_id": 42, "job": "engineer"}),
            timestamp: "2026-08-06T12:00:00Z".into(),
            signature: String::new(),
            source: "ats".into(),
        }
    }

    fn gateway_with(
        config: IntegrationConfig,
    ) -> (WebhookIngestGateway, EventReceiver, Arc<IntegrationRegistry>) {
        let mut registry = IntegrationRegistry::new();
        registry.insert(config);
        let registry = Arc::new(registry);
        let (tx, rx) = EventQueue::bounded(8, Overflow::Block);
        let gateway = WebhookIngestGateway::new(Arc::clone(&registry), tx);
        (gateway, rx, registry)
    }

    #[tokio::test]
    async fn valid_signature_enqueues_one_event() {
        let (gateway, mut rx, registry) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook)
                .with_webhook_secret("hook-secret"),
        );

        let mut payload = test_payload();
        payload.signature = sign("hook-secret", &payload);

        assert!(gateway.handle_webhook("ats", payload).await);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "ats");
        assert_eq!(event.event_type, "candidate_hired");
        assert_eq!(event.payload["candidate_id"], 42);

        let entry = registry.get("ats").unwrap();
        assert_eq!(entry.counters.snapshot().webhook_events, 1);
        assert_eq!(entry.state.success_count(), 1);
    }

    #[tokio::test]
    async fn signature_accepts_sha256_prefix() {
        let (gateway, mut rx, _) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook).with_webhook_secret("s"),
        );

        let mut payload = test_payload();
        payload.signature = format!("sha256={}", sign("s", &payload));

        assert!(gateway.handle_webhook("ats", payload).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn tampered_signature_rejected_queue_unchanged() {
        let (gateway, _rx, registry) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook)
                .with_webhook_secret("hook-secret"),
        );

        let mut payload = test_payload();
        let mut signature = sign("hook-secret", &payload);
        // Flip one hex digit.
        let flipped = if signature.ends_with('0') { "1" } else { "0" };
        signature.replace_range(signature.len() - 1.., flipped);
        payload.signature = signature;

        let queue_len_before = gateway.events.len();
        assert!(!gateway.handle_webhook("ats", payload).await);
        assert_eq!(gateway.events.len(), queue_len_before, "nothing enqueued");

        let entry = registry.get("ats").unwrap();
        assert_eq!(entry.counters.snapshot().errors, 1);
        assert_eq!(entry.state.error_count(), 1);
    }

    #[tokio::test]
    async fn tampered_data_rejected() {
        let (gateway, _rx, _) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook).with_webhook_secret("s"),
        );

        let mut payload = test_payload();
        payload.signature = sign("s", &payload);
        payload.data["candidate_id"] = serde_json::json!(99);

        assert!(!gateway.handle_webhook("ats", payload).await);
    }

    #[tokio::test]
    async fn signature_invariant_under_key_order() {
        let (gateway, mut rx, _) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook).with_webhook_secret("s"),
        );

        // Sign over one key order, deliver the other.
        let mut payload = test_payload();
        payload.signature = sign("s", &payload);
        payload.data =
            serde_json::from_str(r#"{"job":"engineer","candidate_id":42}"#).unwrap();

        assert!(gateway.handle_webhook("ats", payload).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn no_secret_accepts_unsigned() {
        let (gateway, mut rx, _) =
            gateway_with(IntegrationConfig::new("ats", IntegrationProtocol::Webhook));

        let payload = test_payload();
        assert!(gateway.handle_webhook("ats", payload).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn require_signature_rejects_unsigned() {
        let mut registry = IntegrationRegistry::new();
        registry.insert(IntegrationConfig::new("ats", IntegrationProtocol::Webhook));
        let (tx, _rx) = EventQueue::bounded(8, Overflow::Block);
        let gateway =
            WebhookIngestGateway::new(Arc::new(registry), tx).with_require_signature(true);

        assert!(!gateway.handle_webhook("ats", test_payload()).await);
    }

    #[tokio::test]
    async fn unknown_integration_rejected() {
        let (gateway, _rx, _) =
            gateway_with(IntegrationConfig::new("ats", IntegrationProtocol::Webhook));
        assert!(!gateway.handle_webhook("not-registered", test_payload()).await);
    }

    #[tokio::test]
    async fn disabled_integration_rejected() {
        let (gateway, _rx, _) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook).disabled(),
        );
        assert!(!gateway.handle_webhook("ats", test_payload()).await);
    }

    #[tokio::test]
    async fn malformed_hex_rejected() {
        let (gateway, _rx, _) = gateway_with(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook).with_webhook_secret("s"),
        );

        let mut payload = test_payload();
        payload.signature = "not-hex-at-all".into();
        assert!(!gateway.handle_webhook("ats", payload).await);
    }
}
