//! Basic example: build an orchestrator with one webhook integration and a
//! printing handler, then push a signed delivery through it.
//!
//! Run with: `cargo run -p conflux-orchestrator --example basic`

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use conflux_core::{IntegrationConfig, IntegrationEvent, IntegrationProtocol, WebhookPayload,
    canonical_json};
use conflux_orchestrator::{EventHandler, HandlerError, OrchestratorBuilder};

/// A handler that prints every event it receives.
struct PrintHandler;

#[async_trait]
impl EventHandler for PrintHandler {
    async fn handle(&self, event: &IntegrationEvent) -> Result<(), HandlerError> {
        println!(
            "  [handler] {} from '{}': {}",
            event.event_type, event.source, event.payload
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let secret = "example-webhook-secret";

    let mut orchestrator = OrchestratorBuilder::new()
        .generic_handler(Arc::new(PrintHandler))
        .integration(
            IntegrationConfig::new("ats", IntegrationProtocol::Webhook)
                .with_webhook_secret(secret),
        )
        .build()
        .expect("failed to build orchestrator");

    orchestrator.start().expect("failed to start orchestrator");

    // Simulate an inbound delivery from the ATS.
    let mut payload = WebhookPayload {
        event_type: "candidate_hired".into(),
        data: serde_json::json!({"candidate_id": 42, "job": "engineer"}),
        timestamp: "2026-08-06T12:00:00Z".into(),
        signature: String::new(),
        source: "ats".into(),
    };
    let message = format!(
        "{}.{}.{}",
        payload.event_type,
        canonical_json(&payload.data),
        payload.timestamp
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    payload.signature = hex::encode(mac.finalize().into_bytes());

    let accepted = orchestrator.handle_webhook("ats", payload).await;
    println!("webhook accepted: {accepted}");

    // Give the dispatcher a moment to route the event.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let status = orchestrator.integration_status("ats").unwrap();
    println!(
        "ats status: {:?}, successes: {}",
        status.status, status.success_count
    );

    orchestrator.shutdown().await;
}
