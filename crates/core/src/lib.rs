pub mod canonical;
pub mod config;
pub mod event;
pub mod state;

pub use canonical::canonical_json;
pub use config::{ConfigError, IntegrationConfig, IntegrationProtocol, load_integrations};
pub use event::{EventKind, EventStatus, IntegrationEvent, WebhookPayload};
pub use state::{IntegrationRuntimeState, IntegrationStatus, StateSnapshot};
