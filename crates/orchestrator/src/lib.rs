//! Integration event orchestration.
//!
//! Three producer families (polling workers, the inbound webhook gateway,
//! and streaming connectors) feed one bounded event queue consumed by a
//! single dispatcher, which routes events to application-supplied handlers.
//! Per-integration runtime state and operation counters are observable
//! through the read-only metrics collector.

pub mod builder;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod queue;
pub mod registry;
pub mod stream;
pub mod webhook;

pub use builder::OrchestratorBuilder;
pub use dispatcher::EventDispatcher;
pub use error::OrchestratorError;
pub use handler::{EventHandler, HandlerError, HandlerTable};
pub use metrics::{AggregateMetrics, IntegrationMetrics, MetricsCollector, OpsCounters, OpsSnapshot};
pub use orchestrator::Orchestrator;
pub use poller::PollingSyncWorker;
pub use queue::{EventQueue, EventReceiver, EventSender, Overflow, QueueClosed};
pub use registry::{IntegrationEntry, IntegrationRegistry, IntegrationStatusReport};
pub use stream::{StreamConnection, StreamError, StreamTransport, StreamingConnector, WsTransport};
pub use webhook::WebhookIngestGateway;
