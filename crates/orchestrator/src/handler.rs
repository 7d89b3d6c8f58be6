use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use conflux_core::{EventKind, IntegrationEvent};

/// Error returned by a downstream event handler.
///
/// Handlers are external collaborators; whatever goes wrong on their side is
/// carried here as a message and recorded on the failed event.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a handler error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Downstream consumer of dispatched events.
///
/// Implementations must not block the dispatcher for extended periods;
/// long-running work should be handed off to a task owned by the
/// collaborator.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event.
    async fn handle(&self, event: &IntegrationEvent) -> Result<(), HandlerError>;
}

/// Type-to-handler routing table.
///
/// Routing is an exhaustive match on [`EventKind`]: sync events go to the
/// sync handler, stream messages to the message handler, and everything
/// else (webhook deliveries) to the generic handler.
#[derive(Clone)]
pub struct HandlerTable {
    sync: Arc<dyn EventHandler>,
    message: Arc<dyn EventHandler>,
    generic: Arc<dyn EventHandler>,
}

impl HandlerTable {
    /// Build a table from the three handler slots.
    pub fn new(
        sync: Arc<dyn EventHandler>,
        message: Arc<dyn EventHandler>,
        generic: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            sync,
            message,
            generic,
        }
    }

    /// Route every kind to the same handler.
    pub fn uniform(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            sync: Arc::clone(&handler),
            message: Arc::clone(&handler),
            generic: handler,
        }
    }

    /// Look up the handler for an event kind.
    pub fn handler_for(&self, kind: EventKind) -> &Arc<dyn EventHandler> {
        match kind {
            EventKind::Sync => &self.sync,
            EventKind::Message => &self.message,
            EventKind::Webhook => &self.generic,
        }
    }
}
