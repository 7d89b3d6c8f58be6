use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use conflux_core::IntegrationEvent;

use crate::handler::HandlerTable;
use crate::queue::EventReceiver;
use crate::registry::IntegrationRegistry;

/// Sole consumer of the event queue.
///
/// Pops events one at a time and routes each to its handler through the
/// [`HandlerTable`]. Every event is processed inside a failure boundary: a
/// handler error marks the event `Error`, is counted against the source
/// integration, and the loop moves on. One bad event never stalls the
/// pipeline. Delivery is at-least-once; failed events are not re-delivered.
pub struct EventDispatcher {
    receiver: EventReceiver,
    handlers: HandlerTable,
    registry: Arc<IntegrationRegistry>,
    cancel: CancellationToken,
}

impl EventDispatcher {
    /// Create a dispatcher consuming `receiver`.
    pub fn new(
        receiver: EventReceiver,
        handlers: HandlerTable,
        registry: Arc<IntegrationRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            handlers,
            registry,
            cancel,
        }
    }

    /// Run until cancelled or until every producer handle is dropped and
    /// the queue is drained.
    ///
    /// Cancellation stops the loop immediately; events still queued at that
    /// point are dropped.
    pub async fn run(mut self) {
        info!("event dispatcher starting");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("event dispatcher received shutdown signal");
                    break;
                }
                maybe = self.receiver.recv() => {
                    let Some(event) = maybe else {
                        info!("event queue closed, dispatcher draining complete");
                        break;
                    };
                    self.process(event).await;
                }
            }
        }

        info!("event dispatcher stopped");
    }

    async fn process(&self, mut event: IntegrationEvent) {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            "dispatching event"
        );

        let handler = self.handlers.handler_for(event.kind);
        match handler.handle(&event).await {
            Ok(()) => {
                event.mark_completed();
                debug!(event_id = %event.id, "event handled");
            }
            Err(err) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    source = %event.source,
                    error = %err,
                    "handler failed, continuing with next event"
                );
                event.mark_error(err.to_string());
                if let Some(entry) = self.registry.get(&event.source) {
                    entry.counters.increment_errors();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use conflux_core::{IntegrationConfig, IntegrationProtocol};

    use super::*;
    use crate::handler::{EventHandler, HandlerError};
    use crate::queue::{EventQueue, Overflow};

    struct CountingHandler {
        handled: AtomicU32,
        fail_first: AtomicU32,
    }

    impl CountingHandler {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                handled: AtomicU32::new(0),
                fail_first: AtomicU32::new(fail_first),
            })
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &IntegrationEvent) -> Result<(), HandlerError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(HandlerError::new("induced failure"));
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_registry(name: &str) -> Arc<IntegrationRegistry> {
        let mut registry = IntegrationRegistry::new();
        registry.insert(IntegrationConfig::new(name, IntegrationProtocol::Api));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn drains_queue_when_producers_drop() {
        let (tx, rx) = EventQueue::bounded(8, Overflow::Block);
        let handler = CountingHandler::new(0);
        let registry = test_registry("src");
        let dispatcher = EventDispatcher::new(
            rx,
            HandlerTable::uniform(Arc::clone(&handler) as Arc<dyn EventHandler>),
            registry,
            CancellationToken::new(),
        );

        for _ in 0..4 {
            tx.send(IntegrationEvent::sync("src", serde_json::Value::Null))
                .await
                .unwrap();
        }
        drop(tx);

        dispatcher.run().await;
        assert_eq!(handler.handled.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn handler_failure_does_not_stall_pipeline() {
        let (tx, rx) = EventQueue::bounded(8, Overflow::Block);
        let handler = CountingHandler::new(1);
        let registry = test_registry("src");
        let dispatcher = EventDispatcher::new(
            rx,
            HandlerTable::uniform(Arc::clone(&handler) as Arc<dyn EventHandler>),
            Arc::clone(&registry),
            CancellationToken::new(),
        );

        // First event fails in the handler; the second must still be
        // processed and the queue must drain to empty.
        tx.send(IntegrationEvent::sync("src", serde_json::json!({"n": 1})))
            .await
            .unwrap();
        tx.send(IntegrationEvent::sync("src", serde_json::json!({"n": 2})))
            .await
            .unwrap();
        drop(tx);

        dispatcher.run().await;

        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        let entry = registry.get("src").unwrap();
        assert_eq!(entry.counters.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_loop() {
        let (tx, rx) = EventQueue::bounded(8, Overflow::Block);
        let handler = CountingHandler::new(0);
        let registry = test_registry("src");
        let cancel = CancellationToken::new();
        let dispatcher = EventDispatcher::new(
            rx,
            HandlerTable::uniform(Arc::clone(&handler) as Arc<dyn EventHandler>),
            registry,
            cancel.clone(),
        );

        let task = tokio::spawn(dispatcher.run());
        cancel.cancel();
        task.await.unwrap();

        // The sender is still alive; the loop exited on cancellation alone.
        drop(tx);
    }
}
