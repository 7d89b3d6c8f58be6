use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use conflux_core::IntegrationEvent;

/// Returned when sending into a queue whose receiver has been dropped.
#[derive(Debug, Error)]
#[error("event queue is closed")]
pub struct QueueClosed;

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Await capacity, applying backpressure to the producer.
    Block,
    /// Drop the event being sent, log it, and count it.
    DropNewest,
}

/// The single multi-producer, single-consumer ingestion channel.
///
/// FIFO per producer; no ordering guarantee across independent producers
/// beyond arrival order. Bounded: the overflow policy decides whether a
/// full queue blocks producers or sheds load.
pub struct EventQueue;

impl EventQueue {
    /// Default queue capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a bounded queue, returning the cloneable producer handle and
    /// the sole consumer handle.
    pub fn bounded(capacity: usize, overflow: Overflow) -> (EventSender, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let sender = EventSender {
            tx,
            overflow,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sender, EventReceiver { rx })
    }
}

/// Producer handle for the event queue. Cheap to clone.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<IntegrationEvent>,
    overflow: Overflow,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Push an event. Behavior on a full queue follows the overflow policy;
    /// a dropped event is not an error, a closed queue is.
    pub async fn send(&self, event: IntegrationEvent) -> Result<(), QueueClosed> {
        match self.overflow {
            Overflow::Block => self.tx.send(event).await.map_err(|_| QueueClosed),
            Overflow::DropNewest => match self.tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(event)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        source = %event.source,
                        event_type = %event.event_type,
                        "event queue full, dropping event"
                    );
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueClosed),
            },
        }
    }

    /// Number of events shed under [`Overflow::DropNewest`].
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer handle for the event queue. Exactly one exists per queue.
pub struct EventReceiver {
    rx: mpsc::Receiver<IntegrationEvent>,
}

impl EventReceiver {
    /// Receive the next event; `None` once every sender is dropped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<IntegrationEvent> {
        self.rx.recv().await
    }
}
