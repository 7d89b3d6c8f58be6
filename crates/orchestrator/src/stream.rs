use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use conflux_core::{IntegrationConfig, IntegrationEvent, IntegrationRuntimeState, IntegrationStatus};

use crate::metrics::OpsCounters;
use crate::queue::EventSender;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Errors on a streaming connection.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The established connection failed mid-stream.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Factory for streaming connections. The seam that lets tests substitute a
/// scripted transport for a real WebSocket.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a connection to the given URL.
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, StreamError>;
}

/// One established streaming connection.
#[async_trait]
pub trait StreamConnection: Send {
    /// Receive the next text message. `None` means the peer closed the
    /// connection cleanly.
    async fn next_message(&mut self) -> Option<Result<String, StreamError>>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
pub struct WsTransport;

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, StreamError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { inner: ws }))
    }
}

struct WsConnection {
    inner: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
        use tokio_tungstenite::tungstenite::Message;

        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Control frames and binary payloads carry no events.
                Ok(_) => {}
                Err(e) => return Some(Err(StreamError::Protocol(e.to_string()))),
            }
        }
    }
}

/// Long-lived receive loop for one streaming integration.
///
/// Maintains a single persistent connection; each well-formed inbound
/// message becomes an event. Malformed messages are logged and skipped with
/// the connection left open. Any disconnect, clean or not, leads to a
/// fixed-delay reconnect, forever, until cancellation.
pub struct StreamingConnector {
    config: IntegrationConfig,
    state: Arc<IntegrationRuntimeState>,
    counters: Arc<OpsCounters>,
    events: EventSender,
    transport: Arc<dyn StreamTransport>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
}

impl StreamingConnector {
    /// Create a connector for the given integration.
    pub fn new(
        config: IntegrationConfig,
        state: Arc<IntegrationRuntimeState>,
        counters: Arc<OpsCounters>,
        events: EventSender,
        transport: Arc<dyn StreamTransport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            counters,
            events,
            transport,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            cancel,
        }
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run the connect/receive/reconnect loop until cancelled.
    #[instrument(skip(self), fields(integration = %self.config.name))]
    pub async fn run(self) {
        info!("streaming connector starting");
        self.state.set_status(IntegrationStatus::Active);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.transport.connect(&self.config.endpoint) => result,
            };

            match connected {
                Ok(connection) => {
                    info!("stream connected");
                    self.state.set_status(IntegrationStatus::Active);
                    if self.receive_loop(connection).await == LoopExit::Stopped {
                        break;
                    }
                }
                Err(err) => {
                    self.state.record_error();
                    self.counters.increment_errors();
                    self.state.set_status(IntegrationStatus::Error);
                    warn!(error = %err, "stream connect failed");
                }
            }

            if !self.sleep(self.reconnect_delay).await {
                break;
            }
            debug!("reconnecting stream");
        }

        self.state.set_status(IntegrationStatus::Inactive);
        info!("streaming connector stopped");
    }

    /// Drain one connection. Returns whether the outer loop should
    /// reconnect or stop.
    async fn receive_loop(&self, mut connection: Box<dyn StreamConnection>) -> LoopExit {
        loop {
            let message = tokio::select! {
                () = self.cancel.cancelled() => return LoopExit::Stopped,
                message = connection.next_message() => message,
            };

            match message {
                None => {
                    info!("stream closed by peer");
                    return LoopExit::Reconnect;
                }
                Some(Err(err)) => {
                    self.state.record_error();
                    self.counters.increment_errors();
                    warn!(error = %err, "stream errored");
                    return LoopExit::Reconnect;
                }
                Some(Ok(text)) => match serde_json::from_str(&text) {
                    Err(err) => {
                        // Parse failures do not cost the connection.
                        warn!(error = %err, "malformed stream message, skipping");
                    }
                    Ok(payload) => {
                        let event = IntegrationEvent::message(&self.config.name, payload);
                        if self.events.send(event).await.is_err() {
                            warn!("event queue closed, stopping streaming connector");
                            return LoopExit::Stopped;
                        }
                        self.counters.increment_websocket_messages();
                        self.state.record_success();
                    }
                },
            }
        }
    }

    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

#[derive(PartialEq, Eq)]
enum LoopExit {
    Reconnect,
    Stopped,
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use conflux_core::IntegrationProtocol;

    use super::*;
    use crate::queue::{EventQueue, Overflow};

    /// One step in a scripted connection.
    enum Step {
        /// Deliver a text message.
        Msg(&'static str),
        /// Fail the connection with a protocol error.
        Fail,
        /// Close the connection cleanly.
        Close,
    }

    /// Transport that replays scripted connections. A connection whose steps
    /// run out without a `Close` or `Fail` stays open and idle forever;
    /// once all scripted connections are consumed, further connect attempts
    /// fail like an unreachable endpoint.
    struct ScriptedTransport {
        connections: Mutex<VecDeque<Vec<Step>>>,
        connects: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(connections: Vec<Vec<Step>>) -> Arc<Self> {
            Arc::new(Self {
                connections: Mutex::new(connections.into()),
                connects: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn connect(&self, _url: &str) -> Result<Box<dyn StreamConnection>, StreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let Some(steps) = self.connections.lock().pop_front() else {
                return Err(StreamError::Connect("endpoint unreachable".into()));
            };
            Ok(Box::new(ScriptedConnection {
                steps: steps.into(),
            }))
        }
    }

    struct ScriptedConnection {
        steps: VecDeque<Step>,
    }

    #[async_trait]
    impl StreamConnection for ScriptedConnection {
        async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
            match self.steps.pop_front() {
                Some(Step::Msg(text)) => Some(Ok(text.to_owned())),
                Some(Step::Fail) => Some(Err(StreamError::Protocol("scripted error".into()))),
                Some(Step::Close) => None,
                // Idle: hold the connection open until the connector is
                // cancelled.
                None => std::future::pending().await,
            }
        }
    }

    fn connector(
        transport: Arc<ScriptedTransport>,
    ) -> (
        StreamingConnector,
        crate::queue::EventReceiver,
        Arc<IntegrationRuntimeState>,
        Arc<OpsCounters>,
        CancellationToken,
    ) {
        let (tx, rx) = EventQueue::bounded(16, Overflow::Block);
        let state = Arc::new(IntegrationRuntimeState::new());
        let counters = Arc::new(OpsCounters::default());
        let cancel = CancellationToken::new();
        let config = IntegrationConfig::new("chat", IntegrationProtocol::Websocket)
            .with_endpoint("wss://chat.example.com/feed");
        let connector = StreamingConnector::new(
            config,
            Arc::clone(&state),
            Arc::clone(&counters),
            tx,
            transport,
            cancel.clone(),
        )
        .with_reconnect_delay(Duration::from_millis(5));
        (connector, rx, state, counters, cancel)
    }

    async fn wait_for(read: impl Fn() -> u64, target: u64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while read() < target {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for counter to reach {target}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn malformed_message_skipped_connection_kept() {
        let transport = ScriptedTransport::new(vec![vec![
            Step::Msg("{not json"),
            Step::Msg(r#"{"text":"hello"}"#),
        ]]);
        let (connector, mut rx, _state, counters, cancel) = connector(Arc::clone(&transport));

        let task = tokio::spawn(connector.run());
        {
            let counters = Arc::clone(&counters);
            wait_for(move || counters.snapshot().websocket_messages, 1).await;
        }

        // Only the well-formed message became an event, over a single
        // connection.
        assert_eq!(counters.snapshot().websocket_messages, 1);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "chat_message");
        assert_eq!(event.payload["text"], "hello");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_clean_close() {
        let transport = ScriptedTransport::new(vec![
            vec![Step::Msg(r#"{"n":1}"#), Step::Close],
            vec![Step::Msg(r#"{"n":2}"#)],
        ]);
        let (connector, mut rx, state, counters, cancel) = connector(Arc::clone(&transport));

        let task = tokio::spawn(connector.run());
        {
            let counters = Arc::clone(&counters);
            wait_for(move || counters.snapshot().websocket_messages, 2).await;
        }

        assert!(transport.connects.load(Ordering::SeqCst) >= 2);
        // Clean closes are not errors.
        assert_eq!(state.error_count(), 0);

        assert_eq!(rx.recv().await.unwrap().payload["n"], 1);
        assert_eq!(rx.recv().await.unwrap().payload["n"], 2);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(state.status(), IntegrationStatus::Inactive);
    }

    #[tokio::test]
    async fn stream_error_counts_and_reconnects() {
        let transport = ScriptedTransport::new(vec![
            vec![Step::Fail],
            vec![Step::Msg(r#"{"ok":true}"#)],
        ]);
        let (connector, _rx, state, counters, cancel) = connector(Arc::clone(&transport));

        let task = tokio::spawn(connector.run());
        {
            let counters = Arc::clone(&counters);
            wait_for(move || counters.snapshot().websocket_messages, 1).await;
        }

        assert_eq!(state.error_count(), 1);
        assert!(transport.connects.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_marks_error_and_retries() {
        // Empty script: every connect attempt fails.
        let transport = ScriptedTransport::new(vec![]);
        let (connector, _rx, state, _counters, cancel) = connector(Arc::clone(&transport));

        let task = tokio::spawn(connector.run());
        {
            let state = Arc::clone(&state);
            wait_for(move || state.error_count(), 2).await;
        }

        assert_eq!(state.status(), IntegrationStatus::Error);
        assert!(transport.connects.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(state.status(), IntegrationStatus::Inactive);
    }
}
