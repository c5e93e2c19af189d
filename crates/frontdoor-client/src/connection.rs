//! Duplex WebSocket connection to a FrontDoor endpoint.
//!
//! A [`Connection`] owns the socket lifecycle. A background task reads
//! frames and hands them to the [`NotificationChannel`]; callers send on
//! their own task and meet the reader only through the shared inbox and
//! the state channel.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use frontdoor_protocol::{Envelope, EnvelopeOptions, Method, RequestBody, encode_request};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{WebSocketStream, client_async};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::correlator::{ArrivalFilter, Correlator, Inbox};
use crate::error::{ClientError, ClientResult};
use crate::notifications::{NotificationChannel, NotificationMode};
use crate::readiness::{ProbeTarget, ReadinessProbe, await_ready, tcp_probe};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type SharedSink = Arc<tokio::sync::Mutex<Option<WsSink>>>;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Result of [`Connection::send`].
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The correlated response.
    Response(Envelope),
    /// Transmitted without waiting for a response.
    Sent { request_id: u32 },
    /// The transport reported the channel closed; nothing was sent.
    NotConnected,
}

impl SendOutcome {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// The response, if one was awaited and received.
    pub fn response(self) -> Option<Envelope> {
        match self {
            Self::Response(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// Client side of a FrontDoor session.
pub struct Connection {
    config: ConnectionConfig,
    options: EnvelopeOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    sink: SharedSink,
    correlator: Correlator,
    channel: Arc<NotificationChannel>,
    probe: ReadinessProbe,
    reader: Mutex<Option<JoinHandle<()>>>,
    open_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Creates a closed connection.
    pub fn new(config: ConnectionConfig) -> Self {
        let inbox = Arc::new(Inbox::new());
        let channel = Arc::new(NotificationChannel::new(config.notification_mode, inbox.clone()));
        let (state, _) = watch::channel(ConnectionState::Closed);
        let probe = tcp_probe(config.readiness_interval);

        Self {
            options: config.envelope_options(),
            config,
            state: Arc::new(state),
            sink: Arc::new(tokio::sync::Mutex::new(None)),
            correlator: Correlator::new(inbox),
            channel,
            probe,
            reader: Mutex::new(None),
            open_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the readiness probe used for remote targets.
    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Creates a connection and opens it.
    pub async fn connect(config: ConnectionConfig) -> ClientResult<Self> {
        let connection = Self::new(config);
        connection.open().await?;
        Ok(connection)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Observes state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn notifications(&self) -> &Arc<NotificationChannel> {
        &self.channel
    }

    pub fn inbox(&self) -> &Arc<Inbox> {
        self.correlator.inbox()
    }

    /// Opens the connection. Does nothing when already open.
    pub async fn open(&self) -> ClientResult<()> {
        let _guard = self.open_lock.lock().await;
        if self.is_open() {
            return Ok(());
        }

        self.state.send_replace(ConnectionState::Opening);
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(host = %self.config.host, port = self.config.port, error = %e, "open failed");
                self.state.send_replace(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> ClientResult<()> {
        let config = &self.config;
        let local = config.is_local();

        if !local {
            let target = ProbeTarget::new(config.host.clone(), config.port);
            await_ready(&self.probe, target, config.readiness_timeout, config.readiness_interval).await?;
        }

        if let Some(previous) = self.reader_slot().take() {
            previous.abort();
        }

        let url = config.url()?;
        info!(%url, "opening websocket connection");

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout {
            stage: "socket",
            timeout: config.connect_timeout,
        })??;

        let mut request = url.as_str().into_client_request()?;
        if !local {
            let protocol = HeaderValue::from_str(&config.subprotocol)
                .map_err(|e| ClientError::config(format!("invalid subprotocol: {}", e)))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        }

        let (websocket, _response) = tokio::time::timeout(config.handshake_timeout, client_async(request, stream))
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                stage: "handshake",
                timeout: config.handshake_timeout,
            })??;

        let (sink, frames) = websocket.split();
        *self.sink.lock().await = Some(sink);
        self.inbox().reset();

        let mut state = self.state.subscribe();
        let task = tokio::spawn(receive_loop(
            frames,
            self.channel.clone(),
            self.state.clone(),
            self.sink.clone(),
            config.close_timeout,
        ));
        *self.reader_slot() = Some(task);

        let opened = tokio::time::timeout(
            config.open_timeout,
            state.wait_for(|state| *state != ConnectionState::Opening),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout {
            stage: "open",
            timeout: config.open_timeout,
        })?
        .map(|state| *state == ConnectionState::Open)
        .unwrap_or(false);

        if opened {
            debug!(%url, "websocket connection open");
            Ok(())
        } else {
            Err(ClientError::ConnectionClosed)
        }
    }

    fn reader_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a request.
    ///
    /// With `wait_for_response` the call blocks until the correlated
    /// response arrives (NOTIFY is never waited on). A closed transport
    /// yields [`SendOutcome::NotConnected`] rather than an error.
    pub async fn send(
        &self,
        method: Method,
        resource: &str,
        body: Option<RequestBody>,
        wait_for_response: bool,
    ) -> ClientResult<SendOutcome> {
        if !self.is_open() && self.config.auto_reopen {
            debug!("connection closed, reopening before send");
            self.open().await?;
        }

        let request_id = {
            let mut sink = self.sink.lock().await;
            let Some(writer) = sink.as_mut() else {
                debug!(%resource, "send on closed connection");
                return Ok(SendOutcome::NotConnected);
            };
            let request_id = self.correlator.next_request_id();
            let text = encode_request(method, resource, body, request_id, &self.options)?;
            debug!(%method, %resource, request_id, "sending request");
            if let Err(e) = writer.send(Message::Text(text)).await {
                warn!(%resource, error = %e, "send failed, connection is closed");
                sink.take();
                drop(sink);
                self.mark_closed();
                return Ok(SendOutcome::NotConnected);
            }
            request_id
        };

        if wait_for_response && method != Method::Notify {
            self.await_response(request_id).await.map(SendOutcome::Response)
        } else {
            Ok(SendOutcome::Sent { request_id })
        }
    }

    /// Waits for the response to `request_id` within the configured window.
    pub async fn await_response(&self, request_id: u32) -> ClientResult<Envelope> {
        self.await_response_within(request_id, self.config.response_timeout).await
    }

    /// Waits for the response to `request_id`.
    ///
    /// A timeout tears the connection down: every other waiter on it fails
    /// as well.
    pub async fn await_response_within(&self, request_id: u32, timeout: Duration) -> ClientResult<Envelope> {
        match self.correlator.await_response(request_id, timeout).await {
            Err(e @ ClientError::ResponseTimeout { .. }) => {
                warn!(request_id, ?timeout, "response timed out, closing connection");
                if let Err(close_error) = self.close().await {
                    warn!(error = %close_error, "close after response timeout failed");
                }
                Err(e)
            }
            other => other,
        }
    }

    /// Closes the connection.
    ///
    /// Fails with [`ClientError::CloseTimeout`] when no close confirmation
    /// arrives in time and the transport still looks connected; the state
    /// is forced to closed either way.
    pub async fn close(&self) -> ClientResult<()> {
        if self.state() == ConnectionState::Closed && self.sink.lock().await.is_none() {
            return Ok(());
        }

        info!(host = %self.config.host, "closing websocket connection");
        self.state.send_replace(ConnectionState::Closing);

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink
            && let Err(e) = sink.close().await
        {
            debug!(error = %e, "close frame not sent");
        }

        let timeout = self.config.close_timeout;
        let mut state = self.state.subscribe();
        let confirmed = tokio::time::timeout(timeout, state.wait_for(|state| *state == ConnectionState::Closed))
            .await
            .is_ok();
        if confirmed {
            return Ok(());
        }

        let still_connected = self.reader_slot().as_ref().is_some_and(|task| !task.is_finished());
        self.mark_closed();
        if still_connected {
            Err(ClientError::CloseTimeout { timeout })
        } else {
            Ok(())
        }
    }

    /// Forces the closed state: stops the reader and fails pending waiters.
    fn mark_closed(&self) {
        if let Some(task) = self.reader_slot().take() {
            task.abort();
        }
        self.inbox().close();
        self.state.send_replace(ConnectionState::Closed);
    }

    /// Registers a callback run for every inbound envelope on `resource`.
    pub fn add_endpoint<F>(&self, resource: impl Into<String>, callback: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.channel.add_endpoint(resource, Arc::new(callback));
    }

    pub fn last_notification(&self) -> Option<Envelope> {
        self.channel.last_notification()
    }

    pub fn pop_notification(&self) -> Option<Envelope> {
        self.channel.pop_notification()
    }

    pub fn notifications_empty(&self) -> bool {
        self.channel.notifications_empty()
    }

    pub fn drain_notifications_to(&self, remaining: usize) -> Vec<Envelope> {
        self.channel.drain_notifications_to(remaining)
    }

    /// Waits for the next notification; see [`NotificationChannel::next_notification`].
    pub async fn next_notification(&self, timeout: Duration) -> Option<Envelope> {
        self.channel.next_notification(timeout).await
    }

    pub fn notification_mode(&self) -> NotificationMode {
        self.channel.mode()
    }

    pub fn set_arrival_filter(&self, filter: Option<ArrivalFilter>) {
        self.inbox().set_arrival_filter(filter);
    }

    pub async fn wait_arrival(&self, timeout: Duration) -> bool {
        self.inbox().wait_arrival(timeout).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.reader_slot().take() {
            task.abort();
        }
    }
}

async fn receive_loop(
    mut frames: SplitStream<WsStream>,
    channel: Arc<NotificationChannel>,
    state: Arc<watch::Sender<ConnectionState>>,
    sink: SharedSink,
    close_timeout: Duration,
) {
    state.send_replace(ConnectionState::Open);

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                channel.dispatch_text(&text);
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    channel.dispatch_text(&text);
                }
                Err(_) => warn!("dropping non-UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "close frame received");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "transport error, closing connection");
                break;
            }
        }
    }

    state.send_if_modified(|current| {
        let changed = *current == ConnectionState::Open;
        if changed {
            *current = ConnectionState::Closing;
        }
        changed
    });
    let writer = sink.lock().await.take();
    if let Some(mut writer) = writer
        && tokio::time::timeout(close_timeout, writer.close()).await.is_err()
    {
        debug!("timed out flushing close frame");
    }

    channel.inbox().close();
    state.send_replace(ConnectionState::Closed);
    debug!("receive loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(port: u16) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", port)
            .with_connect_timeout(Duration::from_secs(2))
            .with_auto_reopen(false)
    }

    #[tokio::test]
    async fn new_connection_is_closed() {
        let connection = Connection::new(local_config(1));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(!connection.is_open());
        assert!(connection.close().await.is_ok());
    }

    #[tokio::test]
    async fn send_without_open_is_not_connected() {
        let connection = Connection::new(local_config(1));
        let outcome = connection
            .send(Method::Get, "/system/language", None, true)
            .await
            .unwrap();
        assert!(outcome.is_not_connected());
    }

    #[tokio::test]
    async fn failed_sends_do_not_consume_request_ids() {
        let connection = Connection::new(local_config(1));
        for _ in 0..3 {
            let outcome = connection
                .send(Method::Put, "/audio/volume", None, false)
                .await
                .unwrap();
            assert!(outcome.is_not_connected());
        }
        assert_eq!(connection.correlator.ids().peek(), 0);
    }

    #[tokio::test]
    async fn open_refused_port_fails_and_stays_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connection = Connection::new(local_config(port));
        let result = connection.open().await;
        assert!(matches!(result, Err(ClientError::Io(_))));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn remote_target_checks_readiness_first() {
        use crate::readiness::{ProbeFuture, ProbeOutcome};

        let probe: ReadinessProbe =
            Arc::new(|_: ProbeTarget| -> ProbeFuture { Box::pin(async { ProbeOutcome::NotReady }) });
        let config = ConnectionConfig::new("192.0.2.10", 8082)
            .with_readiness(Duration::from_millis(30), Duration::from_millis(10));
        let connection = Connection::new(config).with_probe(probe);

        let result = connection.open().await;
        assert!(matches!(result, Err(ClientError::ServiceUnavailable { .. })));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn send_outcome_helpers() {
        assert!(SendOutcome::NotConnected.is_not_connected());
        assert!(SendOutcome::Sent { request_id: 1 }.response().is_none());
    }
}
