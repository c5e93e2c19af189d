//! Client error types.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] frontdoor_protocol::ProtocolError),

    /// WebSocket handshake or transport failure.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// The embedded mock server failed.
    #[error("mock server error: {0}")]
    Mock(#[from] frontdoor_mock::MockError),

    /// Target URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A lifecycle stage of `open` did not finish in time.
    #[error("connect timed out during {stage} after {timeout:?}")]
    ConnectTimeout {
        stage: &'static str,
        timeout: Duration,
    },

    /// No close confirmation arrived and the transport still looks connected.
    #[error("close timed out after {timeout:?}")]
    CloseTimeout { timeout: Duration },

    /// No response with the awaited request id arrived in time.
    #[error("no response for request {request_id} within {timeout:?}")]
    ResponseTimeout { request_id: u32, timeout: Duration },

    /// The readiness probe never confirmed the remote listener.
    #[error("service on {host}:{port} is not accepting connections")]
    ServiceUnavailable { host: String, port: u16 },

    /// The connection closed while a response was awaited.
    #[error("connection closed")]
    ConnectionClosed,

    /// A send was attempted on a closed connection.
    #[error("not connected")]
    NotConnected,
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true for the timeout family of errors.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::CloseTimeout { .. } | Self::ResponseTimeout { .. }
        )
    }
}
