//! Mock server error types.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for mock server operations.
pub type MockResult<T> = Result<T, MockError>;

/// Errors that can occur in the mock server.
#[derive(Debug, Error)]
pub enum MockError {
    /// IO error (bind, accept).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Envelope could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] frontdoor_protocol::ProtocolError),

    /// WebSocket handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// No connected client has registered the resource.
    #[error("Resource not found: {resource}")]
    ResourceNotFound { resource: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl From<tungstenite::Error> for MockError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl MockError {
    /// Creates a resource-not-found error.
    pub fn resource_not_found(resource: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource: resource.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
