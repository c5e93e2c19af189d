//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or parsing envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON or lacks mandatory header fields.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Method string is not one of GET, POST, PUT, DELETE, NOTIFY.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Request body was given as text that does not parse as JSON.
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// Failed to serialize an envelope to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Envelope exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Creates a malformed envelope error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope(message.into())
    }
}
