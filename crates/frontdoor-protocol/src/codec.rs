//! JSON envelope encoding and decoding.
//!
//! Each WebSocket text frame carries exactly one envelope:
//!
//! ```text
//! {"header":{"resource":"/audio/volume","method":"PUT","version":1,
//!            "device":"GUID","token":"...","msgtype":"REQUEST","reqID":3},
//!  "body":{"value":40}}
//! ```

use serde_json::Value;

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Envelope, Header, MessageType, Method};

/// Request payload as handed to the encoder.
///
/// Text bodies are parsed as JSON before being nested in the envelope, so
/// `"{\"value\":40}"` and `json!({"value": 40})` encode identically.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Already-structured JSON.
    Json(Value),
    /// Serialized JSON text.
    Text(String),
}

impl RequestBody {
    /// Resolves the body into a JSON value.
    ///
    /// Empty or whitespace-only text yields `None`.
    pub fn into_value(self) -> ProtocolResult<Option<Value>> {
        match self {
            Self::Json(Value::Null) => Ok(None),
            Self::Json(value) => Ok(Some(value)),
            Self::Text(text) if text.trim().is_empty() => Ok(None),
            Self::Text(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(ProtocolError::InvalidBody),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Header metadata stamped on every outgoing envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeOptions {
    /// Protocol version.
    pub version: u32,
    /// Device identifier.
    pub device_id: String,
    /// Auth token, attached to everything except NOTIFY.
    pub token: Option<String>,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            version: 1,
            device_id: "GUID".to_string(),
            token: None,
        }
    }
}

impl EnvelopeOptions {
    /// Builder: set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builder: set the device identifier.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Builder: set the protocol version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// Builds the envelope for an outgoing request without serializing it.
///
/// - NOTIFY carries no `msgtype` and no `token`.
/// - GET never carries a body, even if one is given.
/// - POST, PUT and DELETE carry `msgtype=REQUEST`, the token, and the body
///   when one is present.
pub fn build_request(
    method: Method,
    resource: &str,
    body: Option<RequestBody>,
    request_id: u32,
    options: &EnvelopeOptions,
) -> ProtocolResult<Envelope> {
    let mut header = Header::new(method, resource);
    header.version = Some(options.version.into());
    header.device_id = Some(options.device_id.clone());
    header.request_id = Some(request_id);

    if method != Method::Notify {
        header.token = options.token.clone();
        header.message_type = Some(MessageType::Request);
    }

    let body = match body {
        Some(body) if method.carries_body() => body.into_value()?,
        _ => None,
    };

    Ok(Envelope {
        header,
        body,
        error: None,
    })
}

/// Encodes an outgoing request to its wire text.
///
/// # Example
///
/// ```rust
/// use frontdoor_protocol::{EnvelopeOptions, Method, encode_request};
///
/// let text = encode_request(Method::Get, "/system/language", None, 0, &EnvelopeOptions::default()).unwrap();
/// assert!(text.contains("\"reqID\":0"));
/// assert!(!text.contains("\"body\""));
/// ```
pub fn encode_request(
    method: Method,
    resource: &str,
    body: Option<RequestBody>,
    request_id: u32,
    options: &EnvelopeOptions,
) -> ProtocolResult<String> {
    let envelope = build_request(method, resource, body, request_id, options)?;
    encode_message(&envelope)
}

/// Serializes an envelope, enforcing [`MAX_MESSAGE_SIZE`].
pub fn encode_message(envelope: &Envelope) -> ProtocolResult<String> {
    let text = serde_json::to_string(envelope)?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(text)
}

/// Parses wire text into an envelope.
///
/// Fails with [`ProtocolError::MalformedEnvelope`] when the text is not JSON
/// or when `header.resource` / `header.method` are missing.
pub fn decode_message(text: &str) -> ProtocolResult<Envelope> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    serde_json::from_str(text).map_err(|e| ProtocolError::malformed(e.to_string()))
}
