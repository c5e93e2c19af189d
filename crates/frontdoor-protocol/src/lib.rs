//! Wire envelope types and JSON codec for the FrontDoor control protocol.
//!
//! FrontDoor speaks JSON envelopes over a persistent WebSocket. Every
//! envelope has a `header` (resource, method, correlation id, metadata), an
//! optional `body`, and on failures a `status` plus structured `error`.
//!
//! # Message kinds
//!
//! - REQUEST: `msgtype=REQUEST`, carries the auth token.
//! - RESPONSE: `msgtype=RESPONSE`, same `reqID` as the request it answers.
//! - NOTIFY: `method=NOTIFY`, no `msgtype`, never correlated.
//!
//! # Example
//!
//! ```rust
//! use frontdoor_protocol::{EnvelopeOptions, Method, decode_message, encode_request};
//! use serde_json::json;
//!
//! let options = EnvelopeOptions::default().with_token("secret");
//! let text = encode_request(Method::Put, "/audio/volume", Some(json!({"value": 40}).into()), 7, &options).unwrap();
//! let envelope = decode_message(&text).unwrap();
//! assert_eq!(envelope.request_id(), Some(7));
//! ```

mod codec;
mod error;
mod types;

pub use codec::{
    EnvelopeOptions, RequestBody, build_request, decode_message, encode_message, encode_request,
};
pub use error::{ProtocolError, ProtocolResult};
pub use types::{Envelope, ErrorBody, ErrorCode, Header, MessageType, Method};

/// Maximum encoded envelope size (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
