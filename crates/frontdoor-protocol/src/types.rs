//! Envelope types exchanged with FrontDoor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Verb carried in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read a resource.
    Get,
    /// Create or trigger.
    Post,
    /// Update a resource.
    Put,
    /// Remove a resource.
    Delete,
    /// Unsolicited push message.
    Notify,
}

impl Method {
    /// Returns the wire spelling of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Notify => "NOTIFY",
        }
    }

    /// Returns true if an encoded envelope of this method may carry a body.
    pub fn carries_body(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "NOTIFY" => Ok(Self::Notify),
            _ => Err(ProtocolError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Envelope direction marker (`msgtype` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Sent by the party asking for something.
    Request,
    /// Answer to a request with the same `reqID`.
    Response,
    /// Any other value seen on the wire.
    #[serde(other)]
    Other,
}

/// Envelope header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Resource path, e.g. `/audio/volume`.
    pub resource: String,

    /// Verb.
    pub method: Method,

    /// Protocol version, opaque to correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<serde_json::Number>,

    /// Device identifier, opaque to correlation.
    #[serde(rename = "device", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Auth credential, never present on NOTIFY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// REQUEST or RESPONSE, absent on NOTIFY.
    #[serde(rename = "msgtype", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,

    /// Correlation identifier.
    #[serde(rename = "reqID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u32>,

    /// Numeric status, present on failure responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Header {
    /// Creates a bare header for the given method and resource.
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            method,
            version: None,
            device_id: None,
            token: None,
            message_type: None,
            request_id: None,
            status: None,
        }
    }
}

/// Error code that may arrive either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    /// Numeric code.
    Number(i64),
    /// Stringly-typed code.
    Text(String),
}

impl From<i64> for ErrorCode {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Structured error carried by failure responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Originating component identifier.
    #[serde(rename = "GUID", default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Component-specific subcode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcode: Option<ErrorCode>,
}

impl ErrorBody {
    /// Creates an error body with GUID "1".
    pub fn new(code: impl Into<ErrorCode>, subcode: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            guid: Some("1".to_string()),
            code: code.into(),
            message: message.into(),
            subcode: Some(subcode.into()),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subcode {
            Some(subcode) => write!(f, "[{}/{}] {}", self.code, subcode, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// The unit exchanged on the wire: header plus optional body and error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing and correlation metadata.
    pub header: Header,

    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    /// Creates an envelope with the given header and no body.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            body: None,
            error: None,
        }
    }

    /// Creates a NOTIFY envelope for the given resource.
    pub fn notification(resource: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            header: Header::new(Method::Notify, resource),
            body,
            error: None,
        }
    }

    /// Builder: attach a body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Builder: set the request identifier.
    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.header.request_id = Some(request_id);
        self
    }

    /// Builder: set the message type.
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.header.message_type = Some(message_type);
        self
    }

    /// Returns the resource path.
    pub fn resource(&self) -> &str {
        &self.header.resource
    }

    /// Returns the method.
    pub fn method(&self) -> Method {
        self.header.method
    }

    /// Returns the correlation identifier, if any.
    pub fn request_id(&self) -> Option<u32> {
        self.header.request_id
    }

    /// Returns the message type, if any.
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type
    }

    /// Returns true for NOTIFY envelopes.
    pub fn is_notification(&self) -> bool {
        self.header.method == Method::Notify
    }

    /// Returns true for envelopes marked as RESPONSE.
    pub fn is_response(&self) -> bool {
        self.header.message_type == Some(MessageType::Response)
    }

    /// Returns true if the envelope reports an application-level failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.header.status.is_some_and(|s| s >= 400)
    }

    /// Looks up a field in the body by JSON pointer (e.g. `/code`).
    pub fn body_field(&self, pointer: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|body| body.pointer(pointer))
    }

    /// Marks this envelope as a response to its own request.
    pub fn into_response(mut self) -> Self {
        self.header.message_type = Some(MessageType::Response);
        self
    }

    /// Turns this envelope into a NOTIFY, dropping the message type.
    pub fn into_notification(mut self) -> Self {
        self.header.method = Method::Notify;
        self.header.message_type = None;
        self.header.token = None;
        self
    }

    /// Marks this envelope as failed with the given status and error.
    pub fn into_failure(mut self, status: u16, error: ErrorBody) -> Self {
        self.header.status = Some(status);
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(" Delete ".parse::<Method>().unwrap(), Method::Delete);
        assert_eq!("NOTIFY".parse::<Method>().unwrap(), Method::Notify);
    }

    #[test]
    fn method_parse_rejects_unknown() {
        let result = "PATCH".parse::<Method>();
        assert!(matches!(result, Err(ProtocolError::UnsupportedMethod(m)) if m == "PATCH"));
    }

    #[test]
    fn header_uses_wire_names() {
        let header = Header {
            version: Some(1u32.into()),
            device_id: Some("GUID".to_string()),
            message_type: Some(MessageType::Request),
            request_id: Some(7),
            ..Header::new(Method::Get, "/system/language")
        };
        let value = serde_json::to_value(&header).unwrap();
        assert_eq!(
            value,
            json!({
                "resource": "/system/language",
                "method": "GET",
                "version": 1,
                "device": "GUID",
                "msgtype": "REQUEST",
                "reqID": 7
            })
        );
    }

    #[test]
    fn unknown_message_type_is_preserved_as_other() {
        let header: Header = serde_json::from_value(json!({
            "resource": "/foo",
            "method": "POST",
            "msgtype": "EVENT"
        }))
        .unwrap();
        assert_eq!(header.message_type, Some(MessageType::Other));
    }

    #[test]
    fn error_code_accepts_number_or_text() {
        let error: ErrorBody = serde_json::from_value(json!({
            "GUID": "1",
            "code": "1",
            "message": "boom",
            "subcode": 1005
        }))
        .unwrap();
        assert_eq!(error.code, ErrorCode::Text("1".to_string()));
        assert_eq!(error.subcode, Some(ErrorCode::Number(1005)));
        assert_eq!(error.to_string(), "[1/1005] boom");
    }

    #[test]
    fn envelope_failure_detection() {
        let ok = Envelope::new(Header::new(Method::Get, "/demo")).into_response();
        assert!(!ok.is_failure());
        assert!(ok.is_response());

        let failed = ok.into_failure(500, ErrorBody::new(1i64, 2002i64, "WEBSOCKET_API_NOT_REGISTERED"));
        assert!(failed.is_failure());
        assert_eq!(failed.header.status, Some(500));
    }

    #[test]
    fn into_notification_strips_request_fields() {
        let mut header = Header::new(Method::Put, "/audio/volume");
        header.token = Some("secret".to_string());
        header.message_type = Some(MessageType::Request);

        let notify = Envelope::new(header).into_notification();
        assert!(notify.is_notification());
        assert_eq!(notify.message_type(), None);
        assert_eq!(notify.header.token, None);
    }

    #[test]
    fn body_field_uses_json_pointer() {
        let envelope = Envelope::new(Header::new(Method::Get, "/system/language"))
            .with_body(json!({"code": "en", "properties": {"count": 2}}));
        assert_eq!(envelope.body_field("/code"), Some(&json!("en")));
        assert_eq!(envelope.body_field("/properties/count"), Some(&json!(2)));
        assert_eq!(envelope.body_field("/missing"), None);
    }
}
