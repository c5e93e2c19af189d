//! Convenience calls on top of [`Connection::send`].

use std::time::Duration;

use frontdoor_core::{WaitOptions, wait_for};
use frontdoor_protocol::{Envelope, Method, ProtocolError, RequestBody};
use serde_json::{Value, json};
use tracing::debug;

use crate::connection::{Connection, SendOutcome};
use crate::error::{ClientError, ClientResult};

/// Response window used by [`Connection::request_with_timeout`].
pub const HELPER_RESPONSE_TIMEOUT: Duration = Duration::from_secs(20);

pub const LANGUAGE_RESOURCE: &str = "/system/language";
pub const INFO_RESOURCE: &str = "/system/info";
pub const VOLUME_RESOURCE: &str = "/audio/volume";

impl Connection {
    /// Sends to `resource`, picking the method from what is given.
    ///
    /// No body means GET. A body without an explicit method means POST.
    pub async fn send_api(
        &self,
        resource: &str,
        method: Option<Method>,
        body: Option<RequestBody>,
    ) -> ClientResult<SendOutcome> {
        debug!(%resource, "sending api");
        let method = match (&body, method) {
            (None, _) => Method::Get,
            (Some(_), None) => Method::Post,
            (Some(_), Some(method)) => method,
        };
        self.send(method, resource, body, true).await
    }

    /// Sends and waits, turning the not-connected sentinel into
    /// [`ClientError::NotConnected`].
    pub async fn request(&self, method: Method, resource: &str, body: Option<RequestBody>) -> ClientResult<Envelope> {
        if method == Method::Notify {
            return Err(ProtocolError::UnsupportedMethod(method.to_string()).into());
        }
        match self.send(method, resource, body, true).await? {
            SendOutcome::Response(envelope) => Ok(envelope),
            SendOutcome::Sent { request_id } => self.await_response(request_id).await,
            SendOutcome::NotConnected => Err(ClientError::NotConnected),
        }
    }

    /// Like [`request`](Self::request) with the narrower helper window.
    pub async fn request_with_timeout(
        &self,
        method: Method,
        resource: &str,
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> ClientResult<Envelope> {
        if method == Method::Notify {
            return Err(ProtocolError::UnsupportedMethod(method.to_string()).into());
        }
        match self.send(method, resource, body, false).await? {
            SendOutcome::Sent { request_id } => self.await_response_within(request_id, timeout).await,
            SendOutcome::Response(envelope) => Ok(envelope),
            SendOutcome::NotConnected => Err(ClientError::NotConnected),
        }
    }

    /// Device language code, e.g. `en`.
    pub async fn language(&self) -> ClientResult<String> {
        let response = self.request(Method::Get, LANGUAGE_RESOURCE, None).await?;
        response
            .body_field("/code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing_field(&response, "code"))
    }

    pub async fn system_info(&self) -> ClientResult<Envelope> {
        self.request(Method::Get, INFO_RESOURCE, None).await
    }

    /// Current volume level.
    pub async fn volume(&self) -> ClientResult<i64> {
        let response = self
            .request_with_timeout(Method::Get, VOLUME_RESOURCE, None, HELPER_RESPONSE_TIMEOUT)
            .await?;
        volume_value(&response).ok_or_else(|| missing_field(&response, "value"))
    }

    /// Sets the volume and returns the level the device reports back.
    pub async fn set_volume(&self, volume: i64) -> ClientResult<i64> {
        let body = RequestBody::from(json!({ "value": volume }));
        let response = self.request(Method::Put, VOLUME_RESOURCE, Some(body)).await?;
        volume_value(&response).ok_or_else(|| missing_field(&response, "value"))
    }

    /// Polls the volume until it equals `expected`.
    pub async fn wait_for_volume(&self, expected: i64, options: WaitOptions) -> bool {
        wait_for(
            move || async move { self.volume().await.is_ok_and(|volume| volume == expected) },
            options,
        )
        .await
    }
}

fn volume_value(response: &Envelope) -> Option<i64> {
    match response.body_field("/value")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn missing_field(response: &Envelope, field: &str) -> ClientError {
    let detail = match &response.error {
        Some(error) => format!("{} has no body.{} ({})", response.resource(), field, error),
        None => format!("{} has no body.{}", response.resource(), field),
    };
    ProtocolError::malformed(detail).into()
}
