//! One-shot request.

use frontdoor_protocol::{Envelope, Method, ProtocolError, RequestBody};

use crate::config::ConnectionConfig;
use crate::connection::{Connection, SendOutcome};
use crate::error::{ClientError, ClientResult};

/// Sends one request and prints the response as pretty JSON.
pub async fn run(
    config: ConnectionConfig,
    method: Method,
    resource: &str,
    body: Option<String>,
    no_wait: bool,
) -> ClientResult<()> {
    let connection = Connection::connect(config).await?;
    let outcome = connection
        .send(method, resource, body.map(RequestBody::from), !no_wait)
        .await;

    let printed = match outcome {
        Ok(SendOutcome::Response(envelope)) => print_envelope(&envelope),
        Ok(SendOutcome::Sent { request_id }) => {
            println!("sent {} {} (reqID {})", method, resource, request_id);
            Ok(())
        }
        Ok(SendOutcome::NotConnected) => Err(ClientError::NotConnected),
        Err(e) => Err(e),
    };

    connection.close().await?;
    printed
}

pub(crate) fn print_envelope(envelope: &Envelope) -> ClientResult<()> {
    let text = serde_json::to_string_pretty(envelope).map_err(ProtocolError::from)?;
    println!("{}", text);
    Ok(())
}
