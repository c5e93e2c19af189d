//! WebSocket listener for the mock server.
//!
//! Each accepted connection gets a reader loop that feeds the [`MockHub`]
//! and a writer task draining the client's outbound queue, so routing
//! decisions never block on a slow peer.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::{debug, error, info, warn};

use crate::config::MockConfig;
use crate::error::{MockError, MockResult};
use crate::router::MockHub;

/// Mock FrontDoor server bound to a TCP port.
pub struct MockServer {
    config: MockConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    hub: MockHub,
    connection_semaphore: Arc<Semaphore>,
}

impl MockServer {
    /// Binds the listener described by `config`.
    pub async fn bind(config: MockConfig) -> MockResult<Self> {
        if config.max_connections == 0 {
            return Err(MockError::config("max_connections must be at least 1"));
        }

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Mock FrontDoor listening");

        let hub = MockHub::new(config.poll_interval);
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            local_addr,
            hub,
            connection_semaphore,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Routing state shared with every connection.
    pub fn hub(&self) -> MockHub {
        self.hub.clone()
    }

    /// Accepts one TCP connection, waiting for a free connection slot first.
    pub async fn accept(&self) -> MockResult<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MockError::config("connection limiter closed"))?;
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "Accepted TCP connection");
        Ok((stream, peer, permit))
    }

    /// Serves clients until an unrecoverable error occurs.
    pub async fn run(&self) -> MockResult<()> {
        loop {
            match self.accept().await {
                Ok((stream, peer, permit)) => {
                    let hub = self.hub.clone();
                    let handshake_timeout = self.config.handshake_timeout;
                    tokio::spawn(async move {
                        serve_connection(hub, stream, peer, handshake_timeout).await;
                        drop(permit);
                    });
                }
                Err(MockError::Io(e)) => {
                    error!(error = %e, "Failed to accept connection");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Serves clients until `shutdown` resolves.
    pub async fn run_until_shutdown<S>(&self, shutdown: S) -> MockResult<()>
    where
        S: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// Echoes the first requested subprotocol so clients asking for one can
/// complete the handshake.
fn echo_subprotocol(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let requested = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').map(str::trim).find(|p| !p.is_empty()))
        .and_then(|protocol| HeaderValue::from_str(protocol).ok());

    if let Some(protocol) = requested {
        debug!(protocol = ?protocol, "Accepting subprotocol");
        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(response)
}

async fn serve_connection(hub: MockHub, stream: TcpStream, peer: SocketAddr, handshake_timeout: Duration) {
    let websocket = match tokio::time::timeout(handshake_timeout, accept_hdr_async(stream, echo_subprotocol)).await {
        Ok(Ok(websocket)) => websocket,
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            warn!(%peer, timeout = ?handshake_timeout, "WebSocket handshake timed out");
            return;
        }
    };

    let (mut sink, mut frames) = websocket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();
    let client = hub.attach(outbound);

    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!(%client, error = %e, "Write failed, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => hub.handle_message(client, &text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => hub.handle_message(client, &text),
                Err(_) => warn!(%client, "Dropping non-UTF-8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%client, error = %e, "Read failed");
                break;
            }
        }
    }

    // Dropping the outbound sender from the table ends the writer.
    hub.detach(client);
    let _ = writer.await;
    debug!(%client, %peer, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let server = MockServer::bind(MockConfig::ephemeral()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.hub().list_resources().is_empty());
    }

    #[tokio::test]
    async fn zero_connection_limit_is_rejected() {
        let result = MockServer::bind(MockConfig::ephemeral().with_max_connections(0)).await;
        assert!(matches!(result, Err(MockError::Config { .. })));
    }

    #[tokio::test]
    async fn websocket_client_is_attached_and_answered() {
        let server = MockServer::bind(MockConfig::ephemeral()).await.unwrap();
        let addr = server.local_addr();
        let hub = server.hub();
        tokio::spawn(async move { server.run().await });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/")).await.unwrap();
        assert!(hub.wait_for_client(Duration::from_secs(2)).await);

        let request = r#"{"header":{"resource":"/network/ping","method":"GET","msgtype":"REQUEST","reqID":2}}"#;
        ws.send(Message::Text(request.to_string())).await.unwrap();

        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break frontdoor_protocol::decode_message(&text).unwrap(),
                _ => continue,
            }
        };
        assert_eq!(reply.request_id(), Some(2));
        assert_eq!(reply.body_field("/pong"), Some(&serde_json::json!("true")));
    }

    #[tokio::test]
    async fn subprotocol_is_echoed() {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;

        let server = MockServer::bind(MockConfig::ephemeral()).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });

        let mut request = format!("ws://{addr}/").into_client_request().unwrap();
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("eco2"));
        let (_ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(
            response.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "eco2"
        );
    }

    #[tokio::test]
    async fn run_until_shutdown_stops() {
        let server = MockServer::bind(MockConfig::ephemeral()).await.unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            server.run_until_shutdown(async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
