//! Foreground mock server.

use std::net::SocketAddr;

use frontdoor_mock::{MockConfig, MockServer, SignalHandler, install_broadcast_callbacks};
use tracing::info;

use crate::error::ClientResult;

/// Serves the mock until SIGINT or SIGTERM.
pub async fn run(bind: SocketAddr) -> ClientResult<()> {
    let server = MockServer::bind(MockConfig::new(bind)).await?;
    install_broadcast_callbacks(&server.hub());
    println!("mock FrontDoor listening on ws://{}/", server.local_addr());

    let signals = SignalHandler::new();
    signals.spawn_listener();
    server.run_until_shutdown(signals.shutdown().wait()).await?;

    info!(resources = ?server.hub().list_resources(), "mock stopped");
    Ok(())
}
