//! Mock server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default port the mock listens on.
pub const DEFAULT_MOCK_PORT: u16 = 8084;

/// Mock server configuration.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Address to bind the WebSocket listener to.
    pub bind_addr: SocketAddr,

    /// Maximum concurrent client connections.
    pub max_connections: usize,

    /// Bound on the WebSocket upgrade handshake.
    pub handshake_timeout: Duration,

    /// Step used by resource-presence waits.
    pub poll_interval: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_MOCK_PORT)),
            max_connections: 100,
            handshake_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl MockConfig {
    /// Creates a configuration bound to the given address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Configuration bound to an ephemeral port on loopback.
    pub fn ephemeral() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Builder: set the resource-wait poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
