//! Mock FrontDoor server.
//!
//! Accepts WebSocket clients and routes their envelopes: clients may claim
//! resources through `/register`, requests to a claimed resource are
//! forwarded to its owner, notifications fan out to everyone, and anything
//! else is answered from a table of canned device responses.
//!
//! ```ignore
//! use frontdoor_mock::{MockConfig, MockServer};
//!
//! let server = MockServer::bind(MockConfig::ephemeral()).await?;
//! let hub = server.hub();
//! tokio::spawn(async move { server.run().await });
//! hub.wait_for_client_resource("/test/client", Duration::from_secs(5)).await;
//! ```

pub mod canned;
pub mod clients;
pub mod config;
pub mod error;
pub mod notify;
pub mod registry;
pub mod router;
pub mod signals;
pub mod socket;

pub use canned::{CannedHandler, CannedReply, CannedResponses, MockDevice};
pub use config::{DEFAULT_MOCK_PORT, MockConfig};
pub use error::{MockError, MockResult};
pub use notify::install_broadcast_callbacks;
pub use registry::{ClientId, ResourceRegistry};
pub use router::{CONTROLLER_RESOURCE, MockHub, REGISTER_RESOURCE, ResourceCallback, Route, request_envelope};
pub use signals::{ShutdownSignal, SignalHandler};
pub use socket::MockServer;
