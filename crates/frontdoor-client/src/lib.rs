//! FrontDoor client: duplex connection, request correlation, notifications.
//!
//! This crate also provides the `frontdoor` command-line interface.
//!
//! ```ignore
//! use frontdoor_client::{Connection, ConnectionConfig};
//!
//! let connection = Connection::connect(ConnectionConfig::new("127.0.0.1", 8082)).await?;
//! println!("language: {}", connection.language().await?);
//! connection.close().await?;
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod notifications;
pub mod readiness;

pub use cli::Cli;
pub use config::{ClientConfig, ConnectionConfig};
pub use connection::{Connection, ConnectionState, SendOutcome};
pub use correlator::{ArrivalFilter, Correlator, Inbox, MAX_INBOX_ENTRIES, MAX_REQUEST_ID, RequestIdGenerator};
pub use error::{ClientError, ClientResult};
pub use notifications::{Delivery, EndpointCallback, NotificationChannel, NotificationMode};
pub use readiness::{ProbeOutcome, ProbeTarget, ReadinessProbe, tcp_probe};
