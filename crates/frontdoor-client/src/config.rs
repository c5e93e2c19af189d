//! Client configuration.
//!
//! [`ConnectionConfig`] is what a [`Connection`](crate::connection::Connection)
//! runs with. [`ClientConfig`] is its on-disk form, a `config.toml` at
//! `~/.config/frontdoor/config.toml` by default; CLI flags override it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use frontdoor_protocol::EnvelopeOptions;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::notifications::NotificationMode;

/// Default FrontDoor port.
pub const DEFAULT_PORT: u16 = 8082;

/// Product name placed in the URL query for remote devices.
pub const DEFAULT_PRODUCT: &str = "EddieTest";

/// Subprotocol requested from remote devices.
pub const DEFAULT_SUBPROTOCOL: &str = "eco2";

/// Runtime settings for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
    pub device_id: String,
    pub version: u32,
    pub product: String,
    pub subprotocol: String,
    /// Bound on acquiring the TCP socket.
    pub connect_timeout: Duration,
    /// Bound on the WebSocket upgrade.
    pub handshake_timeout: Duration,
    /// Bound on observing the open state once the upgrade finished.
    pub open_timeout: Duration,
    pub close_timeout: Duration,
    pub response_timeout: Duration,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    pub notification_mode: NotificationMode,
    /// Reopen a closed connection before sending.
    pub auto_reopen: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            token: None,
            device_id: "GUID".to_string(),
            version: 1,
            product: DEFAULT_PRODUCT.to_string(),
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(150),
            open_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(150),
            readiness_timeout: Duration::from_secs(300),
            readiness_interval: Duration::from_secs(5),
            notification_mode: NotificationMode::Latest,
            auto_reopen: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_readiness(mut self, bound: Duration, interval: Duration) -> Self {
        self.readiness_timeout = bound;
        self.readiness_interval = interval;
        self
    }

    pub fn with_notification_mode(mut self, mode: NotificationMode) -> Self {
        self.notification_mode = mode;
        self
    }

    pub fn with_auto_reopen(mut self, auto_reopen: bool) -> Self {
        self.auto_reopen = auto_reopen;
        self
    }

    /// Returns true for loopback targets, which skip the readiness probe,
    /// the product query and the subprotocol.
    pub fn is_local(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
    }

    /// WebSocket URL for this target.
    pub fn url(&self) -> ClientResult<Url> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let mut url = Url::parse(&format!("ws://{}:{}/", host, self.port))?;
        if !self.is_local() {
            let client_name = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f");
            url.set_query(Some(&format!("product={}{}", self.product, client_name)));
        }
        Ok(url)
    }

    /// Envelope fields stamped on every outgoing request.
    pub fn envelope_options(&self) -> EnvelopeOptions {
        let options = EnvelopeOptions::default()
            .with_version(self.version)
            .with_device_id(self.device_id.clone());
        match &self.token {
            Some(token) => options.with_token(token.clone()),
            None => options,
        }
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target device settings.
    pub connection: ConnectionSettings,

    /// Timeouts, in seconds.
    pub timeouts: TimeoutSettings,

    /// Notification retention.
    pub notifications: NotificationSettings,
}

/// Target device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
    pub device_id: String,
    pub product: String,
    pub auto_reopen: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            token: None,
            device_id: defaults.device_id,
            product: defaults.product,
            auto_reopen: defaults.auto_reopen,
        }
    }
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect: u64,
    pub handshake: u64,
    pub open_event: u64,
    pub close: u64,
    pub response: u64,
    pub readiness: u64,
    pub readiness_interval: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            connect: defaults.connect_timeout.as_secs(),
            handshake: defaults.handshake_timeout.as_secs(),
            open_event: defaults.open_timeout.as_secs(),
            close: defaults.close_timeout.as_secs(),
            response: defaults.response_timeout.as_secs(),
            readiness: defaults.readiness_timeout.as_secs(),
            readiness_interval: defaults.readiness_interval.as_secs(),
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// `latest` keeps only the last notification, `queue` keeps them all.
    pub mode: NotificationMode,
}

impl ClientConfig {
    /// Loads configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::config(format!("failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("frontdoor")
            .join("config.toml")
    }

    /// Builds the runtime connection settings.
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let connection = &self.connection;
        let timeouts = &self.timeouts;
        ConnectionConfig {
            host: connection.host.clone(),
            port: connection.port,
            token: connection.token.clone(),
            device_id: connection.device_id.clone(),
            product: connection.product.clone(),
            auto_reopen: connection.auto_reopen,
            connect_timeout: Duration::from_secs(timeouts.connect),
            handshake_timeout: Duration::from_secs(timeouts.handshake),
            open_timeout: Duration::from_secs(timeouts.open_event),
            close_timeout: Duration::from_secs(timeouts.close),
            response_timeout: Duration::from_secs(timeouts.response),
            readiness_timeout: Duration::from_secs(timeouts.readiness),
            readiness_interval: Duration::from_secs(timeouts.readiness_interval),
            notification_mode: self.notifications.mode,
            ..ConnectionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loopback_hosts_are_local() {
        assert!(ConnectionConfig::new("127.0.0.1", 8082).is_local());
        assert!(ConnectionConfig::new("localhost", 8082).is_local());
        assert!(ConnectionConfig::new("::1", 8082).is_local());
        assert!(!ConnectionConfig::new("192.168.1.20", 8082).is_local());
        assert!(!ConnectionConfig::new("speaker.lan", 8082).is_local());
    }

    #[test]
    fn local_url_has_no_query() {
        let url = ConnectionConfig::new("127.0.0.1", 9000).url().unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/");
    }

    #[test]
    fn remote_url_carries_product() {
        let url = ConnectionConfig::new("192.168.1.20", 8082).url().unwrap();
        assert_eq!(url.host_str(), Some("192.168.1.20"));
        assert!(url.query().unwrap().starts_with("product=EddieTest"));
    }

    #[test]
    fn envelope_options_carry_token() {
        let options = ConnectionConfig::default()
            .with_token("jwt")
            .with_device_id("dev-1")
            .envelope_options();
        assert_eq!(options.token.as_deref(), Some("jwt"));
        assert_eq!(options.device_id, "dev-1");
        assert_eq!(options.version, 1);
    }

    #[test]
    fn defaults_match_runtime_defaults() {
        let config = ClientConfig::default().to_connection_config();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.response_timeout, Duration::from_secs(150));
        assert_eq!(config.readiness_timeout, Duration::from_secs(300));
        assert_eq!(config.notification_mode, NotificationMode::Latest);
        assert!(config.auto_reopen);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[connection]
host = "10.0.0.5"
token = "abc"

[timeouts]
response = 20

[notifications]
mode = "queue"
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.connection.host, "10.0.0.5");
        assert_eq!(config.connection.port, DEFAULT_PORT);

        let runtime = config.to_connection_config();
        assert_eq!(runtime.token.as_deref(), Some("abc"));
        assert_eq!(runtime.response_timeout, Duration::from_secs(20));
        assert_eq!(runtime.close_timeout, Duration::from_secs(10));
        assert_eq!(runtime.notification_mode, NotificationMode::Queue);
    }

    #[test]
    fn invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection\nhost = ").unwrap();
        assert!(matches!(
            ClientConfig::load_from(file.path()),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("frontdoor/config.toml"));
    }
}
