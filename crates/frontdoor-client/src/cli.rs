//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use frontdoor_protocol::Method;

use crate::config::{ClientConfig, ConnectionConfig};

/// frontdoor - talk to a FrontDoor WebSocket endpoint, or impersonate one
#[derive(Debug, Parser)]
#[command(name = "frontdoor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FRONTDOOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Device host (overrides the config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Device port (overrides the config file)
    #[arg(long)]
    pub port: Option<u16>,

    /// Auth token attached to requests
    #[arg(long, env = "FRONTDOOR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Response timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one request and print the response
    Send {
        /// GET, POST, PUT, DELETE or NOTIFY
        method: Method,

        /// Resource path, e.g. /system/language
        resource: String,

        /// JSON body
        body: Option<String>,

        /// Do not wait for the response
        #[arg(long)]
        no_wait: bool,
    },

    /// Print notifications as they arrive
    Listen {
        /// Stop after this many notifications
        #[arg(long)]
        count: Option<usize>,

        /// Stop after this many seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Run the mock server in the foreground
    Mock {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8084")]
        bind: SocketAddr,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the current configuration
    Dump,
    /// Show the configuration file path
    Path,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    pub fn connection_config(&self, file: &ClientConfig) -> ConnectionConfig {
        let mut config = file.to_connection_config();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(token) = &self.token {
            config = config.with_token(token.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_response_timeout(Duration::from_secs(timeout));
        }
        config
    }
}
