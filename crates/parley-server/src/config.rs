//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PARLEY_HOST, PARLEY_PORT)
//! - TOML configuration file
//! - Command line arguments (`--config`, `--addr`)

use anyhow::{Context, Result};
use parley_core::RouterConfig;
use parley_protocol::Encoding;
use parley_transport::WebSocketConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Default outbound encoding when the client does not ask for one.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connected clients.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum number of rooms.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,

    /// Maximum display name and room name length in bytes.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Envelopes that may queue for a single slow client.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("PARLEY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("PARLEY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4042)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_rooms() -> usize {
    10_000
}

fn default_max_name_length() -> usize {
    64
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            encoding: Encoding::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_rooms: default_max_rooms(),
            max_name_length: default_max_name_length(),
            max_message_size: default_max_message_size(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "parley.toml",
            "/etc/parley/parley.toml",
            "~/.config/parley/parley.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Override host and port from a `host:port` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid socket address.
    pub fn set_addr(&mut self, addr: &str) -> Result<()> {
        let parsed: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid listen address: {addr}"))?;
        self.host = parsed.ip().to_string();
        self.port = parsed.port();
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .with_context(|| format!("Invalid host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Routing limits for the core router.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            max_clients: self.limits.max_connections,
            max_rooms: self.limits.max_rooms,
            max_name_length: self.limits.max_name_length,
        }
    }

    /// WebSocket settings for a connection using `encoding`.
    #[must_use]
    pub fn websocket_config(&self, encoding: Option<Encoding>) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: self.limits.max_message_size,
            outbox_capacity: self.limits.outbox_capacity,
            encoding: encoding.unwrap_or(self.transport.encoding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.transport.encoding, Encoding::Json);
        assert_eq!(config.limits.max_name_length, 64);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.set_addr("0.0.0.0:4042").unwrap();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 4042);
        assert!(config.set_addr("not an address").is_err());
    }

    #[test]
    fn test_config_bind_addr_ipv6() {
        let mut config = Config::default();
        config.set_addr("[::1]:4042").unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(
            config.bind_addr().unwrap(),
            "[::1]:4042".parse::<SocketAddr>().unwrap()
        );

        // A bracketed host from a config file works too.
        config.host = "[::]".to_string();
        config.port = 9000;
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
        assert!(config.bind_addr().unwrap().is_ipv6());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [transport]
            encoding = "msgpack"

            [limits]
            max_connections = 50000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport.encoding, Encoding::Msgpack);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.router_config().max_clients, 50000);
    }

    #[test]
    fn test_websocket_config_encoding_override() {
        let config = Config::default();
        assert_eq!(config.websocket_config(None).encoding, Encoding::Json);
        assert_eq!(
            config.websocket_config(Some(Encoding::Msgpack)).encoding,
            Encoding::Msgpack
        );
    }
}
