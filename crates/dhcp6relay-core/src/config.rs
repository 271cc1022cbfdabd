use crate::types::{PeerIdentity, Trust};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Well-known UDP port of the `dhcpv6-server` service.
pub const DHCPV6_SERVER_PORT: u16 = 547;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Point-to-point interface whose clients are relayed.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Upstream DHCPv6 server or relay. Without it the relay stays passive.
    #[serde(default)]
    pub server: Option<String>,
    /// Port used for `server` when it does not name one.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Port the link-local and multicast sockets listen on.
    #[serde(default = "default_server_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub trust: Trust,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub subscriber_id: Option<String>,
    #[serde(default = "default_link_poll_interval")]
    pub link_poll_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            server: None,
            server_port: default_server_port(),
            listen_port: default_server_port(),
            trust: Trust::default(),
            remote_id: None,
            subscriber_id: None,
            link_poll_interval_secs: default_link_poll_interval(),
        }
    }
}

impl RelayConfig {
    pub fn peer_identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.remote_id.clone(), self.subscriber_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_interface() -> String {
    "ppp0".to_string()
}
fn default_server_port() -> u16 {
    DHCPV6_SERVER_PORT
}
fn default_link_poll_interval() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.relay.interface.trim().is_empty() {
            return Err(crate::error::Error::Config(
                "relay.interface must not be empty".to_string(),
            ));
        }
        if self.relay.link_poll_interval_secs == 0 {
            return Err(crate::error::Error::Config(
                "relay.link_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
