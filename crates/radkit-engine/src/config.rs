use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A NAS allowed to talk to this server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEntry {
    /// Client IP address, or a network in CIDR notation
    pub address: String,
    /// Shared secret for this client
    pub secret: String,
    /// Optional client name/description
    #[serde(default)]
    pub name: Option<String>,
    /// Enable/disable this client
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ClientEntry {
    /// Parse the client address as an IP network. A bare address becomes
    /// a /32 (or /128) network, so single-IP entries match exactly.
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }
        Err(ConfigError::Invalid(format!(
            "Invalid client address: {}",
            self.address
        )))
    }
}

/// Source-address to shared-secret lookup, built from the client entries.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    entries: Vec<(IpNetwork, Vec<u8>)>,
}

impl ClientRegistry {
    pub fn from_entries(clients: &[ClientEntry]) -> Result<ClientRegistry, ConfigError> {
        let mut registry = ClientRegistry::default();
        for client in clients.iter().filter(|c| c.enabled) {
            registry.insert(client.parse_network()?, client.secret.as_bytes());
        }
        Ok(registry)
    }

    pub fn insert(&mut self, network: IpNetwork, secret: impl Into<Vec<u8>>) {
        self.entries.push((network, secret.into()));
    }

    /// Secret for a source address; `None` means the source is unknown
    /// and its datagrams are dropped.
    pub fn secret_for(&self, source: IpAddr) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(network, _)| network.contains(source))
            .map(|(_, secret)| secret.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An upstream RADIUS server the client engine can send to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Server IP address
    pub address: String,
    /// Authentication port
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
    /// Accounting port
    #[serde(default = "default_acct_port")]
    pub acct_port: u16,
    /// Shared secret for this server
    pub secret: String,
}

/// A user the bundled PAP handler will accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// Engine configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Authentication port (RFC 2865)
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,

    /// Accounting port (RFC 2866)
    #[serde(default = "default_acct_port")]
    pub acct_port: u16,

    /// Authorized clients; requests from other sources are dropped
    #[serde(default)]
    pub clients: Vec<ClientEntry>,

    /// Users for the bundled PAP handler
    #[serde(default)]
    pub users: Vec<User>,

    /// Upstream servers for the client engine
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,

    /// Client engine: datagrams per server before giving up
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Client engine: seconds to wait for each response
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Extra dictionary file to load on top of the shipped standard one
    #[serde(default)]
    pub dictionary_path: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_auth_port() -> u16 {
    1812
}

fn default_acct_port() -> u16 {
    1813
}

fn default_retry() -> u32 {
    3
}

fn default_delay_secs() -> f64 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            auth_port: default_auth_port(),
            acct_port: default_acct_port(),
            clients: vec![],
            users: vec![],
            upstreams: vec![],
            retry: default_retry(),
            delay_secs: default_delay_secs(),
            dictionary_path: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_ip()?;

        if self.auth_port == 0 || self.acct_port == 0 {
            return Err(ConfigError::Invalid("Ports cannot be 0".to_string()));
        }

        if self.retry == 0 {
            return Err(ConfigError::Invalid("retry must be positive".to_string()));
        }
        if !(self.delay_secs > 0.0 && self.delay_secs.is_finite()) {
            return Err(ConfigError::Invalid(
                "delay_secs must be a positive number".to_string(),
            ));
        }

        for client in &self.clients {
            if client.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Client {} has empty secret",
                    client.address
                )));
            }
            client.parse_network()?;
        }

        for upstream in &self.upstreams {
            let _: IpAddr = upstream.address.parse().map_err(|_| {
                ConfigError::Invalid(format!("Invalid upstream address: {}", upstream.address))
            })?;
            if upstream.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Upstream {} has empty secret",
                    upstream.address
                )));
            }
            if upstream.auth_port == 0 || upstream.acct_port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "Upstream {} has a zero port",
                    upstream.address
                )));
            }
        }

        for user in &self.users {
            if user.username.is_empty() {
                return Err(ConfigError::Invalid("User has empty username".to_string()));
            }
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            auth_port: 1812,
            acct_port: 1813,
            clients: vec![
                ClientEntry {
                    address: "192.168.1.0/24".to_string(),
                    secret: "client_secret_1".to_string(),
                    name: Some("Internal Network".to_string()),
                    enabled: true,
                },
                ClientEntry {
                    address: "10.0.0.1".to_string(),
                    secret: "client_secret_2".to_string(),
                    name: Some("VPN Gateway".to_string()),
                    enabled: true,
                },
            ],
            users: vec![
                User {
                    username: "admin".to_string(),
                    password: "admin123".to_string(),
                },
                User {
                    username: "user1".to_string(),
                    password: "password1".to_string(),
                },
            ],
            upstreams: vec![],
            retry: 3,
            delay_secs: 1.0,
            dictionary_path: None,
            log_level: Some("info".to_string()),
        }
    }
}
