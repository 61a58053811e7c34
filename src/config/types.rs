//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use matchd_proto::Version;

use super::accounts::AccountsConfig;
use super::limits::LimitsConfig;
use super::listen::ListenConfig;
use super::matchmaking::MatchmakingConfig;
use super::validation::{self, ValidationError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server information.
    #[serde(default)]
    pub server: ServerConfig,
    /// Network listen configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Supported protocol version range.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Ping, idle and handshake deadlines.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Buffer and queue capacities.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Matchmaking application configurations.
    #[serde(default)]
    pub matchmaking: MatchmakingConfig,
    /// Seeded sessions for the in-memory account directory.
    #[serde(default)]
    pub accounts: AccountsConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self).map_err(ConfigError::Invalid)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, used in logs.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: None,
        }
    }
}

fn default_server_name() -> String {
    "matchd".to_string()
}

/// Protocol versions this server accepts.
///
/// A handshake must request a version in `[min_version, version]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Newest supported version (default: 1.1).
    #[serde(default = "default_version")]
    pub version: Version,
    /// Oldest supported version (default: 1.0).
    #[serde(default = "default_min_version")]
    pub min_version: Version,
}

impl ProtocolConfig {
    /// Whether a handshake requesting `version` is acceptable.
    pub fn supports(&self, version: Version) -> bool {
        self.min_version <= version && version <= self.version
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            min_version: default_min_version(),
        }
    }
}

fn default_version() -> Version {
    Version::CURRENT
}

fn default_min_version() -> Version {
    Version::V1_0
}

/// Connection keepalive, handshake and match abandonment deadlines, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds between server pings (default: 30).
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Seconds without any inbound frame before disconnect (default: 90).
    #[serde(default = "default_idle")]
    pub idle: u64,
    /// Seconds allowed to reach signaling after connect (default: 60).
    #[serde(default = "default_handshake")]
    pub handshake: u64,
    /// Seconds a match may sit with nobody subscribed before it is deleted
    /// (default: 300).
    #[serde(default = "default_abandoned_match")]
    pub abandoned_match: u64,
}

impl TimeoutsConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake)
    }

    pub fn abandoned_match(&self) -> Duration {
        Duration::from_secs(self.abandoned_match)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            idle: default_idle(),
            handshake: default_handshake(),
            abandoned_match: default_abandoned_match(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_idle() -> u64 {
    90
}

fn default_handshake() -> u64 {
    60
}

fn default_abandoned_match() -> u64 {
    300
}
