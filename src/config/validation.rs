//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("protocol.min_version {min} is newer than protocol.version {max}")]
    InvertedVersionRange { min: String, max: String },
    #[error("protocol.version {0} is newer than this build supports")]
    UnsupportedVersion(String),
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("timeouts.idle ({idle}s) must exceed timeouts.ping_interval ({ping}s)")]
    IdleNotAbovePing { idle: u64, ping: u64 },
    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("matchmaking configuration name must not be empty")]
    EmptyConfigurationName,
    #[error("matchmaking configuration '{0}' is defined twice")]
    DuplicateConfiguration(String),
    #[error("matchmaking configuration '{name}' has max_players {max_players}, need at least 2")]
    TooFewPlayers { name: String, max_players: usize },
    #[error("accounts session key must not be empty")]
    EmptySessionKey,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    let protocol = &config.protocol;
    if protocol.min_version > protocol.version {
        errors.push(ValidationError::InvertedVersionRange {
            min: protocol.min_version.to_string(),
            max: protocol.version.to_string(),
        });
    }
    if protocol.version > matchd_proto::Version::CURRENT {
        errors.push(ValidationError::UnsupportedVersion(protocol.version.to_string()));
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("ping_interval", timeouts.ping_interval),
        ("idle", timeouts.idle),
        ("handshake", timeouts.handshake),
        ("abandoned_match", timeouts.abandoned_match),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }
    if timeouts.idle <= timeouts.ping_interval {
        errors.push(ValidationError::IdleNotAbovePing {
            idle: timeouts.idle,
            ping: timeouts.ping_interval,
        });
    }

    let limits = &config.limits;
    for (name, value) in [
        ("handshake_inbound", limits.handshake_inbound),
        ("handshake_outbound", limits.handshake_outbound),
        ("mailbox_backlog", limits.mailbox_backlog),
        ("signal_queue", limits.signal_queue),
        ("outbound_queue", limits.outbound_queue),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit(name));
        }
    }

    let mut seen = HashSet::new();
    for app in &config.matchmaking.configurations {
        if app.name.is_empty() {
            errors.push(ValidationError::EmptyConfigurationName);
        } else if !seen.insert(app.name.as_str()) {
            errors.push(ValidationError::DuplicateConfiguration(app.name.clone()));
        }
        if app.max_players < 2 {
            errors.push(ValidationError::TooFewPlayers {
                name: app.name.clone(),
                max_players: app.max_players,
            });
        }
    }

    if config.accounts.sessions.iter().any(|s| s.key.is_empty()) {
        errors.push(ValidationError::EmptySessionKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
