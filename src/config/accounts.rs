//! Seed data for the in-memory account directory.

use serde::Deserialize;

/// Account directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    /// Seconds a session stays valid after its last refresh (default: 3600).
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64,
    /// Accept unknown session keys and provision a guest user for them.
    /// Meant for local development only.
    #[serde(default)]
    pub allow_guests: bool,
    /// Sessions available at startup.
    #[serde(default)]
    pub sessions: Vec<SeedSession>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
            allow_guests: false,
            sessions: Vec::new(),
        }
    }
}

fn default_session_ttl() -> u64 {
    3600
}

/// A session key bound to a user and the profiles that user owns.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSession {
    pub key: String,
    pub user: String,
    #[serde(default)]
    pub profiles: Vec<String>,
}
