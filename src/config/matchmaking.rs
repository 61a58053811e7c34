//! Matchmaking configuration.

use serde::Deserialize;

/// Matchmaking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchmakingConfig {
    /// Algorithm used by configurations that do not name one (default: "fifo").
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,
    /// Application configurations clients may name in FIND.
    #[serde(default)]
    pub configurations: Vec<ApplicationConfiguration>,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            default_algorithm: default_algorithm(),
            configurations: Vec::new(),
        }
    }
}

fn default_algorithm() -> String {
    "fifo".to_string()
}

/// One matchmaking application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationConfiguration {
    /// Name clients pass as `configuration` in FIND.
    pub name: String,
    /// Algorithm override; falls back to `default_algorithm`.
    #[serde(default)]
    pub algorithm: Option<String>,
    /// Players per match (at least 2).
    #[serde(default = "default_max_players")]
    pub max_players: usize,
}

fn default_max_players() -> usize {
    2
}
