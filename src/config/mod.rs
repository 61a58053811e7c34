//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, ProtocolConfig, TimeoutsConfig)
//! - [`listen`]: Network listener configuration
//! - [`limits`]: Buffer and queue capacities
//! - [`matchmaking`]: Matchmaking application configurations
//! - [`accounts`]: Seed sessions for the in-memory account directory

mod accounts;
mod limits;
mod listen;
mod matchmaking;
mod types;
mod validation;

pub use accounts::{AccountsConfig, SeedSession};
pub use limits::LimitsConfig;
pub use listen::ListenConfig;
pub use matchmaking::{ApplicationConfiguration, MatchmakingConfig};
pub use types::{Config, ConfigError, ProtocolConfig, ServerConfig, TimeoutsConfig};
pub use validation::{ValidationError, validate};
