//! Collaborator interfaces for sessions, profiles and match persistence.
//!
//! The connection core only talks to these traits. In-memory implementations
//! back a standalone server:
//! - [`MemoryAccounts`]: session validation and profile lookup
//! - [`MemoryMatchStore`]: match records and membership

mod accounts;
mod matches;

pub use accounts::MemoryAccounts;
pub use matches::MemoryMatchStore;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Profile identifier (unique per player identity).
pub type ProfileId = String;

/// Match identifier.
pub type MatchId = String;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session key is not valid")]
    InvalidSession,
    #[error("session has expired")]
    SessionExpired,
    #[error("profile not found: {0}")]
    ProfileNotFound(String),
    #[error("profile {0} does not belong to this session")]
    ProfileNotOwned(String),
    #[error("match not found: {0}")]
    MatchNotFound(String),
    /// Concurrent modification; the caller may retry.
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

/// A validated login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub key: String,
    pub user_id: String,
    /// Unix timestamp after which the session is invalid.
    pub expires_at: i64,
}

/// A player identity owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: ProfileId,
    pub user_id: String,
}

/// Result of a successful authentication. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    pub profile: Profile,
    pub session: Session,
}

impl AuthRecord {
    #[inline]
    pub fn profile_id(&self) -> &str {
        &self.profile.id
    }
}

/// Persisted lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    /// Accepting joins.
    Open,
    /// In progress, closed to new joins.
    Closed,
    /// Finished.
    Ended,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStatus::Open => "open",
            MatchStatus::Closed => "closed",
            MatchStatus::Ended => "ended",
        })
    }
}

/// A persisted multi-player match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiMatch {
    pub id: MatchId,
    /// Name of the application configuration that created it.
    pub configuration: String,
    pub status: MatchStatus,
    pub max_players: usize,
    pub created_at: i64,
}

/// Session validation.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate `session_key` and extend its lifetime.
    async fn check_and_refresh_session(&self, session_key: &str) -> Result<Session, StoreError>;
}

/// Profile lookup.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Fetch `profile_id`, failing unless it belongs to the session's user.
    async fn get_active_profile(
        &self,
        session: &Session,
        profile_id: &str,
    ) -> Result<Profile, StoreError>;
}

/// Match persistence. Each call is atomic.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn create_match(
        &self,
        configuration: &str,
        max_players: usize,
    ) -> Result<MultiMatch, StoreError>;

    async fn get_match(&self, match_id: &str) -> Result<MultiMatch, StoreError>;

    /// Every stored match, in no particular order.
    async fn list_matches(&self) -> Result<Vec<MultiMatch>, StoreError>;

    /// Current members, in ascending profile id order.
    async fn get_profiles(&self, match_id: &str) -> Result<Vec<ProfileId>, StoreError>;

    /// Add a member. Adding an existing member is a no-op.
    async fn add_profile(&self, match_id: &str, profile_id: &str) -> Result<(), StoreError>;

    /// Remove a member, returning how many remain.
    async fn remove_profile(&self, match_id: &str, profile_id: &str) -> Result<usize, StoreError>;

    async fn update_status(&self, match_id: &str, status: MatchStatus) -> Result<(), StoreError>;

    async fn delete_match(&self, match_id: &str) -> Result<(), StoreError>;
}

/// Hook for upstream match changes.
pub trait MatchObserver: Send + Sync {
    /// Called after a match record has been deleted.
    fn on_match_deleted(&self, match_id: &str);
}
