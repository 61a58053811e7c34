//! In-memory session and profile directory.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use super::{Profile, ProfileDirectory, Session, SessionValidator, StoreError};
use crate::config::AccountsConfig;

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: String,
    expires_at: i64,
}

/// Sessions keyed by session key, profiles keyed by profile id.
#[derive(Debug)]
pub struct MemoryAccounts {
    sessions: DashMap<String, SessionEntry>,
    profiles: DashMap<String, Profile>,
    session_ttl: i64,
    allow_guests: bool,
}

impl MemoryAccounts {
    /// Create an empty directory.
    pub fn new(session_ttl_secs: u64, allow_guests: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            profiles: DashMap::new(),
            session_ttl: i64::try_from(session_ttl_secs).unwrap_or(i64::MAX),
            allow_guests,
        }
    }

    /// Create a directory seeded from configuration.
    pub fn from_config(config: &AccountsConfig) -> Self {
        let accounts = Self::new(config.session_ttl, config.allow_guests);
        for seed in &config.sessions {
            accounts.insert_session(&seed.key, &seed.user);
            for profile in &seed.profiles {
                accounts.insert_profile(profile, &seed.user);
            }
        }
        accounts
    }

    /// Register (or refresh) a session key for `user_id`.
    pub fn insert_session(&self, key: &str, user_id: &str) {
        self.sessions.insert(
            key.to_string(),
            SessionEntry {
                user_id: user_id.to_string(),
                expires_at: Utc::now().timestamp().saturating_add(self.session_ttl),
            },
        );
    }

    /// Register a profile owned by `user_id`.
    pub fn insert_profile(&self, profile_id: &str, user_id: &str) {
        self.profiles.insert(
            profile_id.to_string(),
            Profile {
                id: profile_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    /// Force a session to expire.
    pub fn expire_session(&self, key: &str) {
        if let Some(mut entry) = self.sessions.get_mut(key) {
            entry.expires_at = 0;
        }
    }

    fn guest_user(key: &str) -> String {
        format!("guest:{key}")
    }
}

#[async_trait]
impl SessionValidator for MemoryAccounts {
    async fn check_and_refresh_session(&self, session_key: &str) -> Result<Session, StoreError> {
        let now = Utc::now().timestamp();

        if self.allow_guests && !self.sessions.contains_key(session_key) {
            debug!(key = %session_key, "Provisioning guest session");
            self.insert_session(session_key, &Self::guest_user(session_key));
        }

        let mut entry = self
            .sessions
            .get_mut(session_key)
            .ok_or(StoreError::InvalidSession)?;
        if entry.expires_at <= now {
            drop(entry);
            self.sessions.remove(session_key);
            return Err(StoreError::SessionExpired);
        }
        entry.expires_at = now.saturating_add(self.session_ttl);

        Ok(Session {
            key: session_key.to_string(),
            user_id: entry.user_id.clone(),
            expires_at: entry.expires_at,
        })
    }
}

#[async_trait]
impl ProfileDirectory for MemoryAccounts {
    async fn get_active_profile(
        &self,
        session: &Session,
        profile_id: &str,
    ) -> Result<Profile, StoreError> {
        if let Some(profile) = self.profiles.get(profile_id) {
            if profile.user_id != session.user_id {
                return Err(StoreError::ProfileNotOwned(profile_id.to_string()));
            }
            return Ok(profile.clone());
        }

        // Guests own whatever profile they first claim.
        if self.allow_guests && session.user_id.starts_with("guest:") {
            self.insert_profile(profile_id, &session.user_id);
            return Ok(Profile {
                id: profile_id.to_string(),
                user_id: session.user_id.clone(),
            });
        }

        Err(StoreError::ProfileNotFound(profile_id.to_string()))
    }
}
