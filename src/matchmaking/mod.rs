//! Matchmaking: application configurations, pluggable algorithms and the
//! per-attempt [`MatchHandle`].
//!
//! Algorithms never block the caller. `find` and `join` hand back a handle at
//! once; the outcome arrives later through a [`MatchListener`].

mod fifo;
mod handle;

pub use fifo::FifoAlgorithm;
pub use handle::{HandleHooks, HandlePhase, MatchHandle};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

pub use crate::config::ApplicationConfiguration;
use crate::config::MatchmakingConfig;
use crate::store::{MatchId, MatchStore, MultiMatch, ProfileId, StoreError};

/// Matchmaking errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchmakingError {
    #[error("unknown matchmaking configuration: {0}")]
    UnknownConfiguration(String),

    #[error("unknown matchmaking algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("cannot {op} a match handle that is {phase}")]
    InvalidState {
        op: &'static str,
        phase: HandlePhase,
    },

    #[error("profile {profile_id} is not a member of match {match_id}")]
    NotAMember {
        match_id: MatchId,
        profile_id: ProfileId,
    },

    #[error("match {0} has ended")]
    MatchEnded(MatchId),

    /// The attempt was cancelled before a result arrived.
    #[error("matchmaking cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One profile asking to be matched under a configuration.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub profile_id: ProfileId,
    pub configuration: Arc<ApplicationConfiguration>,
}

/// A match a connection has been placed in.
#[derive(Debug, Clone)]
pub struct MultiMatchRecord {
    pub record: MultiMatch,
    pub configuration: Arc<ApplicationConfiguration>,
    pub handle: Arc<MatchHandle>,
}

impl MultiMatchRecord {
    #[inline]
    pub fn match_id(&self) -> &str {
        &self.record.id
    }
}

/// Receives the outcome of a matchmaking attempt.
pub trait MatchListener: Send + Sync {
    fn on_matched(&self, record: MultiMatchRecord);
    fn on_failed(&self, error: MatchmakingError);
}

/// A matchmaking strategy. Both operations must return immediately.
pub trait MatchmakingAlgorithm: Send + Sync {
    /// Name used in configuration.
    fn name(&self) -> &str;

    /// Begin looking for a match. The returned handle is READY; the caller
    /// starts it.
    fn find(&self, request: MatchRequest, listener: Arc<dyn MatchListener>) -> Arc<MatchHandle>;

    /// Attach to an existing match the profile already belongs to. The
    /// returned handle is already MATCHING and settles on `existing`.
    fn join(
        &self,
        request: MatchRequest,
        existing: MultiMatch,
        listener: Arc<dyn MatchListener>,
    ) -> Arc<MatchHandle>;
}

/// Configurations and algorithms known to this server.
pub struct MatchmakingRegistry {
    configurations: HashMap<String, Arc<ApplicationConfiguration>>,
    algorithms: HashMap<String, Arc<dyn MatchmakingAlgorithm>>,
    default_algorithm: String,
}

impl MatchmakingRegistry {
    /// Registry with the configured application configurations and no
    /// algorithms.
    pub fn new(config: &MatchmakingConfig) -> Self {
        let configurations = config
            .configurations
            .iter()
            .map(|c| (c.name.clone(), Arc::new(c.clone())))
            .collect();
        Self {
            configurations,
            algorithms: HashMap::new(),
            default_algorithm: config.default_algorithm.clone(),
        }
    }

    /// Registry with the built-in algorithms registered.
    pub fn with_builtin(config: &MatchmakingConfig, store: Arc<dyn MatchStore>) -> Self {
        let mut registry = Self::new(config);
        registry.register(Arc::new(FifoAlgorithm::new(store)));
        registry
    }

    pub fn register(&mut self, algorithm: Arc<dyn MatchmakingAlgorithm>) {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
    }

    pub fn configuration(
        &self,
        name: &str,
    ) -> Result<Arc<ApplicationConfiguration>, MatchmakingError> {
        self.configurations
            .get(name)
            .cloned()
            .ok_or_else(|| MatchmakingError::UnknownConfiguration(name.to_string()))
    }

    /// The algorithm `configuration` names, or the default.
    pub fn algorithm_for(
        &self,
        configuration: &ApplicationConfiguration,
    ) -> Result<Arc<dyn MatchmakingAlgorithm>, MatchmakingError> {
        let name = configuration
            .algorithm
            .as_deref()
            .unwrap_or(&self.default_algorithm);
        self.algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| MatchmakingError::UnknownAlgorithm(name.to_string()))
    }
}

impl std::fmt::Debug for MatchmakingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut algorithms: Vec<&String> = self.algorithms.keys().collect();
        algorithms.sort();
        f.debug_struct("MatchmakingRegistry")
            .field("configurations", &self.configurations.len())
            .field("algorithms", &algorithms)
            .field("default_algorithm", &self.default_algorithm)
            .finish()
    }
}
