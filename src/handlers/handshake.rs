//! Handshake handler: FIND/JOIN through authentication and matchmaking.
//!
//! ```text
//! WAITING -> READY -> AUTHENTICATING -> AUTHENTICATED -> MATCHING -> MATCHED
//!                                    (any non-terminal) -> TERMINATED
//! ```
//!
//! Authentication and the JOIN membership check run as spawned tasks and
//! report back through the connection's event channel; matchmaking reports
//! through the match listener.

use std::fmt;
use std::sync::Arc;

use matchd_proto::{ProtocolMessage, Version};
use tracing::{debug, info};

use super::{ConnectionEvent, ConnectionSink};
use crate::error::{ConnectionError, ConnectionResult};
use crate::matchmaking::{
    MatchHandle, MatchListener, MatchRequest, MatchmakingError, MultiMatchRecord,
};
use crate::server::Services;
use crate::store::{AuthRecord, MatchStatus, MatchStore, MultiMatch, StoreError};

/// Handshake phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    Waiting,
    Ready,
    Authenticating,
    Authenticated,
    Matching,
    Matched,
    Terminated,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandshakePhase::Waiting => "WAITING",
            HandshakePhase::Ready => "READY",
            HandshakePhase::Authenticating => "AUTHENTICATING",
            HandshakePhase::Authenticated => "AUTHENTICATED",
            HandshakePhase::Matching => "MATCHING",
            HandshakePhase::Matched => "MATCHED",
            HandshakePhase::Terminated => "TERMINATED",
        })
    }
}

/// What the client asked for.
#[derive(Debug, Clone)]
enum Intent {
    Find { configuration: String },
    Join { match_id: String },
}

/// Drives one connection from its first handshake message to MATCHED.
#[derive(Debug)]
pub struct HandshakeHandler {
    services: Arc<Services>,
    sink: ConnectionSink,
    phase: HandshakePhase,
    version: Option<Version>,
    intent: Option<Intent>,
    auth: Option<AuthRecord>,
    handle: Option<Arc<MatchHandle>>,
}

impl HandshakeHandler {
    pub fn new(services: Arc<Services>, sink: ConnectionSink) -> Self {
        Self {
            services,
            sink,
            phase: HandshakePhase::Waiting,
            version: None,
            intent: None,
            auth: None,
            handle: None,
        }
    }

    #[inline]
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Protocol version negotiated by the handshake request.
    #[inline]
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    fn violation(&self, op: &str) -> ConnectionError {
        ConnectionError::ProtocolState(format!("cannot {op} while handshake is {}", self.phase))
    }

    /// WAITING -> READY.
    pub fn start(&mut self) -> ConnectionResult {
        match self.phase {
            HandshakePhase::Waiting => {
                self.phase = HandshakePhase::Ready;
                Ok(())
            }
            HandshakePhase::Terminated => Ok(()),
            _ => Err(self.violation("start")),
        }
    }

    /// Accept FIND or JOIN and begin authenticating.
    pub fn on_message(&mut self, message: &ProtocolMessage) -> ConnectionResult {
        if self.phase != HandshakePhase::Ready {
            return Err(self.violation("accept a handshake request"));
        }

        let (profile_id, session_key, intent) = match message {
            ProtocolMessage::Find(find) => (
                &find.profile_id,
                &find.session_key,
                Intent::Find {
                    configuration: find.configuration.clone(),
                },
            ),
            ProtocolMessage::Join(join) => (
                &join.profile_id,
                &join.session_key,
                Intent::Join {
                    match_id: join.match_id.clone(),
                },
            ),
            other => {
                return Err(ConnectionError::UnexpectedMessage(format!(
                    "{} is not a handshake request",
                    other.message_type()
                )));
            }
        };

        let requested = message.requested_version().ok_or_else(|| {
            ConnectionError::UnexpectedMessage("handshake request without version".into())
        })?;
        self.negotiate(message, requested)?;

        debug!(profile = %profile_id, version = %requested, ?intent, "Handshake requested");
        self.intent = Some(intent);
        self.authenticate(profile_id.clone(), session_key.clone())
    }

    fn negotiate(&mut self, message: &ProtocolMessage, requested: Version) -> ConnectionResult {
        let protocol = &self.services.config.protocol;
        if !protocol.supports(requested) {
            return Err(ConnectionError::UnexpectedMessage(format!(
                "version {requested} outside supported range {}..={}",
                protocol.min_version, protocol.version
            )));
        }
        let minimum = message.message_type().min_version();
        if requested < minimum {
            return Err(ConnectionError::UnexpectedMessage(format!(
                "{} requires version {minimum}",
                message.message_type()
            )));
        }
        self.version = Some(requested);
        Ok(())
    }

    /// READY -> AUTHENTICATING; the lookup runs off the connection task.
    fn authenticate(&mut self, profile_id: String, session_key: String) -> ConnectionResult {
        if self.phase != HandshakePhase::Ready {
            return Err(self.violation("authenticate"));
        }
        self.phase = HandshakePhase::Authenticating;

        let sessions = Arc::clone(&self.services.sessions);
        let profiles = Arc::clone(&self.services.profiles);
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = async {
                let session = sessions.check_and_refresh_session(&session_key).await?;
                let profile = profiles.get_active_profile(&session, &profile_id).await?;
                Ok::<_, StoreError>(AuthRecord { profile, session })
            }
            .await
            .map_err(ConnectionError::from);
            sink.post(ConnectionEvent::Authenticated(result));
        });
        Ok(())
    }

    /// AUTHENTICATING -> AUTHENTICATED, then start matching.
    ///
    /// Returns the record for the connection state, or `None` if the
    /// handshake was terminated meanwhile.
    pub fn on_authenticated(
        &mut self,
        result: ConnectionResult<AuthRecord>,
    ) -> ConnectionResult<Option<AuthRecord>> {
        match self.phase {
            HandshakePhase::Authenticating => {}
            HandshakePhase::Terminated => return Ok(None),
            _ => return Err(self.violation("complete authentication")),
        }
        let auth = result?;
        info!(profile = %auth.profile_id(), user = %auth.session.user_id, "Authenticated");
        self.phase = HandshakePhase::Authenticated;
        self.auth = Some(auth.clone());
        self.begin_matching(&auth)?;
        Ok(Some(auth))
    }

    /// AUTHENTICATED -> MATCHING.
    fn begin_matching(&mut self, auth: &AuthRecord) -> ConnectionResult {
        let intent = self
            .intent
            .clone()
            .ok_or_else(|| ConnectionError::Internal("authenticated without a request".into()))?;
        self.phase = HandshakePhase::Matching;

        match intent {
            Intent::Find { configuration } => {
                let registry = &self.services.matchmaking;
                let configuration = registry.configuration(&configuration)?;
                let algorithm = registry.algorithm_for(&configuration)?;
                let request = MatchRequest {
                    profile_id: auth.profile_id().to_string(),
                    configuration,
                };
                let listener: Arc<dyn MatchListener> = Arc::new(self.sink.clone());
                let handle = algorithm.find(request, listener);
                self.handle = Some(Arc::clone(&handle));
                handle.start()?;
                debug!(algorithm = algorithm.name(), "Matchmaking started");
            }
            Intent::Join { match_id } => {
                let store = Arc::clone(&self.services.store);
                let profile_id = auth.profile_id().to_string();
                let sink = self.sink.clone();
                tokio::spawn(async move {
                    let result = verify_membership(store.as_ref(), &match_id, &profile_id).await;
                    sink.post(ConnectionEvent::JoinVerified(result));
                });
            }
        }
        Ok(())
    }

    /// Attach to a verified JOIN target.
    pub fn on_join_verified(
        &mut self,
        result: Result<MultiMatch, MatchmakingError>,
    ) -> ConnectionResult {
        match self.phase {
            HandshakePhase::Matching if self.handle.is_none() => {}
            HandshakePhase::Terminated => return Ok(()),
            _ => return Err(self.violation("join a match")),
        }
        let record = result?;
        let auth = self
            .auth
            .as_ref()
            .ok_or_else(|| ConnectionError::Internal("join verified before authentication".into()))?;

        let registry = &self.services.matchmaking;
        let configuration = registry.configuration(&record.configuration)?;
        let algorithm = registry.algorithm_for(&configuration)?;
        let request = MatchRequest {
            profile_id: auth.profile_id().to_string(),
            configuration,
        };
        let listener: Arc<dyn MatchListener> = Arc::new(self.sink.clone());
        self.handle = Some(algorithm.join(request, record, listener));
        Ok(())
    }

    /// MATCHING -> MATCHED.
    pub fn on_matched(
        &mut self,
        result: Result<MultiMatchRecord, MatchmakingError>,
    ) -> ConnectionResult<Option<MultiMatchRecord>> {
        match self.phase {
            HandshakePhase::Matching => {}
            HandshakePhase::Terminated => return Ok(None),
            _ => return Err(self.violation("complete matchmaking")),
        }
        let record = result?;
        self.phase = HandshakePhase::Matched;
        Ok(Some(record))
    }

    /// Terminate the handshake, releasing any pending matchmaking.
    ///
    /// A handle that settled after the connection gave up leaves its match
    /// again; one still matching is cancelled.
    pub fn stop(&mut self) {
        let previous = std::mem::replace(&mut self.phase, HandshakePhase::Terminated);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if previous == HandshakePhase::Matched {
            return;
        }
        if handle.cancel() {
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = handle.leave().await {
                debug!(profile = %handle.profile_id(), error = %e, "Failed to leave unclaimed match");
            }
        });
    }
}

async fn verify_membership(
    store: &dyn MatchStore,
    match_id: &str,
    profile_id: &str,
) -> Result<MultiMatch, MatchmakingError> {
    let record = store.get_match(match_id).await?;
    if record.status == MatchStatus::Ended {
        return Err(MatchmakingError::MatchEnded(match_id.to_string()));
    }
    let members = store.get_profiles(match_id).await?;
    if !members.iter().any(|m| m == profile_id) {
        return Err(MatchmakingError::NotAMember {
            match_id: match_id.to_string(),
            profile_id: profile_id.to_string(),
        });
    }
    Ok(record)
}
