//! Match-scoped signal routing.
//!
//! Checks membership against the match store, then hands signals to the
//! match's [`MatchSignalingState`]. States are created on first use and
//! released once a match has ended and nobody is subscribed. Matches nobody
//! has been subscribed to for a grace period are deleted by [`reap`].
//!
//! [`reap`]: MatchSignalingService::reap

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use matchd_proto::Signal;
use tracing::{debug, info, instrument, warn};

use super::mailbox::{SignalSink, SubscriptionId};
use super::state::MatchSignalingState;
use crate::error::{ConnectionError, ConnectionResult};
use crate::metrics;
use crate::store::{MatchId, MatchObserver, MatchStatus, MatchStore, ProfileId, StoreError};

/// Handle returned by [`MatchSignalingService::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingSubscription {
    pub match_id: MatchId,
    pub profile_id: ProfileId,
    pub id: SubscriptionId,
}

/// Routes signals between the members of each match.
pub struct MatchSignalingService {
    matches: DashMap<MatchId, Arc<MatchSignalingState>>,
    store: Arc<dyn MatchStore>,
    backlog_cap: usize,
}

impl MatchSignalingService {
    pub fn new(store: Arc<dyn MatchStore>, backlog_cap: usize) -> Self {
        Self {
            matches: DashMap::new(),
            store,
            backlog_cap,
        }
    }

    /// Signaling state of `match_id`, if any connection has touched it.
    pub fn get(&self, match_id: &str) -> Option<Arc<MatchSignalingState>> {
        self.matches.get(match_id).map(|s| Arc::clone(s.value()))
    }

    /// Matches that currently hold signaling state.
    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    fn state(&self, match_id: &str) -> ConnectionResult<Arc<MatchSignalingState>> {
        let state = self
            .matches
            .entry(match_id.to_string())
            .or_insert_with(|| Arc::new(MatchSignalingState::new(match_id, self.backlog_cap)))
            .clone();
        metrics::set_signaling_matches(self.matches.len());
        if state.is_closed() {
            return Err(ConnectionError::MatchDeleted(match_id.to_string()));
        }
        Ok(state)
    }

    async fn members(&self, match_id: &str) -> ConnectionResult<Vec<ProfileId>> {
        match self.store.get_profiles(match_id).await {
            Ok(members) => Ok(members),
            Err(StoreError::MatchNotFound(id)) => Err(ConnectionError::MatchDeleted(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Route `signal` within `match_id`.
    ///
    /// The originator, and for direct signals the recipient, must be members.
    /// Broadcasts reach every member except the originator.
    pub async fn send(&self, match_id: &str, signal: Signal) -> ConnectionResult {
        let members = self.members(match_id).await?;
        let origin = signal.profile_id();
        if !members.iter().any(|m| m == origin) {
            return Err(ConnectionError::Forbidden(format!(
                "{origin} is not a member of match {match_id}"
            )));
        }

        let state = self.state(match_id)?;
        match signal.recipient_profile_id() {
            Some(recipient) => {
                if !members.iter().any(|m| m == recipient) {
                    return Err(ConnectionError::Forbidden(format!(
                        "{recipient} is not a member of match {match_id}"
                    )));
                }
                state.send_direct(&signal);
            }
            None => {
                let targets: Vec<ProfileId> =
                    members.into_iter().filter(|m| m != origin).collect();
                state.broadcast(&targets, &signal);
            }
        }
        Ok(())
    }

    /// Subscribe `sink` as `profile_id`'s connection to `match_id`.
    ///
    /// Other members are told with CONNECT before the joiner's backlog is
    /// replayed.
    #[instrument(skip(self, sink), level = "debug")]
    pub async fn join(
        &self,
        match_id: &str,
        profile_id: &str,
        sink: Arc<dyn SignalSink>,
    ) -> ConnectionResult<SignalingSubscription> {
        let members = self.members(match_id).await?;
        if !members.iter().any(|m| m == profile_id) {
            return Err(ConnectionError::Forbidden(format!(
                "{profile_id} is not a member of match {match_id}"
            )));
        }

        let state = self.state(match_id)?;
        let id = state.join(profile_id, sink, &members)?;

        Ok(SignalingSubscription {
            match_id: match_id.to_string(),
            profile_id: profile_id.to_string(),
            id,
        })
    }

    /// End a subscription. Other members are told with DISCONNECT unless the
    /// subscription had already been displaced.
    ///
    /// Membership is read before the subscription is detached, so detaching
    /// and announcing happen under one lock and cannot straddle a reconnect.
    #[instrument(skip(self), level = "debug")]
    pub async fn leave(&self, subscription: &SignalingSubscription) {
        let SignalingSubscription {
            match_id,
            profile_id,
            id,
        } = subscription;

        let Some(state) = self.get(match_id) else {
            return;
        };
        let members = match self.store.get_profiles(match_id).await {
            Ok(members) => members,
            Err(e) => {
                debug!(%match_id, error = %e, "Falling back to live subscribers");
                state.subscribers()
            }
        };

        if !state.leave(profile_id, *id, &members) {
            debug!(%match_id, %profile_id, "Subscription already displaced");
            return;
        }
        self.release_if_ended(match_id, &state).await;
    }

    /// Reassign the host of `match_id`. See [`MatchSignalingState::assign_host`].
    pub fn assign_host(&self, match_id: &str, profile_id: Option<&str>) -> Option<ProfileId> {
        self.get(match_id)?.assign_host(profile_id)
    }

    async fn release_if_ended(&self, match_id: &str, state: &Arc<MatchSignalingState>) {
        if !state.subscribers().is_empty() {
            return;
        }
        let ended = match self.store.get_match(match_id).await {
            Ok(record) => record.status == MatchStatus::Ended,
            Err(StoreError::MatchNotFound(_)) => true,
            Err(_) => false,
        };
        if ended {
            self.release(match_id, state);
        }
    }

    fn release(&self, match_id: &str, state: &Arc<MatchSignalingState>) {
        self.matches
            .remove_if(match_id, |_, current| Arc::ptr_eq(current, state));
        metrics::set_signaling_matches(self.matches.len());
        debug!(%match_id, "Released signaling state");
    }

    /// Delete every match nobody has been subscribed to for at least `grace`.
    ///
    /// A match with signaling state is idle from the moment its last
    /// subscriber left; one that never reached signaling is idle from its
    /// creation. Deleting the record closes its signaling state through
    /// [`MatchObserver`]. Returns the number of matches deleted.
    pub async fn reap(&self, grace: Duration) -> usize {
        let records = match self.store.list_matches().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Cannot list matches, skipping reap");
                return 0;
            }
        };

        let now = Utc::now().timestamp();
        let mut reaped = 0;
        for record in records {
            let idle = match self.get(&record.id) {
                Some(state) => state.vacant_for(),
                None => Some(Duration::from_secs(
                    u64::try_from(now - record.created_at).unwrap_or_default(),
                )),
            };
            if !idle.is_some_and(|idle| idle >= grace) {
                continue;
            }

            match self.store.delete_match(&record.id).await {
                Ok(()) => {
                    info!(match_id = %record.id, status = %record.status, "Abandoned match reaped");
                    reaped += 1;
                }
                Err(StoreError::MatchNotFound(_)) => {}
                Err(e) => warn!(match_id = %record.id, error = %e, "Failed to reap match"),
            }
        }

        // State whose record vanished without a deletion notice.
        let orphans: Vec<Arc<MatchSignalingState>> = self
            .matches
            .iter()
            .filter(|entry| entry.value().subscribers().is_empty())
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for state in orphans {
            if let Err(StoreError::MatchNotFound(_)) = self.store.get_match(state.match_id()).await {
                self.release(state.match_id(), &state);
            }
        }
        reaped
    }
}

impl MatchObserver for MatchSignalingService {
    fn on_match_deleted(&self, match_id: &str) {
        if let Some((_, state)) = self.matches.remove(match_id) {
            info!(%match_id, subscribers = state.subscribers().len(), "Match deleted, closing signaling");
            state.error(ConnectionError::MatchDeleted(match_id.to_string()));
        }
        metrics::set_signaling_matches(self.matches.len());
    }
}

impl std::fmt::Debug for MatchSignalingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSignalingService")
            .field("matches", &self.matches.len())
            .field("backlog_cap", &self.backlog_cap)
            .finish_non_exhaustive()
    }
}
