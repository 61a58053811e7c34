//! Per-match signaling state.
//!
//! Owns every mailbox of one match plus the host assignment. A read/write lock
//! guards it: ONCE fan-out only reads, while anything that touches a backlog
//! or a subscription takes the write lock, so host failover, presence notices
//! and backlog appends are linearizable with join and leave.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use matchd_proto::{Lifecycle, ProtocolMessage, Signal};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::mailbox::{Mailbox, SignalSink, SubscriptionId};
use crate::error::{ConnectionError, ConnectionResult};
use crate::metrics::{self, SignalOutcome};
use crate::store::{MatchId, ProfileId};

#[derive(Debug, Default)]
struct Inner {
    /// Ordered so host failover picks the lowest live profile id.
    mailboxes: BTreeMap<ProfileId, Mailbox>,
    host: Option<ProfileId>,
    next_subscription: SubscriptionId,
    next_seq: u64,
    closed: bool,
    /// Since when nobody has been subscribed.
    vacated: Option<Instant>,
}

impl Inner {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn mailbox(&mut self, profile_id: &str, backlog_cap: usize) -> &mut Mailbox {
        self.mailboxes
            .entry(profile_id.to_string())
            .or_insert_with(|| Mailbox::new(backlog_cap))
    }

    /// Announce `host` to every mailbox, replacing any HOST still pending.
    fn broadcast_host(&mut self, host: &str) {
        let signal = Signal::host(host);
        let seq = self.seq();
        for mailbox in self.mailboxes.values_mut() {
            mailbox.supersede(is_host);
            metrics::record_signal(mailbox.send(seq, signal.clone()));
        }
    }

    fn lowest_subscribed(&self) -> Option<ProfileId> {
        self.mailboxes
            .iter()
            .find(|(_, mailbox)| mailbox.is_subscribed())
            .map(|(profile, _)| profile.clone())
    }

    fn is_subscribed(&self, profile_id: &str) -> bool {
        self.mailboxes
            .get(profile_id)
            .is_some_and(Mailbox::is_subscribed)
    }

    /// Send CONNECT or DISCONNECT for `subject` to `targets`. A notice still
    /// pending about the same profile is replaced, so a reconnecting peer
    /// sees only the latest presence.
    fn announce(&mut self, targets: &[ProfileId], subject: &str, signal: Signal, backlog_cap: usize) {
        metrics::record_fanout(targets.len());
        let seq = self.seq();
        for target in targets.iter().filter(|t| t.as_str() != subject) {
            let mailbox = self.mailbox(target, backlog_cap);
            mailbox.supersede(|s| is_presence_of(s, subject));
            metrics::record_signal(mailbox.send(seq, signal.clone()));
        }
    }
}

fn is_host(signal: &Signal) -> bool {
    matches!(signal.message(), ProtocolMessage::Host(_))
}

fn is_presence_of(signal: &Signal, peer: &str) -> bool {
    match signal.message() {
        ProtocolMessage::Connect(p) | ProtocolMessage::Disconnect(p) => p.profile_id == peer,
        _ => false,
    }
}

fn is_connect_for(signal: &Signal, peer: &str) -> bool {
    matches!(signal.message(), ProtocolMessage::Connect(p) if p.profile_id == peer)
}

/// Mailboxes and host assignment of one match.
#[derive(Debug)]
pub struct MatchSignalingState {
    match_id: MatchId,
    backlog_cap: usize,
    inner: RwLock<Inner>,
}

impl MatchSignalingState {
    pub fn new(match_id: impl Into<MatchId>, backlog_cap: usize) -> Self {
        Self {
            match_id: match_id.into(),
            backlog_cap,
            inner: RwLock::new(Inner {
                vacated: Some(Instant::now()),
                ..Inner::default()
            }),
        }
    }

    #[inline]
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Currently assigned host.
    pub fn host(&self) -> Option<ProfileId> {
        self.inner.read().host.clone()
    }

    pub fn is_subscribed(&self, profile_id: &str) -> bool {
        self.inner.read().is_subscribed(profile_id)
    }

    /// Profiles with a live subscriber, ascending.
    pub fn subscribers(&self) -> Vec<ProfileId> {
        self.inner
            .read()
            .mailboxes
            .iter()
            .filter(|(_, mailbox)| mailbox.is_subscribed())
            .map(|(profile, _)| profile.clone())
            .collect()
    }

    /// How long nobody has been subscribed; `None` while anyone is.
    pub fn vacant_for(&self) -> Option<Duration> {
        self.inner.read().vacated.map(|since| since.elapsed())
    }

    /// Whether [`error`](Self::error) has torn this state down.
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Deliver a direct signal to its recipient's mailbox.
    pub fn send_direct(&self, signal: &Signal) {
        let Some(recipient) = signal.recipient_profile_id() else {
            return;
        };

        let outcome = if signal.lifecycle() == Lifecycle::Once {
            let inner = self.inner.read();
            match inner.mailboxes.get(recipient) {
                Some(mailbox) => mailbox.deliver_once(signal),
                None => SignalOutcome::Dropped,
            }
        } else {
            let mut inner = self.inner.write();
            if inner.closed {
                return;
            }
            let seq = inner.seq();
            inner
                .mailbox(recipient, self.backlog_cap)
                .send(seq, signal.clone())
        };
        metrics::record_signal(outcome);
    }

    /// Fan a broadcast signal out to `targets`.
    ///
    /// Retained signals are appended to every target in one pass under the
    /// write lock, so a concurrent subscriber sees all of them or none.
    pub fn broadcast(&self, targets: &[ProfileId], signal: &Signal) {
        metrics::record_fanout(targets.len());

        if signal.lifecycle() == Lifecycle::Once {
            let inner = self.inner.read();
            for target in targets {
                let outcome = match inner.mailboxes.get(target) {
                    Some(mailbox) => mailbox.deliver_once(signal),
                    None => SignalOutcome::Dropped,
                };
                metrics::record_signal(outcome);
            }
            return;
        }

        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        let seq = inner.seq();
        for target in targets {
            let outcome = inner
                .mailbox(target, self.backlog_cap)
                .send(seq, signal.clone());
            metrics::record_signal(outcome);
        }
    }

    /// Subscribe `sink` to `profile_id`'s mailbox.
    ///
    /// `members` other than the joiner are told with CONNECT first. The
    /// joiner's backlog is then replayed, followed by CONNECT for every peer
    /// already subscribed and the current HOST, each skipped if the replay
    /// already carried one. With no host assigned the joiner becomes host and
    /// HOST is broadcast.
    pub fn join(
        &self,
        profile_id: &str,
        sink: Arc<dyn SignalSink>,
        members: &[ProfileId],
    ) -> ConnectionResult<SubscriptionId> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(ConnectionError::MatchDeleted(self.match_id.clone()));
        }

        inner.announce(members, profile_id, Signal::connect(profile_id), self.backlog_cap);

        let peers: Vec<ProfileId> = inner
            .mailboxes
            .iter()
            .filter(|(peer, mailbox)| peer.as_str() != profile_id && mailbox.is_subscribed())
            .map(|(peer, _)| peer.clone())
            .collect();
        let mailbox = inner.mailbox(profile_id, self.backlog_cap);
        let catch_up: Vec<ProfileId> = peers
            .into_iter()
            .filter(|peer| !mailbox.has_pending(|s| is_connect_for(s, peer)))
            .collect();
        let host_pending = mailbox.has_pending(is_host);

        inner.next_subscription += 1;
        let id = inner.next_subscription;
        inner.vacated = None;
        inner.mailbox(profile_id, self.backlog_cap).subscribe(id, sink);

        for peer in catch_up {
            let seq = inner.seq();
            let mailbox = inner.mailbox(profile_id, self.backlog_cap);
            metrics::record_signal(mailbox.send(seq, Signal::connect(peer)));
        }

        match inner.host.clone() {
            None => {
                info!(match_id = %self.match_id, host = %profile_id, "Host assigned");
                inner.host = Some(profile_id.to_string());
                inner.broadcast_host(profile_id);
            }
            Some(host) if !host_pending => {
                let seq = inner.seq();
                let mailbox = inner.mailbox(profile_id, self.backlog_cap);
                metrics::record_signal(mailbox.send(seq, Signal::host(host)));
            }
            Some(_) => {}
        }

        debug!(match_id = %self.match_id, profile = %profile_id, subscription = id, "Subscribed");
        Ok(id)
    }

    /// End subscription `id` of `profile_id`.
    ///
    /// Returns `false`, changing nothing, if that subscription is no longer
    /// current (it was displaced or already ended). Otherwise signals the
    /// profile sent that are still pending are dropped, host fails over to
    /// the lowest still-subscribed profile, and `members` other than the
    /// leaver are told with DISCONNECT. A profile missing from `members` has
    /// left the match and its mailbox is discarded.
    pub fn leave(&self, profile_id: &str, id: SubscriptionId, members: &[ProfileId]) -> bool {
        let mut inner = self.inner.write();
        let detached = inner
            .mailboxes
            .get_mut(profile_id)
            .is_some_and(|mailbox| mailbox.unsubscribe(id));
        if !detached {
            return false;
        }

        for mailbox in inner.mailboxes.values_mut() {
            mailbox.purge_origin(profile_id);
        }

        if inner.host.as_deref() == Some(profile_id) {
            inner.host = inner.lowest_subscribed();
            match inner.host.clone() {
                Some(next) => {
                    info!(match_id = %self.match_id, from = %profile_id, to = %next, "Host failover");
                    inner.broadcast_host(&next);
                }
                None => {
                    debug!(match_id = %self.match_id, "No subscribers left, host unassigned");
                    for mailbox in inner.mailboxes.values_mut() {
                        mailbox.supersede(is_host);
                    }
                }
            }
        }

        inner.announce(members, profile_id, Signal::disconnect(profile_id), self.backlog_cap);

        if !members.iter().any(|m| m == profile_id) {
            inner.mailboxes.remove(profile_id);
        }
        if inner.lowest_subscribed().is_none() {
            inner.vacated = Some(Instant::now());
        }
        true
    }

    /// Make `profile_id` host, or with `None` keep a live host or elect the
    /// lowest subscribed profile. Only subscribed profiles can be host.
    pub fn assign_host(&self, profile_id: Option<&str>) -> Option<ProfileId> {
        let mut inner = self.inner.write();
        let current = inner.host.clone();

        let next = match profile_id {
            Some(candidate) if inner.is_subscribed(candidate) => Some(candidate.to_string()),
            Some(_) => return current,
            None => match current.as_deref() {
                Some(host) if inner.is_subscribed(host) => return current,
                _ => inner.lowest_subscribed(),
            },
        };

        if next != current {
            inner.host = next.clone();
            if let Some(host) = &next {
                info!(match_id = %self.match_id, %host, "Host reassigned");
                inner.broadcast_host(host);
            }
        }
        next
    }

    /// Fail every subscriber with `error` and discard all mailboxes.
    pub fn error(&self, error: ConnectionError) {
        let mut inner = self.inner.write();
        inner.closed = true;
        inner.host = None;
        for mailbox in inner.mailboxes.values_mut() {
            mailbox.error(error.clone());
        }
        inner.mailboxes.clear();
    }
}
