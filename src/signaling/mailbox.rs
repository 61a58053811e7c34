//! Per-(match, profile) signal mailbox.
//!
//! A mailbox holds at most one subscriber. MATCH signals are kept in a bounded
//! backlog and replayed, in send order, to every new subscriber. SESSION
//! signals are held only while nobody is subscribed, and are handed over to
//! the next subscriber exactly once. ONCE signals reach a subscriber only if
//! one is attached at send time.

use std::fmt;
use std::sync::Arc;

use matchd_proto::{Lifecycle, Signal};
use tracing::warn;

use crate::bounded::BoundedVec;
use crate::error::ConnectionError;
use crate::metrics::SignalOutcome;
use crate::store::ProfileId;

/// Receiving end of a mailbox subscription.
///
/// Implementations must not block: `deliver` either queues the signal or
/// reports why it could not.
pub trait SignalSink: Send + Sync {
    /// Hand over one signal.
    fn deliver(&self, signal: &Signal) -> Result<(), ConnectionError>;

    /// Report a fatal condition to the subscriber's connection.
    fn fail(&self, error: ConnectionError);
}

/// Identifies one subscription, so a displaced subscriber cannot detach its
/// successor.
pub type SubscriptionId = u64;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    sink: Arc<dyn SignalSink>,
}

impl Subscription {
    fn push(&self, signal: &Signal) -> SignalOutcome {
        match self.sink.deliver(signal) {
            Ok(()) => SignalOutcome::Delivered,
            Err(err) => {
                self.sink.fail(err);
                SignalOutcome::Dropped
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Retained {
    seq: u64,
    /// Sending profile; `None` for server notices.
    origin: Option<ProfileId>,
    signal: Signal,
}

impl Retained {
    fn new(seq: u64, signal: &Signal) -> Self {
        let origin = (!signal.message().message_type().is_server_only())
            .then(|| signal.profile_id().to_string());
        Self {
            seq,
            origin,
            signal: signal.clone(),
        }
    }
}

type Backlog = BoundedVec<Retained, ConnectionError>;

fn backlog_overrun(_: usize) -> ConnectionError {
    ConnectionError::BufferOverrun("mailbox backlog")
}

fn retain(backlog: &mut Backlog, seq: u64, signal: &Signal) -> Result<(), ConnectionError> {
    backlog.push(Retained::new(seq, signal)).inspect_err(|_| {
        warn!(
            signal = %signal.message().message_type(),
            lifecycle = %signal.lifecycle(),
            "Mailbox backlog full, dropping signal"
        );
    })
}

/// Signal sink for one profile within one match.
pub struct Mailbox {
    session_backlog: Backlog,
    match_backlog: Backlog,
    subscription: Option<Subscription>,
}

impl Mailbox {
    /// Create a mailbox whose backlogs each hold up to `backlog_cap` signals.
    pub fn new(backlog_cap: usize) -> Self {
        Self {
            session_backlog: BoundedVec::new(backlog_cap, backlog_overrun),
            match_backlog: BoundedVec::new(backlog_cap, backlog_overrun),
            subscription: None,
        }
    }

    #[inline]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(|s| s.id)
    }

    /// Retained signals, both lifecycles.
    pub fn backlog_len(&self) -> usize {
        self.session_backlog.len() + self.match_backlog.len()
    }

    /// Deliver a ONCE signal to the current subscriber, if any.
    pub fn deliver_once(&self, signal: &Signal) -> SignalOutcome {
        match &self.subscription {
            Some(sub) => sub.push(signal),
            None => SignalOutcome::Dropped,
        }
    }

    /// Route a signal by lifecycle; `seq` orders replay.
    ///
    /// A SESSION signal goes straight to a live subscriber and is retained
    /// only when nobody is attached. A MATCH signal is always retained.
    pub fn send(&mut self, seq: u64, signal: Signal) -> SignalOutcome {
        match signal.lifecycle() {
            Lifecycle::Once => self.deliver_once(&signal),
            Lifecycle::Session => match &self.subscription {
                Some(sub) => sub.push(&signal),
                None => match retain(&mut self.session_backlog, seq, &signal) {
                    Ok(()) => SignalOutcome::Retained,
                    Err(_) => SignalOutcome::Dropped,
                },
            },
            Lifecycle::Match => {
                if let Err(err) = retain(&mut self.match_backlog, seq, &signal) {
                    if let Some(sub) = &self.subscription {
                        sub.sink.fail(err);
                    }
                    return SignalOutcome::Dropped;
                }
                match &self.subscription {
                    Some(sub) => sub.push(&signal),
                    None => SignalOutcome::Retained,
                }
            }
        }
    }

    /// Install `sink` as the only subscriber and replay to it the MATCH
    /// backlog and every pending SESSION signal, in send order. Pending
    /// SESSION signals are consumed by the replay.
    ///
    /// An existing subscriber is evicted with
    /// [`ConnectionError::DuplicateConnection`]. Callers hold the owning
    /// state's write lock, so no send can interleave with the replay.
    pub fn subscribe(&mut self, id: SubscriptionId, sink: Arc<dyn SignalSink>) {
        if let Some(previous) = self.subscription.take() {
            previous.sink.fail(ConnectionError::DuplicateConnection);
        }
        let subscription = Subscription { id, sink };

        let mut replay: Vec<&Retained> = self
            .match_backlog
            .iter()
            .chain(self.session_backlog.iter())
            .collect();
        replay.sort_by_key(|r| r.seq);
        for retained in replay {
            if subscription.push(&retained.signal) == SignalOutcome::Dropped {
                break;
            }
        }

        self.session_backlog.clear();
        self.subscription = Some(subscription);
    }

    /// Detach subscription `id`. The MATCH backlog is kept. Returns `false`
    /// if `id` is not current.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if self.subscription_id() != Some(id) {
            return false;
        }
        self.subscription = None;
        true
    }

    /// Drop pending SESSION signals sent by `profile_id`. Called once that
    /// profile's session has ended.
    pub fn purge_origin(&mut self, profile_id: &str) {
        self.session_backlog
            .retain(|r| r.origin.as_deref() != Some(profile_id));
    }

    /// Forward a fatal error to the subscriber and detach it.
    pub fn error(&mut self, error: ConnectionError) {
        if let Some(sub) = self.subscription.take() {
            sub.sink.fail(error);
        }
    }

    /// Whether a pending SESSION signal matches `predicate`.
    pub fn has_pending<F: Fn(&Signal) -> bool>(&self, predicate: F) -> bool {
        self.session_backlog.iter().any(|r| predicate(&r.signal))
    }

    /// Drop pending SESSION signals matching `predicate`.
    pub fn supersede<F: Fn(&Signal) -> bool>(&mut self, predicate: F) {
        self.session_backlog.retain(|r| !predicate(&r.signal));
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("session_backlog", &self.session_backlog.len())
            .field("match_backlog", &self.match_backlog.len())
            .field("subscription", &self.subscription_id())
            .finish()
    }
}
