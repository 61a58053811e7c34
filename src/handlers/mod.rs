//! Protocol handlers.
//!
//! A connection's messages flow through one [`ProtocolMessageHandler`], which
//! owns the [`ConnectionState`] and delegates by phase:
//!
//! - [`HandshakeHandler`]: FIND/JOIN, authentication and matchmaking
//! - [`SignalingHandler`]: broadcast and direct signals once matched
//! - [`control`]: OPEN/CLOSE/END/LEAVE
//!
//! Work that completes off the connection task (authentication, matchmaking,
//! mailbox errors) comes back as a [`ConnectionEvent`] through the
//! connection's [`ConnectionSink`].

pub mod control;
mod handshake;
mod protocol;
mod signaling;
mod state;

pub use control::ControlAction;
pub use handshake::{HandshakeHandler, HandshakePhase};
pub use protocol::ProtocolMessageHandler;
pub use signaling::SignalingHandler;
pub use state::{ConnectionPhase, ConnectionState, Drained};

use matchd_proto::{CloseCode, ProtocolMessage, Signal};
use tokio::sync::mpsc;

use crate::error::{ConnectionError, ConnectionResult};
use crate::matchmaking::{MatchListener, MatchmakingError, MultiMatchRecord};
use crate::signaling::SignalSink;
use crate::store::{AuthRecord, MultiMatch};

/// Completion of work started by a connection's handlers.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Session and profile lookup finished.
    Authenticated(ConnectionResult<AuthRecord>),
    /// JOIN target checked against the match store.
    JoinVerified(Result<MultiMatch, MatchmakingError>),
    /// Matchmaking settled.
    Matched(Result<MultiMatchRecord, MatchmakingError>),
    /// Something outside the connection made it unusable.
    Fatal(ConnectionError),
}

/// Write side of a client connection, as seen by the handlers.
pub trait ClientSession: Send {
    /// Queue one message for the client.
    fn send(&mut self, message: &ProtocolMessage) -> ConnectionResult;

    /// Close the transport. Idempotent.
    fn close(&mut self, code: CloseCode, reason: &str);

    fn is_open(&self) -> bool;
}

/// Feeds a connection task from the outside: mailbox signals go into a
/// bounded queue, everything else into the event channel.
#[derive(Debug, Clone)]
pub struct ConnectionSink {
    signals: mpsc::Sender<Signal>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionSink {
    pub fn new(
        signals: mpsc::Sender<Signal>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self { signals, events }
    }

    /// Post an event. Dropped silently once the connection is gone.
    pub fn post(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

impl SignalSink for ConnectionSink {
    fn deliver(&self, signal: &Signal) -> Result<(), ConnectionError> {
        self.signals.try_send(signal.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::BufferOverrun("signal queue"),
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    fn fail(&self, error: ConnectionError) {
        self.post(ConnectionEvent::Fatal(error));
    }
}

impl MatchListener for ConnectionSink {
    fn on_matched(&self, record: MultiMatchRecord) {
        self.post(ConnectionEvent::Matched(Ok(record)));
    }

    fn on_failed(&self, error: MatchmakingError) {
        self.post(ConnectionEvent::Matched(Err(error)));
    }
}
