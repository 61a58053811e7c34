//! Per-connection state machine.
//!
//! ```text
//! WAITING -> READY -> HANDSHAKE -> SIGNALING
//!     \        \          \            \
//!      +--------+----------+------------+--> TERMINATED
//! ```
//!
//! SIGNALING is reached only once both the authentication and the match
//! assignment have completed, in either order. Until then inbound and
//! outbound messages are held in bounded backlogs, which are handed back in
//! arrival order by the transition that reaches SIGNALING.

use std::fmt;

use matchd_proto::ProtocolMessage;

use crate::bounded::BoundedVec;
use crate::config::LimitsConfig;
use crate::error::{ConnectionError, ConnectionResult};
use crate::matchmaking::MultiMatchRecord;
use crate::store::AuthRecord;

/// Connection phase. Ordered: phases only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionPhase {
    Waiting,
    Ready,
    Handshake,
    Signaling,
    Terminated,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionPhase::Waiting => "WAITING",
            ConnectionPhase::Ready => "READY",
            ConnectionPhase::Handshake => "HANDSHAKE",
            ConnectionPhase::Signaling => "SIGNALING",
            ConnectionPhase::Terminated => "TERMINATED",
        })
    }
}

/// Backlogs released on entering SIGNALING.
#[derive(Debug, Default)]
pub struct Drained {
    pub inbound: Vec<ProtocolMessage>,
    pub outbound: Vec<ProtocolMessage>,
}

type Backlog = BoundedVec<ProtocolMessage, ConnectionError>;

fn inbound_overrun(_: usize) -> ConnectionError {
    ConnectionError::BufferOverrun("inbound handshake backlog")
}

fn outbound_overrun(_: usize) -> ConnectionError {
    ConnectionError::BufferOverrun("outbound handshake backlog")
}

/// Connection state owned by one connection task.
#[derive(Debug)]
pub struct ConnectionState {
    phase: ConnectionPhase,
    auth: Option<AuthRecord>,
    matched: Option<MultiMatchRecord>,
    inbound: Backlog,
    outbound: Backlog,
}

impl ConnectionState {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            phase: ConnectionPhase::Waiting,
            auth: None,
            matched: None,
            inbound: BoundedVec::new(limits.handshake_inbound, inbound_overrun),
            outbound: BoundedVec::new(limits.handshake_outbound, outbound_overrun),
        }
    }

    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.phase == ConnectionPhase::Terminated
    }

    pub fn auth(&self) -> Option<&AuthRecord> {
        self.auth.as_ref()
    }

    pub fn match_record(&self) -> Option<&MultiMatchRecord> {
        self.matched.as_ref()
    }

    /// Messages currently held, inbound and outbound.
    pub fn backlog_len(&self) -> (usize, usize) {
        (self.inbound.len(), self.outbound.len())
    }

    fn violation(&self, op: &str) -> ConnectionError {
        ConnectionError::ProtocolState(format!("cannot {op} while {}", self.phase))
    }

    /// WAITING -> READY once the transport is up.
    pub fn start(&mut self) -> ConnectionResult {
        match self.phase {
            ConnectionPhase::Waiting => {
                self.phase = ConnectionPhase::Ready;
                Ok(())
            }
            ConnectionPhase::Terminated => Ok(()),
            _ => Err(self.violation("start")),
        }
    }

    /// READY -> HANDSHAKE on the first handshake message.
    pub fn handshake(&mut self) -> ConnectionResult {
        match self.phase {
            ConnectionPhase::Ready => {
                self.phase = ConnectionPhase::Handshake;
                Ok(())
            }
            ConnectionPhase::Terminated => Ok(()),
            _ => Err(self.violation("begin handshake")),
        }
    }

    /// Record the authentication. Returns the drained backlogs if this
    /// completes the handshake.
    pub fn authenticated(&mut self, auth: AuthRecord) -> ConnectionResult<Option<Drained>> {
        match self.phase {
            ConnectionPhase::Handshake if self.auth.is_none() => {
                self.auth = Some(auth);
                Ok(self.try_enter_signaling())
            }
            ConnectionPhase::Terminated => Ok(None),
            _ => Err(self.violation("authenticate")),
        }
    }

    /// Record the match assignment. Returns the drained backlogs if this
    /// completes the handshake.
    pub fn matched(&mut self, record: MultiMatchRecord) -> ConnectionResult<Option<Drained>> {
        match self.phase {
            ConnectionPhase::Handshake if self.matched.is_none() => {
                self.matched = Some(record);
                Ok(self.try_enter_signaling())
            }
            ConnectionPhase::Terminated => Ok(None),
            _ => Err(self.violation("assign a match")),
        }
    }

    fn try_enter_signaling(&mut self) -> Option<Drained> {
        if self.auth.is_none() || self.matched.is_none() {
            return None;
        }
        self.phase = ConnectionPhase::Signaling;
        Some(Drained {
            inbound: self.inbound.take(),
            outbound: self.outbound.take(),
        })
    }

    /// Hold an inbound message until SIGNALING.
    ///
    /// Once SIGNALING the message is handed straight back for dispatch.
    /// After termination it is discarded.
    pub fn buffer_inbound(
        &mut self,
        message: ProtocolMessage,
    ) -> ConnectionResult<Option<ProtocolMessage>> {
        match self.phase {
            ConnectionPhase::Signaling => Ok(Some(message)),
            ConnectionPhase::Terminated => Ok(None),
            _ => self.inbound.push(message).map(|()| None),
        }
    }

    /// Hold an outbound message until SIGNALING. Same contract as
    /// [`buffer_inbound`](Self::buffer_inbound).
    pub fn buffer_outbound(
        &mut self,
        message: ProtocolMessage,
    ) -> ConnectionResult<Option<ProtocolMessage>> {
        match self.phase {
            ConnectionPhase::Signaling => Ok(Some(message)),
            ConnectionPhase::Terminated => Ok(None),
            _ => self.outbound.push(message).map(|()| None),
        }
    }

    /// Move to TERMINATED. Returns `false` if already there.
    pub fn terminate(&mut self) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.phase = ConnectionPhase::Terminated;
        self.inbound.clear();
        self.outbound.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::{MatchHandle, MatchRequest};
    use crate::matchmaking::tests::ChannelListener;
    use crate::config::ApplicationConfiguration;
    use crate::store::{MatchStatus, MemoryMatchStore, MultiMatch, Profile, Session};
    use std::sync::Arc;

    fn limits(cap: usize) -> LimitsConfig {
        LimitsConfig {
            handshake_inbound: cap,
            handshake_outbound: cap,
            ..LimitsConfig::default()
        }
    }

    fn auth() -> AuthRecord {
        AuthRecord {
            profile: Profile {
                id: "p1".into(),
                user_id: "u1".into(),
            },
            session: Session {
                key: "k".into(),
                user_id: "u1".into(),
                expires_at: 0,
            },
        }
    }

    fn record() -> MultiMatchRecord {
        let configuration = Arc::new(ApplicationConfiguration {
            name: "duel".into(),
            algorithm: None,
            max_players: 2,
        });
        let (listener, _rx) = ChannelListener::pair();
        let handle = MatchHandle::new(
            MatchRequest {
                profile_id: "p1".into(),
                configuration: configuration.clone(),
            },
            Arc::new(MemoryMatchStore::new()),
            listener,
            None,
        );
        MultiMatchRecord {
            record: MultiMatch {
                id: "m1".into(),
                configuration: "duel".into(),
                status: MatchStatus::Open,
                max_players: 2,
                created_at: 0,
            },
            configuration,
            handle,
        }
    }

    fn hello(n: usize) -> ProtocolMessage {
        ProtocolMessage::connect(format!("peer{n}"))
    }

    fn in_handshake(cap: usize) -> ConnectionState {
        let mut state = ConnectionState::new(&limits(cap));
        state.start().unwrap();
        state.handshake().unwrap();
        state
    }

    #[test]
    fn auth_then_match_enters_signaling() {
        let mut state = in_handshake(8);
        assert!(state.authenticated(auth()).unwrap().is_none());
        assert_eq!(state.phase(), ConnectionPhase::Handshake);
        assert!(state.matched(record()).unwrap().is_some());
        assert_eq!(state.phase(), ConnectionPhase::Signaling);
    }

    #[test]
    fn match_then_auth_enters_signaling() {
        let mut state = in_handshake(8);
        assert!(state.matched(record()).unwrap().is_none());
        assert!(state.authenticated(auth()).unwrap().is_some());
        assert_eq!(state.phase(), ConnectionPhase::Signaling);
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let mut state = in_handshake(8);
        for n in 0..3 {
            assert!(state.buffer_inbound(hello(n)).unwrap().is_none());
        }
        state.buffer_outbound(hello(9)).unwrap();
        state.authenticated(auth()).unwrap();
        let drained = state.matched(record()).unwrap().unwrap();
        assert_eq!(drained.inbound, vec![hello(0), hello(1), hello(2)]);
        assert_eq!(drained.outbound, vec![hello(9)]);
        assert_eq!(state.backlog_len(), (0, 0));

        // Pass-through from now on.
        assert_eq!(state.buffer_inbound(hello(3)).unwrap(), Some(hello(3)));
        assert_eq!(state.backlog_len(), (0, 0));
    }

    #[test]
    fn inbound_overflow_is_fatal() {
        let mut state = in_handshake(2);
        state.buffer_inbound(hello(0)).unwrap();
        state.buffer_inbound(hello(1)).unwrap();
        assert_eq!(
            state.buffer_inbound(hello(2)).unwrap_err(),
            ConnectionError::BufferOverrun("inbound handshake backlog")
        );
    }

    #[test]
    fn transitions_out_of_order_are_violations() {
        let mut state = ConnectionState::new(&limits(8));
        assert!(matches!(state.handshake(), Err(ConnectionError::ProtocolState(_))));
        state.start().unwrap();
        assert!(matches!(state.start(), Err(ConnectionError::ProtocolState(_))));
        assert!(matches!(
            state.authenticated(auth()),
            Err(ConnectionError::ProtocolState(_))
        ));
        state.handshake().unwrap();
        state.authenticated(auth()).unwrap();
        assert!(matches!(
            state.authenticated(auth()),
            Err(ConnectionError::ProtocolState(_))
        ));
    }

    #[test]
    fn terminated_is_absorbing() {
        let mut state = in_handshake(8);
        state.buffer_inbound(hello(0)).unwrap();
        assert!(state.terminate());
        assert!(!state.terminate());
        assert_eq!(state.backlog_len(), (0, 0));

        state.start().unwrap();
        state.handshake().unwrap();
        assert!(state.authenticated(auth()).unwrap().is_none());
        assert!(state.matched(record()).unwrap().is_none());
        assert_eq!(state.buffer_inbound(hello(1)).unwrap(), None);
        assert_eq!(state.phase(), ConnectionPhase::Terminated);
    }

    #[test]
    fn phases_are_ordered() {
        assert!(ConnectionPhase::Waiting < ConnectionPhase::Ready);
        assert!(ConnectionPhase::Handshake < ConnectionPhase::Signaling);
        assert!(ConnectionPhase::Signaling < ConnectionPhase::Terminated);
    }
}
