//! Signals and their retention lifecycle.
//!
//! A [`Signal`] is a validated view of a SIGNALING or SIGNALING_DIRECT
//! message. Its [`Lifecycle`] decides how long a mailbox keeps it around for
//! subscribers that attach later.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::ProtocolMessage;

/// Retention class of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    /// Delivered only to a subscriber attached right now. Never retained.
    #[default]
    Once,
    /// Retained until the recipient's current session ends.
    Session,
    /// Retained for the life of the match and replayed to every subscriber.
    Match,
}

impl Lifecycle {
    /// Whether signals of this class go into a backlog.
    #[inline]
    pub fn is_retained(self) -> bool {
        !matches!(self, Lifecycle::Once)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Once => "ONCE",
            Lifecycle::Session => "SESSION",
            Lifecycle::Match => "MATCH",
        })
    }
}

/// Classify a message into its retention class.
///
/// Returns `None` for messages that are not signals.
pub fn lifecycle_of(message: &ProtocolMessage) -> Option<Lifecycle> {
    match message {
        ProtocolMessage::Host(_)
        | ProtocolMessage::Connect(_)
        | ProtocolMessage::Disconnect(_)
        | ProtocolMessage::SdpOffer(_)
        | ProtocolMessage::SdpAnswer(_)
        | ProtocolMessage::Candidate(_) => Some(Lifecycle::Session),
        ProtocolMessage::StringBroadcast(m) => Some(m.lifecycle),
        ProtocolMessage::BinaryBroadcast(m) => Some(m.lifecycle),
        ProtocolMessage::StringRelay(m) => Some(m.lifecycle),
        ProtocolMessage::BinaryRelay(m) => Some(m.lifecycle),
        _ => None,
    }
}

/// A signaling message together with its lifecycle.
///
/// Cheap to clone; the message body is shared between every mailbox it is
/// fanned out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    message: Arc<ProtocolMessage>,
    lifecycle: Lifecycle,
}

impl Signal {
    /// Wrap a signaling message. Fails with [`ProtocolError::NotASignal`]
    /// for any other category.
    pub fn new(message: ProtocolMessage) -> Result<Self, ProtocolError> {
        let lifecycle =
            lifecycle_of(&message).ok_or(ProtocolError::NotASignal(message.message_type()))?;
        Ok(Self {
            message: Arc::new(message),
            lifecycle,
        })
    }

    /// HOST notice naming `profile_id`.
    pub fn host(profile_id: impl Into<String>) -> Self {
        Self::server(ProtocolMessage::host(profile_id))
    }

    /// CONNECT notice for `profile_id`.
    pub fn connect(profile_id: impl Into<String>) -> Self {
        Self::server(ProtocolMessage::connect(profile_id))
    }

    /// DISCONNECT notice for `profile_id`.
    pub fn disconnect(profile_id: impl Into<String>) -> Self {
        Self::server(ProtocolMessage::disconnect(profile_id))
    }

    fn server(message: ProtocolMessage) -> Self {
        Self {
            message: Arc::new(message),
            lifecycle: Lifecycle::Session,
        }
    }

    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[inline]
    pub fn message(&self) -> &ProtocolMessage {
        &self.message
    }

    /// Originating (or, for server notices, subject) profile.
    pub fn profile_id(&self) -> &str {
        // Every signaling variant carries a profile id.
        self.message.profile_id().unwrap_or_default()
    }

    /// Recipient, for direct signals.
    pub fn recipient_profile_id(&self) -> Option<&str> {
        self.message.recipient_profile_id()
    }

    /// Whether this signal is addressed to exactly one recipient.
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.recipient_profile_id().is_some()
    }
}

impl TryFrom<ProtocolMessage> for Signal {
    type Error = ProtocolError;

    fn try_from(value: ProtocolMessage) -> Result<Self, Self::Error> {
        Signal::new(value)
    }
}

impl AsRef<ProtocolMessage> for Signal {
    fn as_ref(&self) -> &ProtocolMessage {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ControlRequest, SdpSignal, StringBroadcast};

    #[test]
    fn server_notices_are_session_scoped() {
        assert_eq!(Signal::host("a").lifecycle(), Lifecycle::Session);
        assert_eq!(Signal::connect("a").lifecycle(), Lifecycle::Session);
        assert_eq!(Signal::disconnect("a").lifecycle(), Lifecycle::Session);
    }

    #[test]
    fn broadcast_carries_its_own_lifecycle() {
        let msg = ProtocolMessage::StringBroadcast(StringBroadcast {
            profile_id: "a".into(),
            payload: "state".into(),
            lifecycle: Lifecycle::Match,
        });
        let signal = Signal::new(msg).unwrap();
        assert_eq!(signal.lifecycle(), Lifecycle::Match);
        assert!(!signal.is_direct());
    }

    #[test]
    fn sdp_is_direct_and_session_scoped() {
        let msg = ProtocolMessage::SdpAnswer(SdpSignal {
            profile_id: "a".into(),
            recipient_profile_id: "b".into(),
            peer_sdp: "v=0".into(),
        });
        let signal = Signal::try_from(msg).unwrap();
        assert!(signal.is_direct());
        assert_eq!(signal.recipient_profile_id(), Some("b"));
        assert_eq!(signal.lifecycle(), Lifecycle::Session);
    }

    #[test]
    fn control_messages_are_not_signals() {
        let leave = ProtocolMessage::Leave(ControlRequest {
            profile_id: "a".into(),
        });
        assert!(matches!(
            Signal::new(leave),
            Err(ProtocolError::NotASignal(crate::MessageType::Leave))
        ));
    }

    #[test]
    fn once_is_not_retained() {
        assert!(!Lifecycle::Once.is_retained());
        assert!(Lifecycle::Session.is_retained());
        assert!(Lifecycle::Match.is_retained());
    }
}
