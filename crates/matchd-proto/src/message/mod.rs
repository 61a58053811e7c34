//! The [`ProtocolMessage`] sum type.
//!
//! Every frame on the wire is one JSON object whose `type` field selects the
//! variant. Each variant carries a payload struct from [`types`].

mod kind;
mod types;
mod validate;

pub use kind::{Category, MessageType};
pub use types::{
    BinaryBroadcast, BinaryRelay, CandidateSignal, ControlRequest, FindRequest, JoinRequest,
    MatchedResponse, PeerSignal, SdpSignal, StandardProtocolError, StringBroadcast, StringRelay,
};
pub use validate::MAX_ID_LEN;

use serde::{Deserialize, Serialize};

use crate::status::ErrorCode;
use crate::version::Version;

/// A single protocol message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolMessage {
    Find(FindRequest),
    Join(JoinRequest),
    Matched(MatchedResponse),
    Host(PeerSignal),
    Connect(PeerSignal),
    Disconnect(PeerSignal),
    StringBroadcast(StringBroadcast),
    BinaryBroadcast(BinaryBroadcast),
    SdpOffer(SdpSignal),
    SdpAnswer(SdpSignal),
    Candidate(CandidateSignal),
    StringRelay(StringRelay),
    BinaryRelay(BinaryRelay),
    Open(ControlRequest),
    Close(ControlRequest),
    End(ControlRequest),
    Leave(ControlRequest),
    Error(StandardProtocolError),
}

impl ProtocolMessage {
    /// The `type` tag of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Find(_) => MessageType::Find,
            Self::Join(_) => MessageType::Join,
            Self::Matched(_) => MessageType::Matched,
            Self::Host(_) => MessageType::Host,
            Self::Connect(_) => MessageType::Connect,
            Self::Disconnect(_) => MessageType::Disconnect,
            Self::StringBroadcast(_) => MessageType::StringBroadcast,
            Self::BinaryBroadcast(_) => MessageType::BinaryBroadcast,
            Self::SdpOffer(_) => MessageType::SdpOffer,
            Self::SdpAnswer(_) => MessageType::SdpAnswer,
            Self::Candidate(_) => MessageType::Candidate,
            Self::StringRelay(_) => MessageType::StringRelay,
            Self::BinaryRelay(_) => MessageType::BinaryRelay,
            Self::Open(_) => MessageType::Open,
            Self::Close(_) => MessageType::Close,
            Self::End(_) => MessageType::End,
            Self::Leave(_) => MessageType::Leave,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Shorthand for `self.message_type().category()`.
    #[inline]
    pub fn category(&self) -> Category {
        self.message_type().category()
    }

    /// The profile this message claims to come from (or, for server notices,
    /// the profile it is about). `None` only for ERROR.
    pub fn profile_id(&self) -> Option<&str> {
        Some(match self {
            Self::Find(m) => &m.profile_id,
            Self::Join(m) => &m.profile_id,
            Self::Matched(m) => &m.profile_id,
            Self::Host(m) | Self::Connect(m) | Self::Disconnect(m) => &m.profile_id,
            Self::StringBroadcast(m) => &m.profile_id,
            Self::BinaryBroadcast(m) => &m.profile_id,
            Self::SdpOffer(m) | Self::SdpAnswer(m) => &m.profile_id,
            Self::Candidate(m) => &m.profile_id,
            Self::StringRelay(m) => &m.profile_id,
            Self::BinaryRelay(m) => &m.profile_id,
            Self::Open(m) | Self::Close(m) | Self::End(m) | Self::Leave(m) => &m.profile_id,
            Self::Error(_) => return None,
        })
    }

    /// Recipient of a direct signal.
    pub fn recipient_profile_id(&self) -> Option<&str> {
        match self {
            Self::SdpOffer(m) | Self::SdpAnswer(m) => Some(&m.recipient_profile_id),
            Self::Candidate(m) => Some(&m.recipient_profile_id),
            Self::StringRelay(m) => Some(&m.recipient_profile_id),
            Self::BinaryRelay(m) => Some(&m.recipient_profile_id),
            _ => None,
        }
    }

    /// Protocol version requested by a handshake message.
    pub fn requested_version(&self) -> Option<Version> {
        match self {
            Self::Find(m) => Some(m.version),
            Self::Join(m) => Some(m.version),
            _ => None,
        }
    }

    /// Build a MATCHED response.
    pub fn matched(
        profile_id: impl Into<String>,
        match_id: impl Into<String>,
        configuration: impl Into<String>,
    ) -> Self {
        Self::Matched(MatchedResponse {
            profile_id: profile_id.into(),
            match_id: match_id.into(),
            configuration: configuration.into(),
        })
    }

    /// Build a HOST notice naming `profile_id`.
    pub fn host(profile_id: impl Into<String>) -> Self {
        Self::Host(PeerSignal {
            profile_id: profile_id.into(),
        })
    }

    /// Build a CONNECT notice for `profile_id`.
    pub fn connect(profile_id: impl Into<String>) -> Self {
        Self::Connect(PeerSignal {
            profile_id: profile_id.into(),
        })
    }

    /// Build a DISCONNECT notice for `profile_id`.
    pub fn disconnect(profile_id: impl Into<String>) -> Self {
        Self::Disconnect(PeerSignal {
            profile_id: profile_id.into(),
        })
    }

    /// Build an ERROR message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(StandardProtocolError {
            code,
            message: message.into(),
        })
    }
}

impl From<StandardProtocolError> for ProtocolMessage {
    fn from(value: StandardProtocolError) -> Self {
        Self::Error(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Lifecycle;

    #[test]
    fn type_tag_matches_variant() {
        let msg = ProtocolMessage::host("p1");
        assert_eq!(msg.message_type(), MessageType::Host);
        assert_eq!(msg.category(), Category::Signaling);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], MessageType::Host.as_str());
    }

    #[test]
    fn every_type_tag_serializes_to_its_wire_name() {
        let relay = ProtocolMessage::StringRelay(StringRelay {
            profile_id: "a".into(),
            recipient_profile_id: "b".into(),
            payload: "hi".into(),
            lifecycle: Lifecycle::Once,
        });
        let json = serde_json::to_value(&relay).unwrap();
        assert_eq!(json["type"], "STRING_RELAY");
        assert_eq!(json["recipientProfileId"], "b");
        assert_eq!(json["lifecycle"], "ONCE");
    }

    #[test]
    fn recipient_only_on_direct_signals() {
        let offer = ProtocolMessage::SdpOffer(SdpSignal {
            profile_id: "a".into(),
            recipient_profile_id: "b".into(),
            peer_sdp: "v=0".into(),
        });
        assert_eq!(offer.recipient_profile_id(), Some("b"));
        assert_eq!(ProtocolMessage::connect("a").recipient_profile_id(), None);
    }

    #[test]
    fn error_has_no_profile() {
        let err = ProtocolMessage::error(ErrorCode::Timeout, "slow");
        assert_eq!(err.profile_id(), None);
        assert_eq!(err.category(), Category::Error);
    }
}
