//! Message type tags and their fixed categories.

use std::fmt;

use crate::version::Version;

/// Dispatch category of a message type.
///
/// The category decides which connection phase may process a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Authentication and match finding; begins the handshake.
    Handshake,
    /// Broadcast signals fanned out to every other match participant.
    Signaling,
    /// Signals addressed to exactly one recipient.
    SignalingDirect,
    /// Match lifecycle control (open, close, end, leave).
    Control,
    /// Server-to-client error reports.
    Error,
}

impl Category {
    /// Whether messages of this category are signals with an originator.
    #[inline]
    pub fn is_signal(self) -> bool {
        matches!(self, Category::Signaling | Category::SignalingDirect)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Handshake => "HANDSHAKE",
            Category::Signaling => "SIGNALING",
            Category::SignalingDirect => "SIGNALING_DIRECT",
            Category::Control => "CONTROL",
            Category::Error => "ERROR",
        })
    }
}

/// The `type` tag of a [`ProtocolMessage`](crate::ProtocolMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Find,
    Join,
    Matched,
    Host,
    Connect,
    Disconnect,
    StringBroadcast,
    BinaryBroadcast,
    SdpOffer,
    SdpAnswer,
    Candidate,
    StringRelay,
    BinaryRelay,
    Open,
    Close,
    End,
    Leave,
    Error,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 18] = [
        MessageType::Find,
        MessageType::Join,
        MessageType::Matched,
        MessageType::Host,
        MessageType::Connect,
        MessageType::Disconnect,
        MessageType::StringBroadcast,
        MessageType::BinaryBroadcast,
        MessageType::SdpOffer,
        MessageType::SdpAnswer,
        MessageType::Candidate,
        MessageType::StringRelay,
        MessageType::BinaryRelay,
        MessageType::Open,
        MessageType::Close,
        MessageType::End,
        MessageType::Leave,
        MessageType::Error,
    ];

    /// Fixed category of this type.
    pub fn category(self) -> Category {
        match self {
            Self::Find | Self::Join | Self::Matched => Category::Handshake,
            Self::Host
            | Self::Connect
            | Self::Disconnect
            | Self::StringBroadcast
            | Self::BinaryBroadcast => Category::Signaling,
            Self::SdpOffer
            | Self::SdpAnswer
            | Self::Candidate
            | Self::StringRelay
            | Self::BinaryRelay => Category::SignalingDirect,
            Self::Open | Self::Close | Self::End | Self::Leave => Category::Control,
            Self::Error => Category::Error,
        }
    }

    /// Lowest protocol version that defines this type.
    pub fn min_version(self) -> Version {
        match self {
            Self::BinaryBroadcast | Self::BinaryRelay => Version::V1_1,
            _ => Version::V1_0,
        }
    }

    /// Types only the server may emit. A client sending one is misbehaving.
    pub fn is_server_only(self) -> bool {
        matches!(
            self,
            Self::Matched | Self::Host | Self::Connect | Self::Disconnect | Self::Error
        )
    }

    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Find => "FIND",
            Self::Join => "JOIN",
            Self::Matched => "MATCHED",
            Self::Host => "HOST",
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::StringBroadcast => "STRING_BROADCAST",
            Self::BinaryBroadcast => "BINARY_BROADCAST",
            Self::SdpOffer => "SDP_OFFER",
            Self::SdpAnswer => "SDP_ANSWER",
            Self::Candidate => "CANDIDATE",
            Self::StringRelay => "STRING_RELAY",
            Self::BinaryRelay => "BINARY_RELAY",
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::End => "END",
            Self::Leave => "LEAVE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
