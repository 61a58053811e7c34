//! Close codes and client-visible error codes.

use serde::{Deserialize, Serialize};

/// WebSocket close codes used by the server.
///
/// Values follow RFC 6455 §7.4.1 and the IANA registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Explicit client leave or server shutdown.
    NormalClosure,
    /// Ping or handshake deadline exceeded.
    GoingAway,
    /// Schema validation failure.
    NotConsistent,
    /// Protocol state, unexpected message, buffer overrun or authorization failure.
    ViolatedPolicy,
    /// Anything the server did not anticipate.
    UnexpectedCondition,
    /// Server overloaded.
    TryAgainLater,
}

impl CloseCode {
    /// Numeric close code.
    pub fn code(self) -> u16 {
        match self {
            CloseCode::NormalClosure => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::NotConsistent => 1007,
            CloseCode::ViolatedPolicy => 1008,
            CloseCode::UnexpectedCondition => 1011,
            CloseCode::TryAgainLater => 1013,
        }
    }

    /// Inverse of [`CloseCode::code`].
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1000 => CloseCode::NormalClosure,
            1001 => CloseCode::GoingAway,
            1007 => CloseCode::NotConsistent,
            1008 => CloseCode::ViolatedPolicy,
            1011 => CloseCode::UnexpectedCondition,
            1013 => CloseCode::TryAgainLater,
            _ => return None,
        })
    }
}

/// Error code carried by an ERROR message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProtocolState,
    UnexpectedMessage,
    BufferOverrun,
    DuplicateConnection,
    MatchDeleted,
    Forbidden,
    Unauthorized,
    Timeout,
    Invalid,
    Overloaded,
    Unknown,
}

impl ErrorCode {
    /// Wire name, also used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ProtocolState => "PROTOCOL_STATE",
            ErrorCode::UnexpectedMessage => "UNEXPECTED_MESSAGE",
            ErrorCode::BufferOverrun => "BUFFER_OVERRUN",
            ErrorCode::DuplicateConnection => "DUPLICATE_CONNECTION",
            ErrorCode::MatchDeleted => "MATCH_DELETED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Invalid => "INVALID",
            ErrorCode::Overloaded => "OVERLOADED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_round_trip_through_numbers() {
        for code in [
            CloseCode::NormalClosure,
            CloseCode::GoingAway,
            CloseCode::NotConsistent,
            CloseCode::ViolatedPolicy,
            CloseCode::UnexpectedCondition,
            CloseCode::TryAgainLater,
        ] {
            assert_eq!(CloseCode::from_code(code.code()), Some(code));
        }
        assert_eq!(CloseCode::from_code(4000), None);
    }

    #[test]
    fn error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::DuplicateConnection).unwrap();
        assert_eq!(json, "\"DUPLICATE_CONNECTION\"");
        assert_eq!(ErrorCode::DuplicateConnection.as_str(), "DUPLICATE_CONNECTION");
    }
}
