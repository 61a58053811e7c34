//! Unified error handling for matchd.
//!
//! Every failure that ends a connection is a [`ConnectionError`]. Each variant
//! knows its WebSocket close code, whether it is an expected client-side
//! condition, a metrics label, and the ERROR payload the client sees.

use matchd_proto::{CloseCode, ErrorCode, ProtocolError, StandardProtocolError};
use thiserror::Error;

use crate::matchmaking::MatchmakingError;
use crate::store::StoreError;

// ============================================================================
// Connection Errors (terminal for one connection)
// ============================================================================

/// Errors that terminate a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Message arrived in a phase that forbids it.
    #[error("protocol state violation: {0}")]
    ProtocolState(String),

    /// Message type not valid for its category, phase or negotiated version.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// A bounded backlog or queue overflowed.
    #[error("message buffer overrun: {0}")]
    BufferOverrun(&'static str),

    /// Another connection subscribed to this connection's mailbox.
    #[error("duplicate connection for this profile")]
    DuplicateConnection,

    /// The match was removed upstream.
    #[error("match {0} was deleted")]
    MatchDeleted(String),

    /// Impersonation or access to a match the profile is not part of.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Session or profile could not be validated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Handshake or keepalive deadline exceeded.
    #[error("{0} timeout")]
    Timeout(&'static str),

    /// Frame failed schema validation.
    #[error("invalid message: {0}")]
    Validation(String),

    /// A collaborator is unavailable; the client may retry later.
    #[error("server overloaded")]
    Overloaded,

    /// Persistence collaborator failed.
    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Client sent LEAVE.
    #[error("client left the match")]
    Left,

    /// Transport closed by the peer.
    #[error("connection closed by peer")]
    Closed,

    /// Server is shutting down.
    #[error("server shutting down")]
    Shutdown,
}

impl ConnectionError {
    /// WebSocket close code sent when this error ends the connection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::ProtocolState(_)
            | Self::UnexpectedMessage(_)
            | Self::BufferOverrun(_)
            | Self::DuplicateConnection
            | Self::Forbidden(_)
            | Self::Unauthorized(_) => CloseCode::ViolatedPolicy,
            Self::Timeout(_) | Self::MatchDeleted(_) => CloseCode::GoingAway,
            Self::Validation(_) => CloseCode::NotConsistent,
            Self::Overloaded => CloseCode::TryAgainLater,
            Self::Store(_) | Self::Internal(_) => CloseCode::UnexpectedCondition,
            Self::Left | Self::Closed | Self::Shutdown => CloseCode::NormalClosure,
        }
    }

    /// Whether this is a routine end of a connection rather than a server fault.
    ///
    /// Expected conditions log at debug level.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            Self::BufferOverrun(_) | Self::Overloaded | Self::Store(_) | Self::Internal(_)
        )
    }

    /// Whether this condition points at a bug or a failing collaborator.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Internal(_))
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ProtocolState(_) => "protocol_state",
            Self::UnexpectedMessage(_) => "unexpected_message",
            Self::BufferOverrun(_) => "buffer_overrun",
            Self::DuplicateConnection => "duplicate_connection",
            Self::MatchDeleted(_) => "match_deleted",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::Timeout(_) => "timeout",
            Self::Validation(_) => "validation",
            Self::Overloaded => "overloaded",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
            Self::Left => "left",
            Self::Closed => "closed",
            Self::Shutdown => "shutdown",
        }
    }

    /// Convert to the ERROR message sent to the client before closing.
    ///
    /// Returns `None` for normal closures, which carry no ERROR.
    pub fn to_protocol_error(&self) -> Option<StandardProtocolError> {
        let code = match self {
            Self::ProtocolState(_) => ErrorCode::ProtocolState,
            Self::UnexpectedMessage(_) => ErrorCode::UnexpectedMessage,
            Self::BufferOverrun(_) => ErrorCode::BufferOverrun,
            Self::DuplicateConnection => ErrorCode::DuplicateConnection,
            Self::MatchDeleted(_) => ErrorCode::MatchDeleted,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Validation(_) => ErrorCode::Invalid,
            Self::Overloaded => ErrorCode::Overloaded,
            // Collaborator details stay in the server log.
            Self::Store(_) | Self::Internal(_) => {
                return Some(StandardProtocolError {
                    code: ErrorCode::Unknown,
                    message: "internal server error".to_string(),
                });
            }
            Self::Left | Self::Closed | Self::Shutdown => return None,
        };
        Some(StandardProtocolError {
            code,
            message: self.to_string(),
        })
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for ConnectionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidSession | StoreError::SessionExpired => {
                Self::Unauthorized(err.to_string())
            }
            StoreError::ProfileNotFound(_) | StoreError::ProfileNotOwned(_) => {
                Self::Unauthorized(err.to_string())
            }
            StoreError::MatchNotFound(_) => Self::Forbidden(err.to_string()),
            StoreError::Unavailable(_) => Self::Overloaded,
            StoreError::Conflict(_) => Self::Store(err.to_string()),
        }
    }
}

impl From<MatchmakingError> for ConnectionError {
    fn from(err: MatchmakingError) -> Self {
        match err {
            MatchmakingError::UnknownConfiguration(_) => Self::Validation(err.to_string()),
            MatchmakingError::UnknownAlgorithm(_) => Self::Internal(err.to_string()),
            MatchmakingError::InvalidState { .. } => Self::ProtocolState(err.to_string()),
            MatchmakingError::NotAMember { .. } => Self::Forbidden(err.to_string()),
            MatchmakingError::MatchEnded(_) => Self::Forbidden(err.to_string()),
            MatchmakingError::Cancelled => Self::Closed,
            MatchmakingError::Store(inner) => inner.into(),
        }
    }
}

/// Result type for connection-scoped operations.
pub type ConnectionResult<T = ()> = Result<T, ConnectionError>;
