//! Error types for the wire protocol library.
//!
//! Decoding and schema validation failures surface as [`ProtocolError`].

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The frame was not a JSON object matching any known message schema.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field violated a schema constraint.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// Human-readable constraint description.
        reason: String,
    },

    /// The message is not a signal (no originator/lifecycle applies).
    #[error("{0} is not a signaling message")]
    NotASignal(crate::MessageType),

    /// Version string could not be parsed.
    #[error("invalid version `{0}`: expected major.minor")]
    InvalidVersion(String),
}

impl ProtocolError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_field_display_names_field() {
        let err = ProtocolError::invalid("profileId", "must not be empty");
        assert_eq!(err.to_string(), "invalid field `profileId`: must not be empty");
    }

    #[test]
    fn malformed_wraps_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(err.to_string().starts_with("malformed message"));
    }
}
