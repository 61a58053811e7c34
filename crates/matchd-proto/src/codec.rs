//! JSON text-frame codec.

use crate::error::Result;
use crate::message::ProtocolMessage;

/// Parse and validate one inbound frame.
pub fn decode(text: &str) -> Result<ProtocolMessage> {
    let message: ProtocolMessage = serde_json::from_str(text)?;
    message.validate()?;
    Ok(message)
}

/// Serialize one outbound frame.
pub fn encode(message: &ProtocolMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn decode_rejects_unknown_type() {
        let err = decode(r#"{"type":"TELEPORT","profileId":"a"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn decode_runs_validation() {
        let err = decode(r#"{"type":"LEAVE","profileId":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { .. }));
    }

    #[test]
    fn decode_accepts_leave() {
        let msg = decode(r#"{"type":"LEAVE","profileId":"p1"}"#).unwrap();
        assert_eq!(msg.profile_id(), Some("p1"));
    }
}
