//! Schema constraints beyond what serde enforces.

use super::ProtocolMessage;
use crate::error::{ProtocolError, Result};

/// Maximum length of profile ids, match ids and session keys.
pub const MAX_ID_LEN: usize = 256;

fn check_id(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProtocolError::invalid(field, "must not be empty"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(ProtocolError::invalid(
            field,
            format!("longer than {MAX_ID_LEN} characters"),
        ));
    }
    Ok(())
}

fn check_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProtocolError::invalid(field, "must not be empty"));
    }
    Ok(())
}

impl ProtocolMessage {
    /// Check field constraints. Called by [`crate::codec::decode`] on every
    /// inbound frame.
    pub fn validate(&self) -> Result<()> {
        if let Some(profile_id) = self.profile_id() {
            check_id("profileId", profile_id)?;
        }
        if let Some(recipient) = self.recipient_profile_id() {
            check_id("recipientProfileId", recipient)?;
        }

        match self {
            ProtocolMessage::Find(m) => {
                check_id("sessionKey", &m.session_key)?;
                check_non_empty("configuration", &m.configuration)
            }
            ProtocolMessage::Join(m) => {
                check_id("sessionKey", &m.session_key)?;
                check_id("matchId", &m.match_id)
            }
            ProtocolMessage::Matched(m) => check_id("matchId", &m.match_id),
            ProtocolMessage::SdpOffer(m) | ProtocolMessage::SdpAnswer(m) => {
                check_non_empty("peerSdp", &m.peer_sdp)
            }
            ProtocolMessage::Candidate(m) => check_non_empty("candidate", &m.candidate),
            _ => Ok(()),
        }
    }
}
