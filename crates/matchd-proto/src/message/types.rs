//! Payload structs carried by each [`ProtocolMessage`](super::ProtocolMessage) variant.

use serde::{Deserialize, Serialize};

use crate::signal::Lifecycle;
use crate::status::ErrorCode;
use crate::version::Version;

/// FIND: authenticate and enter matchmaking for an application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindRequest {
    pub version: Version,
    pub profile_id: String,
    pub session_key: String,
    /// Name of the matchmaking application configuration.
    pub configuration: String,
}

/// JOIN: authenticate and attach to a match the profile already belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub version: Version,
    pub profile_id: String,
    pub session_key: String,
    pub match_id: String,
}

/// MATCHED: the connection is bound to a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedResponse {
    pub profile_id: String,
    pub match_id: String,
    pub configuration: String,
}

/// HOST, CONNECT and DISCONNECT: a server-originated notice about one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSignal {
    pub profile_id: String,
}

/// STRING_BROADCAST: application text sent to every other participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringBroadcast {
    pub profile_id: String,
    pub payload: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// BINARY_BROADCAST: application bytes sent to every other participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryBroadcast {
    pub profile_id: String,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// SDP_OFFER and SDP_ANSWER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpSignal {
    pub profile_id: String,
    pub recipient_profile_id: String,
    pub peer_sdp: String,
}

/// CANDIDATE: one trickled ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSignal {
    pub profile_id: String,
    pub recipient_profile_id: String,
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_line_index: Option<u32>,
}

/// STRING_RELAY: application text for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringRelay {
    pub profile_id: String,
    pub recipient_profile_id: String,
    pub payload: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// BINARY_RELAY: application bytes for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryRelay {
    pub profile_id: String,
    pub recipient_profile_id: String,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// OPEN, CLOSE, END and LEAVE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub profile_id: String,
}

/// ERROR: sent best-effort before the server closes a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

/// Binary payloads travel as standard base64 strings.
mod base64_payload {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
