//! Wire protocol for the matchd matchmaking and signaling server.
//!
//! Clients and server exchange JSON objects over WebSocket text frames. The
//! `type` field selects a [`ProtocolMessage`] variant; every variant has a
//! fixed [`Category`] and a minimum [`Version`].
//!
//! ```
//! use matchd_proto::{codec, Category, ProtocolMessage};
//!
//! let msg = codec::decode(r#"{"type":"HOST","profileId":"alice"}"#).unwrap();
//! assert_eq!(msg.category(), Category::Signaling);
//! assert_eq!(msg, ProtocolMessage::host("alice"));
//! ```

#![deny(clippy::all)]
#![warn(missing_debug_implementations)]

pub mod codec;
pub mod error;
pub mod message;
pub mod signal;
pub mod status;
pub mod version;

pub use self::error::{ProtocolError, Result};
pub use self::message::{
    BinaryBroadcast, BinaryRelay, CandidateSignal, Category, ControlRequest, FindRequest,
    JoinRequest, MatchedResponse, MessageType, PeerSignal, ProtocolMessage, SdpSignal,
    StandardProtocolError, StringBroadcast, StringRelay, MAX_ID_LEN,
};
pub use self::signal::{lifecycle_of, Lifecycle, Signal};
pub use self::status::{CloseCode, ErrorCode};
pub use self::version::Version;
