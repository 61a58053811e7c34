//! matchd - real-time matchmaking and WebRTC signaling server.
//!
//! Clients connect over WebSocket, authenticate, get placed into a match
//! (FIND) or re-enter one (JOIN), and then exchange signaling messages with
//! the other members through per-profile mailboxes.

pub mod bounded;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod matchmaking;
pub mod metrics;
pub mod network;
pub mod server;
pub mod signaling;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{ConnectionError, ConnectionResult};
pub use server::{Server, ServerHandle, Services};
