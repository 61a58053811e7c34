//! Network module.
//!
//! Contains the Gateway (WebSocket listener) and the per-connection task.

mod connection;
mod gateway;

pub use connection::{Connection, WsSession};
pub use gateway::Gateway;
