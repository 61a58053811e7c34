//! Buffer and queue capacity configuration.

use serde::Deserialize;

/// Buffer and queue capacities.
///
/// Every backlog a peer can grow is capped; exceeding a cap is fatal for the
/// connection that caused it.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Inbound messages held while the handshake is in progress (default: 64).
    #[serde(default = "default_handshake_inbound")]
    pub handshake_inbound: usize,
    /// Outbound messages held while the handshake is in progress (default: 64).
    #[serde(default = "default_handshake_outbound")]
    pub handshake_outbound: usize,
    /// Retained signals per mailbox, per lifecycle (default: 256).
    #[serde(default = "default_mailbox_backlog")]
    pub mailbox_backlog: usize,
    /// Signals queued between a mailbox and its connection (default: 256).
    #[serde(default = "default_signal_queue")]
    pub signal_queue: usize,
    /// Frames queued for the socket writer (default: 512).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            handshake_inbound: default_handshake_inbound(),
            handshake_outbound: default_handshake_outbound(),
            mailbox_backlog: default_mailbox_backlog(),
            signal_queue: default_signal_queue(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_handshake_inbound() -> usize {
    64
}

fn default_handshake_outbound() -> usize {
    64
}

fn default_mailbox_backlog() -> usize {
    256
}

fn default_signal_queue() -> usize {
    256
}

fn default_outbound_queue() -> usize {
    512
}
