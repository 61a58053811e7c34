//! Telemetry utilities for handshake timing and standard spans.

use std::time::Instant;

/// Guard timing a connection's handshake.
///
/// Records the duration under the outcome passed to [`finish`](Self::finish),
/// or as `abandoned` if dropped first.
#[derive(Debug)]
pub struct HandshakeTimer {
    start: Instant,
    outcome: Option<&'static str>,
}

impl HandshakeTimer {
    /// Start timing a handshake.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            outcome: None,
        }
    }

    /// Stop the timer with `outcome`.
    pub fn finish(mut self, outcome: &'static str) {
        self.outcome = Some(outcome);
    }
}

impl Drop for HandshakeTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_handshake(self.outcome.unwrap_or("abandoned"), duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use std::net::SocketAddr;

    use tracing::{Span, info_span};

    /// Create a span for a client connection.
    pub fn connection(id: u64, addr: SocketAddr) -> Span {
        info_span!("connection", id, addr = %addr)
    }

    /// Create a span for a profile's signaling within a match.
    pub fn signaling(match_id: &str, profile_id: &str) -> Span {
        info_span!("signaling", match_id = %match_id, profile = %profile_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_records_outcome() {
        crate::metrics::init();
        HandshakeTimer::start().finish("matched");
        drop(HandshakeTimer::start());
        let output = crate::metrics::gather_metrics();
        assert!(output.contains("outcome=\"matched\""));
        assert!(output.contains("outcome=\"abandoned\""));
    }
}
