//! Prometheus metrics collection for matchd.
//!
//! Metrics live in a process-wide registry and are exposed over HTTP by
//! [`crate::http`]. Recording helpers are no-ops until [`init`] has run, so
//! library users and tests that never call it pay nothing.
//!
//! - `matchd_connections_total` / `matchd_connections_closed_total{reason}`
//! - `matchd_connection_errors_total{code}` - terminal errors by error code
//! - `matchd_signals_total{outcome}` - delivered, retained or dropped
//! - `matchd_signal_fanout` - recipients per broadcast (histogram)
//! - `matchd_handshake_duration_seconds{outcome}` - connect to signaling

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Connections accepted by the gateway.
pub static CONNECTIONS_ACCEPTED: OnceLock<IntCounter> = OnceLock::new();

/// Connections closed, by close reason.
pub static CONNECTIONS_CLOSED: OnceLock<IntCounterVec> = OnceLock::new();

/// Terminal connection errors by error code.
pub static CONNECTION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Signals handled by mailboxes, by outcome.
pub static SIGNALS: OnceLock<IntCounterVec> = OnceLock::new();

/// Matches created, by application configuration.
pub static MATCHES_CREATED: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently open connections.
pub static ACTIVE_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Matches with live signaling state.
pub static SIGNALING_MATCHES: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Recipients per broadcast signal.
pub static SIGNAL_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Time from connect until signaling (or failure).
pub static HANDSHAKE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(CONNECTIONS_ACCEPTED, IntCounter::new("matchd_connections_total", "Connections accepted"));
    register!(CONNECTIONS_CLOSED, IntCounterVec::new(Opts::new("matchd_connections_closed_total", "Connections closed by reason"), &["reason"]));
    register!(CONNECTION_ERRORS, IntCounterVec::new(Opts::new("matchd_connection_errors_total", "Terminal connection errors by code"), &["code"]));
    register!(SIGNALS, IntCounterVec::new(Opts::new("matchd_signals_total", "Signals handled by mailboxes"), &["outcome"]));
    register!(MATCHES_CREATED, IntCounterVec::new(Opts::new("matchd_matches_created_total", "Matches created by configuration"), &["configuration"]));
    register!(ACTIVE_CONNECTIONS, IntGauge::new("matchd_active_connections", "Currently open connections"));
    register!(SIGNALING_MATCHES, IntGauge::new("matchd_signaling_matches", "Matches with live signaling state"));
    register!(SIGNAL_FANOUT, Histogram::with_opts(
        HistogramOpts::new("matchd_signal_fanout", "Recipients per broadcast signal")
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 8.0, 16.0, 32.0, 64.0])));
    register!(HANDSHAKE_DURATION, HistogramVec::new(
        HistogramOpts::new("matchd_handshake_duration_seconds", "Time from connect to signaling")
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        &["outcome"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Outcome of handing a signal to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    Retained,
    Dropped,
}

impl SignalOutcome {
    fn label(self) -> &'static str {
        match self {
            SignalOutcome::Delivered => "delivered",
            SignalOutcome::Retained => "retained",
            SignalOutcome::Dropped => "dropped",
        }
    }
}

#[inline]
pub fn record_connection_opened() {
    if let Some(c) = CONNECTIONS_ACCEPTED.get() {
        c.inc();
    }
    if let Some(g) = ACTIVE_CONNECTIONS.get() {
        g.inc();
    }
}

/// Record a connection teardown. `reason` is the terminating error's code.
#[inline]
pub fn record_connection_closed(reason: &str) {
    if let Some(c) = CONNECTIONS_CLOSED.get() {
        c.with_label_values(&[reason]).inc();
    }
    if let Some(g) = ACTIVE_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn record_connection_error(code: &str) {
    if let Some(c) = CONNECTION_ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn record_signal(outcome: SignalOutcome) {
    if let Some(c) = SIGNALS.get() {
        c.with_label_values(&[outcome.label()]).inc();
    }
}

/// Record how many mailboxes one broadcast was fanned out to.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = SIGNAL_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn record_match_created(configuration: &str) {
    if let Some(c) = MATCHES_CREATED.get() {
        c.with_label_values(&[configuration]).inc();
    }
}

#[inline]
pub fn set_signaling_matches(count: usize) {
    if let Some(g) = SIGNALING_MATCHES.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn record_handshake(outcome: &str, duration_secs: f64) {
    if let Some(h) = HANDSHAKE_DURATION.get() {
        h.with_label_values(&[outcome]).observe(duration_secs);
    }
}
