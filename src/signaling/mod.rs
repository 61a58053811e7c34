//! Signal routing between the members of a match.
//!
//! - [`mailbox`]: one bounded, lifecycle-aware inbox per (match, profile)
//! - [`state`]: all mailboxes of one match plus its host assignment
//! - [`service`]: membership checks and per-match state lookup

pub mod mailbox;
pub mod service;
pub mod state;

pub use mailbox::{Mailbox, SignalSink, SubscriptionId};
pub use service::{MatchSignalingService, SignalingSubscription};
pub use state::MatchSignalingState;
