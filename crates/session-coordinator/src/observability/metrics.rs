//! Metric definitions.
//!
//! All metrics use the `session_` prefix; counters end in `_total`.
//!
//! # Cardinality
//!
//! - `outcome`: connected, failed, cancelled, rejected
//! - `to`: 6 session states
//! - `event`: 5 transport event kinds
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Record the result of a join request.
///
/// Metric: `session_join_total`
/// Labels: `outcome`
pub fn record_join(outcome: &'static str) {
    counter!("session_join_total", "outcome" => outcome).increment(1);
}

/// Record how long a successful join took.
///
/// Metric: `session_join_duration_seconds`
pub fn record_join_duration(duration: Duration) {
    histogram!("session_join_duration_seconds").record(duration.as_secs_f64());
}

/// Record a state machine transition.
///
/// Metric: `session_state_transitions_total`
/// Labels: `to`
pub fn record_state_transition(to: &'static str) {
    counter!("session_state_transitions_total", "to" => to).increment(1);
}

// ============================================================================
// Roster & Transport
// ============================================================================

/// Set the number of listed remote participants.
///
/// Metric: `session_roster_size`
pub fn set_roster_size(size: usize) {
    // usize to f64 conversion is safe for realistic roster sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("session_roster_size").set(size as f64);
}

/// Record a handled transport event.
///
/// Metric: `session_transport_events_total`
/// Labels: `event`
pub fn record_transport_event(event: &'static str) {
    counter!("session_transport_events_total", "event" => event).increment(1);
}

// ============================================================================
// Chat
// ============================================================================

/// Record a chat append.
///
/// Metric: `session_chat_appends_total`
/// Labels: `status` (success, error)
pub fn record_chat_append(status: &'static str) {
    counter!("session_chat_appends_total", "status" => status).increment(1);
}
