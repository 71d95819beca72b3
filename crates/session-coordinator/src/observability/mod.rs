//! Observability for the session coordinator.
//!
//! The crate only emits through the `metrics` and `tracing` facades; the
//! embedding application installs whatever recorder and subscriber it wants.
//! Log fields never carry credentials or message text.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `session_join_total` | Counter | `outcome` | Join attempts by result |
//! | `session_join_duration_seconds` | Histogram | none | Time from join request to `Connected` |
//! | `session_state_transitions_total` | Counter | `to` | Coordinator state changes |
//! | `session_roster_size` | Gauge | none | Listed remote participants |
//! | `session_transport_events_total` | Counter | `event` | Transport events handled |
//! | `session_chat_appends_total` | Counter | `status` | Chat appends by result |

pub mod metrics;
