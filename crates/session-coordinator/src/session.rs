//! Session data model.

use chrono::{DateTime, Utc};
use common::token_client::Credential;
use common::types::{ChannelId, ParticipantId};
use std::fmt;

/// Lifecycle state of the meeting session.
///
/// ```text
/// Idle -> Acquiring -> Connecting -> Connected -> Leaving -> Idle
///            |             |             |
///            +-------------+-------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Waiting for the join credential.
    Acquiring,
    /// Opening the transport connection.
    Connecting,
    Connected,
    /// Tearing down; transient.
    Leaving,
    /// Ended by an unrecoverable error; see `SessionView::failure`.
    Failed,
}

impl SessionState {
    /// Returns the state as a string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Leaving => "leaving",
            SessionState::Failed => "failed",
        }
    }

    /// Whether a new join may start from this state.
    #[must_use]
    pub const fn accepts_join(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Failed)
    }

    /// Whether a session is joining or joined, so leaving has something to
    /// tear down.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Connecting | SessionState::Connected
        )
    }

    /// Whether local media controls apply in this state.
    #[must_use]
    pub const fn accepts_media_controls(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One active meeting. Created on join, destroyed on leave or failure.
#[derive(Debug, Clone)]
pub struct Session {
    pub channel_id: ChannelId,
    pub local_participant_id: ParticipantId,
    /// Present once the token endpoint has answered.
    pub credential: Option<Credential>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for the given channel and local identity.
    #[must_use]
    pub fn new(channel_id: ChannelId, local_participant_id: ParticipantId) -> Self {
        Self {
            channel_id,
            local_participant_id,
            credential: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_join_gating() {
        assert!(SessionState::Idle.accepts_join());
        assert!(SessionState::Failed.accepts_join());
        assert!(!SessionState::Acquiring.accepts_join());
        assert!(!SessionState::Connecting.accepts_join());
        assert!(!SessionState::Connected.accepts_join());
        assert!(!SessionState::Leaving.accepts_join());
    }

    #[test]
    fn test_media_control_gating() {
        assert!(SessionState::Connecting.accepts_media_controls());
        assert!(SessionState::Connected.accepts_media_controls());
        assert!(!SessionState::Idle.accepts_media_controls());
        assert!(!SessionState::Failed.accepts_media_controls());
        assert!(!SessionState::Acquiring.accepts_media_controls());
    }

    #[test]
    fn test_active_states() {
        assert!(SessionState::Acquiring.is_active());
        assert!(SessionState::Connecting.is_active());
        assert!(SessionState::Connected.is_active());
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Leaving.is_active());
        assert!(!SessionState::Failed.is_active());
    }

    #[test]
    fn test_new_session_has_no_credential() {
        let session = Session::new(
            ChannelId::new("room1").unwrap(),
            ParticipantId::new("u1").unwrap(),
        );
        assert!(session.credential.is_none());
        assert_eq!(session.channel_id.as_str(), "room1");
    }
}
