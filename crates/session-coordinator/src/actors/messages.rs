//! Message types for the session coordinator.
//!
//! Requests go through a `tokio::sync::mpsc` mailbox; replies come back on a
//! `tokio::sync::oneshot` carried in the message.

use crate::errors::{ErrorKind, SessionError};
use crate::layout::LayoutDescriptor;
use crate::media::LocalMediaState;
use crate::roster::RemoteParticipant;
use crate::session::SessionState;

use common::types::{ChannelId, ParticipantId};
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `SessionCoordinator`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Start a session. Replies once the session is `Connected` or the
    /// attempt has ended.
    Join {
        channel_id: ChannelId,
        identity: ParticipantId,
        options: JoinOptions,
        respond_to: oneshot::Sender<Result<JoinOutcome, SessionError>>,
    },

    /// End the session, or abandon the join in progress.
    Leave { respond_to: oneshot::Sender<()> },

    /// Flip or set a local device. `enabled: None` flips the current state.
    /// Replies `None` when the current state ignores media controls.
    SetCamera {
        enabled: Option<bool>,
        respond_to: oneshot::Sender<Result<Option<bool>, SessionError>>,
    },

    /// Microphone counterpart of `SetCamera`.
    SetMic {
        enabled: Option<bool>,
        respond_to: oneshot::Sender<Result<Option<bool>, SessionError>>,
    },

    /// Raise or lower the local hand. Replies `None` unless `Connected`.
    SetHandRaised {
        raised: bool,
        respond_to: oneshot::Sender<Option<bool>>,
    },

    /// Current snapshot of the session.
    GetState {
        respond_to: oneshot::Sender<SessionView>,
    },
}

/// Per-join overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Bound on token acquisition; `None` uses the configured default.
    pub token_timeout: Option<Duration>,
    /// Bound on transport connect; `None` uses the configured default.
    pub connect_timeout: Option<Duration>,
    /// Whether the camera starts enabled.
    pub camera_enabled: bool,
    /// Whether the microphone starts enabled.
    pub mic_enabled: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            token_timeout: None,
            connect_timeout: None,
            camera_enabled: true,
            mic_enabled: true,
        }
    }
}

impl JoinOptions {
    #[must_use]
    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_camera(mut self, enabled: bool) -> Self {
        self.camera_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_mic(mut self, enabled: bool) -> Self {
        self.mic_enabled = enabled;
        self
    }
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub channel_id: ChannelId,
    pub local_participant_id: ParticipantId,
    /// Local capture after acquisition; may be degraded.
    pub local_media: LocalMediaState,
}

/// Everything the presentation layer renders, republished after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub state: SessionState,
    /// Why the last session failed, while in `Failed`.
    pub failure: Option<ErrorKind>,
    pub channel_id: Option<ChannelId>,
    pub local_participant_id: Option<ParticipantId>,
    pub local_media: LocalMediaState,
    pub hand_raised: bool,
    /// Listed remote participants in join order.
    pub participants: Vec<RemoteParticipant>,
    pub layout: LayoutDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_options_defaults_and_builders() {
        let options = JoinOptions::default();
        assert!(options.camera_enabled && options.mic_enabled);
        assert!(options.token_timeout.is_none());

        let options = JoinOptions::default()
            .with_token_timeout(Duration::from_secs(2))
            .with_connect_timeout(Duration::from_secs(3))
            .with_camera(false);
        assert_eq!(options.token_timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        assert!(!options.camera_enabled);
        assert!(options.mic_enabled);
    }

    #[test]
    fn test_default_view_is_idle_single_tile() {
        let view = SessionView::default();
        assert_eq!(view.state, SessionState::Idle);
        assert!(view.failure.is_none());
        assert!(view.participants.is_empty());
        assert_eq!(view.layout, LayoutDescriptor { rows: 1, columns: 1 });
    }
}
