//! Media transport seam.
//!
//! The coordinator never speaks a wire protocol itself. A [`MediaTransport`]
//! implementation owns the connection and delivers remote activity as an
//! ordered stream of [`TransportEvent`]s.

use crate::media::TrackHandle;

use async_trait::async_trait;
use common::token_client::Credential;
use common::types::{ChannelId, MediaKind, ParticipantId};
use thiserror::Error;
use tokio::sync::mpsc;

/// Remote activity reported by the transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Participant entered the channel.
    Joined { participant_id: ParticipantId },
    /// Participant started sending a track.
    Published {
        participant_id: ParticipantId,
        kind: MediaKind,
    },
    /// Participant stopped sending a track.
    Unpublished {
        participant_id: ParticipantId,
        kind: MediaKind,
    },
    /// Participant left the channel.
    Left { participant_id: ParticipantId },
    /// Connection is unusable.
    Fault { reason: String },
}

impl TransportEvent {
    /// Returns the event name for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportEvent::Joined { .. } => "joined",
            TransportEvent::Published { .. } => "published",
            TransportEvent::Unpublished { .. } => "unpublished",
            TransportEvent::Left { .. } => "left",
            TransportEvent::Fault { .. } => "fault",
        }
    }
}

/// Everything a transport needs to enter a channel.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub app_id: String,
    pub channel: ChannelId,
    pub credential: Credential,
    pub identity: ParticipantId,
}

/// Transport failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe to {participant_id} {kind} failed: {reason}")]
    Subscribe {
        participant_id: ParticipantId,
        kind: MediaKind,
        reason: String,
    },

    #[error("Transport closed")]
    Closed,
}

/// Real-time media transport.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Enter the channel. The returned receiver yields remote events until
    /// the connection ends; a closed receiver is treated as a fault.
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Start sending local tracks.
    async fn publish(&self, tracks: &[TrackHandle]) -> Result<(), TransportError>;

    /// Stop sending local tracks.
    async fn unpublish(&self, tracks: &[TrackHandle]) -> Result<(), TransportError>;

    /// Receive a remote participant's track.
    async fn subscribe(
        &self,
        participant_id: &ParticipantId,
        kind: MediaKind,
    ) -> Result<TrackHandle, TransportError>;

    /// Leave the channel and close the connection.
    async fn leave(&self);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_labels() {
        let u2 = ParticipantId::new("u2").unwrap();
        assert_eq!(
            TransportEvent::Published {
                participant_id: u2.clone(),
                kind: MediaKind::Video
            }
            .as_str(),
            "published"
        );
        assert_eq!(TransportEvent::Left { participant_id: u2 }.as_str(), "left");
        assert_eq!(
            TransportEvent::Fault {
                reason: "ice".to_string()
            }
            .as_str(),
            "fault"
        );
    }

    #[test]
    fn test_subscribe_error_display() {
        let err = TransportError::Subscribe {
            participant_id: ParticipantId::new("u9").unwrap(),
            kind: MediaKind::Audio,
            reason: "gone".to_string(),
        };
        assert_eq!(err.to_string(), "Subscribe to u9 audio failed: gone");
    }
}
