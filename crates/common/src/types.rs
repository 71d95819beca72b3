//! Common data types for meeting sessions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound (exclusive) for generated numeric participant identities.
pub const NUMERIC_IDENTITY_MAX: u32 = 100_000;

/// Rejected identifier input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier was empty or whitespace only.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Logical meeting room shared by the media session and the chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierError::Empty` if the trimmed value is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentifierError::Empty("channel id"));
        }
        Ok(Self(value))
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one participant within a channel.
///
/// Used as the roster key, so it must be unique per channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierError::Empty` if the trimmed value is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentifierError::Empty("participant id"));
        }
        Ok(Self(value))
    }

    /// Generate a random numeric identity in `0..NUMERIC_IDENTITY_MAX`.
    ///
    /// Token endpoints that mint integer-uid credentials require this form.
    #[must_use]
    pub fn random_numeric() -> Self {
        let uid = rand::thread_rng().gen_range(0..NUMERIC_IDENTITY_MAX);
        Self(uid.to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u32> for ParticipantId {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_rejects_blank() {
        assert_eq!(
            ChannelId::new("  "),
            Err(IdentifierError::Empty("channel id"))
        );
        assert_eq!(ChannelId::new("room1").unwrap().as_str(), "room1");
    }

    #[test]
    fn test_participant_id_rejects_empty() {
        assert!(ParticipantId::new("").is_err());
        assert_eq!(ParticipantId::from(42).as_str(), "42");
    }

    #[test]
    fn test_random_numeric_is_in_range() {
        for _ in 0..50 {
            let id = ParticipantId::random_numeric();
            let uid: u32 = id.as_str().parse().unwrap();
            assert!(uid < NUMERIC_IDENTITY_MAX);
        }
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ParticipantId::new("u1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u1\"");
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
    }
}
