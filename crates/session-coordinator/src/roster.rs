//! `RosterManager` - ordered set of remote participants with active media.
//!
//! A participant is listed once it publishes at least one track and is
//! unlisted when its last track is unpublished or it leaves. Order is the
//! join order, fixed by a monotonic sequence number assigned on first sight.
//! Unpublishing keeps the sequence, so republishing restores the same place;
//! only leaving forgets it, and a participant that comes back after leaving
//! is appended at the end.

use crate::media::{MediaTrackRegistry, TrackHandle};

use chrono::{DateTime, Utc};
use common::types::{MediaKind, ParticipantId};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Remote participant as rendered by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub participant_id: ParticipantId,
    pub video_track: Option<TrackHandle>,
    pub audio_track: Option<TrackHandle>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RosterEntry {
    seq: u64,
    joined_at: DateTime<Utc>,
    audio: bool,
    video: bool,
}

impl RosterEntry {
    fn has_tracks(&self) -> bool {
        self.audio || self.video
    }

    fn flag(&mut self, kind: MediaKind) -> &mut bool {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }
}

/// Tracks remote membership for the current session.
///
/// Mutators return `true` when the number of listed participants changed.
#[derive(Debug, Default)]
pub struct RosterManager {
    entries: HashMap<ParticipantId, RosterEntry>,
    next_seq: u64,
}

impl RosterManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, participant_id: &ParticipantId) -> &mut RosterEntry {
        let next_seq = &mut self.next_seq;
        self.entries
            .entry(participant_id.clone())
            .or_insert_with(|| {
                let seq = *next_seq;
                *next_seq += 1;
                RosterEntry {
                    seq,
                    joined_at: Utc::now(),
                    audio: false,
                    video: false,
                }
            })
    }

    /// Remember a participant that joined but has not published yet.
    pub fn on_joined(&mut self, participant_id: &ParticipantId) -> bool {
        self.entry(participant_id);
        false
    }

    /// Mark a track of `kind` as active for the participant.
    pub fn on_published(&mut self, participant_id: &ParticipantId, kind: MediaKind) -> bool {
        let entry = self.entry(participant_id);
        let was_listed = entry.has_tracks();
        *entry.flag(kind) = true;

        if !was_listed {
            debug!(
                target: "session.roster",
                participant_id = %participant_id,
                kind = %kind,
                "Participant listed"
            );
        }
        !was_listed
    }

    /// Mark a track of `kind` as gone. Unlists the participant when no tracks
    /// remain, keeping its join order and `joined_at`.
    pub fn on_unpublished(&mut self, participant_id: &ParticipantId, kind: MediaKind) -> bool {
        let Some(entry) = self.entries.get_mut(participant_id) else {
            return false;
        };
        let was_listed = entry.has_tracks();
        *entry.flag(kind) = false;
        if entry.has_tracks() {
            return false;
        }

        if was_listed {
            debug!(
                target: "session.roster",
                participant_id = %participant_id,
                "Participant unlisted after last unpublish"
            );
        }
        was_listed
    }

    /// Remove the participant entirely.
    pub fn on_left(&mut self, participant_id: &ParticipantId) -> bool {
        self.entries
            .remove(participant_id)
            .is_some_and(|entry| entry.has_tracks())
    }

    /// Number of listed participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.has_tracks()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers of listed participants.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<ParticipantId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.has_tracks())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Listed participants in join order, with their bound tracks.
    #[must_use]
    pub fn snapshot(&self, tracks: &MediaTrackRegistry) -> Vec<RemoteParticipant> {
        let mut listed: Vec<(&ParticipantId, &RosterEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.has_tracks())
            .collect();
        listed.sort_by_key(|(_, e)| e.seq);

        listed
            .into_iter()
            .map(|(id, entry)| {
                let bound = tracks.remote(id);
                RemoteParticipant {
                    participant_id: id.clone(),
                    video_track: bound.and_then(|t| t.video.clone()),
                    audio_track: bound.and_then(|t| t.audio.clone()),
                    joined_at: entry.joined_at,
                }
            })
            .collect()
    }

    /// Forget everyone, including pending joins.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::media::{CaptureDevices, DeviceError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoDevices;

    #[async_trait]
    impl CaptureDevices for NoDevices {
        async fn open(&self, kind: MediaKind) -> Result<TrackHandle, DeviceError> {
            Err(DeviceError::Unavailable {
                kind,
                reason: "none".to_string(),
            })
        }

        async fn set_enabled(&self, _track: &TrackHandle, _enabled: bool) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn release(&self, _track: &TrackHandle) {}
    }

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    fn registry() -> MediaTrackRegistry {
        MediaTrackRegistry::new(Arc::new(NoDevices))
    }

    #[test]
    fn test_join_without_publish_is_not_listed() {
        let mut roster = RosterManager::new();
        assert!(!roster.on_joined(&pid("u2")));
        assert_eq!(roster.len(), 0);
        assert!(roster.keys().is_empty());
    }

    #[test]
    fn test_publish_then_unpublish_all_unlists_participant() {
        let mut roster = RosterManager::new();
        let u2 = pid("u2");

        roster.on_joined(&u2);
        assert!(roster.on_published(&u2, MediaKind::Video));
        assert!(!roster.on_published(&u2, MediaKind::Audio));
        assert_eq!(roster.len(), 1);

        assert!(!roster.on_unpublished(&u2, MediaKind::Video));
        assert_eq!(roster.len(), 1);

        assert!(roster.on_unpublished(&u2, MediaKind::Audio));
        assert_eq!(roster.len(), 0);
    }

    #[test]
    fn test_republish_after_unpublish_keeps_place() {
        let mut roster = RosterManager::new();
        let (a, b) = (pid("a"), pid("b"));

        roster.on_published(&a, MediaKind::Video);
        roster.on_published(&b, MediaKind::Video);
        let joined_at = roster.snapshot(&registry())[0].joined_at;

        assert!(roster.on_unpublished(&a, MediaKind::Video));
        assert_eq!(roster.keys(), BTreeSet::from([b.clone()]));

        assert!(roster.on_published(&a, MediaKind::Audio));
        let snapshot = roster.snapshot(&registry());
        let order: Vec<_> = snapshot.iter().map(|p| p.participant_id.clone()).collect();
        assert_eq!(order, vec![a, b]);
        assert_eq!(snapshot[0].joined_at, joined_at);
    }

    #[test]
    fn test_audio_only_publisher_is_listed() {
        let mut roster = RosterManager::new();
        assert!(roster.on_published(&pid("u3"), MediaKind::Audio));
        assert_eq!(roster.keys(), BTreeSet::from([pid("u3")]));
    }

    #[test]
    fn test_snapshot_orders_by_join() {
        let mut roster = RosterManager::new();
        let (a, b, c) = (pid("a"), pid("b"), pid("c"));

        roster.on_joined(&c);
        roster.on_joined(&a);
        roster.on_published(&b, MediaKind::Video);
        roster.on_published(&a, MediaKind::Video);
        roster.on_published(&c, MediaKind::Audio);

        let order: Vec<_> = roster
            .snapshot(&registry())
            .into_iter()
            .map(|p| p.participant_id)
            .collect();
        assert_eq!(order, vec![c, a, b]);
    }

    #[test]
    fn test_rejoin_goes_to_back() {
        let mut roster = RosterManager::new();
        let (a, b) = (pid("a"), pid("b"));

        roster.on_published(&a, MediaKind::Video);
        roster.on_published(&b, MediaKind::Video);
        assert!(roster.on_left(&a));
        assert!(!roster.on_left(&a));
        roster.on_published(&a, MediaKind::Video);

        let order: Vec<_> = roster
            .snapshot(&registry())
            .into_iter()
            .map(|p| p.participant_id)
            .collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn test_snapshot_carries_bound_tracks() {
        let mut roster = RosterManager::new();
        let mut tracks = registry();
        let u2 = pid("u2");

        let video = TrackHandle::new(MediaKind::Video);
        tracks.attach_remote(&u2, video.clone());
        roster.on_published(&u2, MediaKind::Video);

        let snapshot = roster.snapshot(&tracks);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].video_track, Some(video));
        assert!(snapshot[0].audio_track.is_none());
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let mut roster = RosterManager::new();
        assert!(!roster.on_unpublished(&pid("ghost"), MediaKind::Audio));
        assert!(!roster.on_left(&pid("ghost")));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_clear_forgets_pending_joins() {
        let mut roster = RosterManager::new();
        roster.on_joined(&pid("a"));
        roster.on_published(&pid("b"), MediaKind::Audio);
        roster.clear();
        assert!(roster.is_empty());
        assert!(roster.entries.is_empty());
    }
}
