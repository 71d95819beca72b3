//! `MediaTrackRegistry` - owns local capture and subscribed remote tracks.
//!
//! Local tracks are opened once per session and released on every exit path.
//! Remote tracks are keyed by participant; the key set must match the roster's
//! membership whenever the coordinator is between events.

use super::{CaptureDevices, DeviceError, TrackHandle};
use crate::errors::SessionError;

use common::types::{MediaKind, ParticipantId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Local capture state exposed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMediaState {
    pub camera_track: Option<TrackHandle>,
    pub mic_track: Option<TrackHandle>,
    pub camera_enabled: bool,
    pub mic_enabled: bool,
}

impl LocalMediaState {
    /// Whether at least one local device is missing.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.camera_track.is_none() || self.mic_track.is_none()
    }
}

/// Subscribed tracks of one remote participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTracks {
    pub audio: Option<TrackHandle>,
    pub video: Option<TrackHandle>,
}

impl RemoteTracks {
    #[must_use]
    pub fn get(&self, kind: MediaKind) -> Option<&TrackHandle> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    fn slot(&mut self, kind: MediaKind) -> &mut Option<TrackHandle> {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

/// Sole owner of every track handle in a session.
pub struct MediaTrackRegistry {
    devices: Arc<dyn CaptureDevices>,
    local: LocalMediaState,
    /// Requested camera state, applied when the device opens.
    camera_wanted: bool,
    /// Requested microphone state, applied when the device opens.
    mic_wanted: bool,
    /// Set once local tracks have been installed for this session.
    acquired: bool,
    remote: HashMap<ParticipantId, RemoteTracks>,
}

impl MediaTrackRegistry {
    /// Create an empty registry over the given devices.
    #[must_use]
    pub fn new(devices: Arc<dyn CaptureDevices>) -> Self {
        Self {
            devices,
            local: LocalMediaState::default(),
            camera_wanted: true,
            mic_wanted: true,
            acquired: false,
            remote: HashMap::new(),
        }
    }

    /// Current local capture state.
    #[must_use]
    pub fn local_state(&self) -> &LocalMediaState {
        &self.local
    }

    /// Effective enabled flag for `kind`: the device state once acquired,
    /// the requested state before that.
    #[must_use]
    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        match (self.acquired, kind) {
            (true, MediaKind::Video) => self.local.camera_enabled,
            (true, MediaKind::Audio) => self.local.mic_enabled,
            (false, MediaKind::Video) => self.camera_wanted,
            (false, MediaKind::Audio) => self.mic_wanted,
        }
    }

    /// Devices behind this registry, for opening local media off the actor.
    #[must_use]
    pub fn devices(&self) -> Arc<dyn CaptureDevices> {
        Arc::clone(&self.devices)
    }

    /// Take ownership of tracks opened by [`open_local`].
    ///
    /// One missing device yields a degraded state; both missing yields
    /// `SessionError::DeviceUnavailable`. Once installed, the tracks are
    /// freed by [`release_local`](Self::release_local).
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if neither device could be opened.
    pub fn install_local(
        &mut self,
        acquisition: LocalAcquisition,
    ) -> Result<LocalMediaState, SessionError> {
        self.acquired = true;

        let mut failures = Vec::new();
        let LocalAcquisition { camera, mic } = acquisition;

        match camera {
            Ok(opened) => {
                self.local.camera_enabled = opened.enabled;
                self.local.camera_track = Some(opened.track);
            }
            Err(e) => {
                warn!(target: "session.media.registry", error = %e, "Camera unavailable");
                failures.push(e.to_string());
            }
        }

        match mic {
            Ok(opened) => {
                self.local.mic_enabled = opened.enabled;
                self.local.mic_track = Some(opened.track);
            }
            Err(e) => {
                warn!(target: "session.media.registry", error = %e, "Microphone unavailable");
                failures.push(e.to_string());
            }
        }

        if self.local.camera_track.is_none() && self.local.mic_track.is_none() {
            return Err(SessionError::DeviceUnavailable(failures.join("; ")));
        }

        info!(
            target: "session.media.registry",
            camera = self.local.camera_enabled,
            mic = self.local.mic_enabled,
            degraded = self.local.is_degraded(),
            "Local media acquired"
        );

        Ok(self.local.clone())
    }

    /// Bring open tracks in line with toggles requested while they were
    /// being opened. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if a device rejects the change.
    pub async fn apply_requested(&mut self) -> Result<bool, SessionError> {
        let camera = self.set_enabled(MediaKind::Video, self.camera_wanted).await?;
        let mic = self.set_enabled(MediaKind::Audio, self.mic_wanted).await?;
        Ok(camera || mic)
    }

    /// Enable or disable the camera. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the device rejects the change.
    pub async fn set_camera_enabled(&mut self, enabled: bool) -> Result<bool, SessionError> {
        self.set_enabled(MediaKind::Video, enabled).await
    }

    /// Enable or disable the microphone. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the device rejects the change.
    pub async fn set_mic_enabled(&mut self, enabled: bool) -> Result<bool, SessionError> {
        self.set_enabled(MediaKind::Audio, enabled).await
    }

    async fn set_enabled(&mut self, kind: MediaKind, enabled: bool) -> Result<bool, SessionError> {
        if !self.acquired {
            let wanted = match kind {
                MediaKind::Video => &mut self.camera_wanted,
                MediaKind::Audio => &mut self.mic_wanted,
            };
            let changed = *wanted != enabled;
            *wanted = enabled;
            return Ok(changed);
        }

        let (track, current) = match kind {
            MediaKind::Video => (self.local.camera_track.as_ref(), self.local.camera_enabled),
            MediaKind::Audio => (self.local.mic_track.as_ref(), self.local.mic_enabled),
        };

        // Degraded: nothing to toggle
        let Some(track) = track else {
            return Ok(false);
        };

        if current == enabled {
            return Ok(false);
        }

        self.devices
            .set_enabled(track, enabled)
            .await
            .map_err(|e: DeviceError| SessionError::DeviceUnavailable(e.to_string()))?;

        match kind {
            MediaKind::Video => {
                self.local.camera_enabled = enabled;
                self.camera_wanted = enabled;
            }
            MediaKind::Audio => {
                self.local.mic_enabled = enabled;
                self.mic_wanted = enabled;
            }
        }

        debug!(
            target: "session.media.registry",
            kind = %kind,
            enabled = enabled,
            "Local track toggled"
        );

        Ok(true)
    }

    /// Stop and free local capture. Idempotent.
    pub async fn release_local(&mut self) {
        let tracks: Vec<TrackHandle> = self
            .local
            .camera_track
            .take()
            .into_iter()
            .chain(self.local.mic_track.take())
            .collect();

        for track in &tracks {
            self.devices.release(track).await;
        }

        if !tracks.is_empty() {
            info!(
                target: "session.media.registry",
                released = tracks.len(),
                "Local media released"
            );
        }

        self.local = LocalMediaState::default();
        self.camera_wanted = true;
        self.mic_wanted = true;
        self.acquired = false;
    }

    /// Bind a subscribed remote track. Returns the handle it replaced, if any.
    pub fn attach_remote(
        &mut self,
        participant_id: &ParticipantId,
        track: TrackHandle,
    ) -> Option<TrackHandle> {
        let kind = track.kind();
        self.remote
            .entry(participant_id.clone())
            .or_default()
            .slot(kind)
            .replace(track)
    }

    /// Unbind one remote track. Unknown participants are ignored.
    pub fn detach_remote(
        &mut self,
        participant_id: &ParticipantId,
        kind: MediaKind,
    ) -> Option<TrackHandle> {
        let tracks = self.remote.get_mut(participant_id)?;
        let removed = tracks.slot(kind).take();
        if tracks.is_empty() {
            self.remote.remove(participant_id);
        }
        removed
    }

    /// Unbind every track of a participant. Unknown participants are ignored.
    pub fn detach_all_remote(&mut self, participant_id: &ParticipantId) -> Option<RemoteTracks> {
        self.remote.remove(participant_id)
    }

    /// Tracks bound for a remote participant.
    #[must_use]
    pub fn remote(&self, participant_id: &ParticipantId) -> Option<&RemoteTracks> {
        self.remote.get(participant_id)
    }

    /// Participants that currently have at least one bound track.
    #[must_use]
    pub fn remote_keys(&self) -> BTreeSet<ParticipantId> {
        self.remote.keys().cloned().collect()
    }

    /// Drop every remote binding.
    pub fn clear_remote(&mut self) {
        self.remote.clear();
    }
}

/// A local track opened for a session and its initial enabled flag.
#[derive(Debug)]
pub struct OpenedTrack {
    pub track: TrackHandle,
    pub enabled: bool,
}

/// Result of [`open_local`], not yet owned by a registry.
#[derive(Debug)]
pub struct LocalAcquisition {
    pub camera: Result<OpenedTrack, DeviceError>,
    pub mic: Result<OpenedTrack, DeviceError>,
}

impl LocalAcquisition {
    /// Handles of the tracks that opened.
    #[must_use]
    pub fn tracks(&self) -> Vec<TrackHandle> {
        [&self.camera, &self.mic]
            .into_iter()
            .filter_map(|opened| opened.as_ref().ok())
            .map(|opened| opened.track.clone())
            .collect()
    }

    /// Free whatever opened, for acquisitions that never reach a registry.
    pub async fn release(self, devices: &dyn CaptureDevices) {
        let opened = [self.camera, self.mic]
            .into_iter()
            .filter_map(Result::ok)
            .map(|opened| opened.track);
        release_opened(devices, opened).await;
    }
}

/// Open camera and microphone concurrently and apply the requested initial
/// enabled flags.
///
/// Returns `None` if `cancel` fires first. Any device that had already
/// opened by then is released before returning, so a device that never
/// answers cannot strand the other one.
pub async fn open_local(
    devices: &Arc<dyn CaptureDevices>,
    camera_wanted: bool,
    mic_wanted: bool,
    cancel: &CancellationToken,
) -> Option<LocalAcquisition> {
    let mut camera_open = devices.open(MediaKind::Video);
    let mut mic_open = devices.open(MediaKind::Audio);
    let mut camera = None;
    let mut mic = None;

    while camera.is_none() || mic.is_none() {
        tokio::select! {
            () = cancel.cancelled() => {
                let opened = [camera, mic].into_iter().flatten().filter_map(Result::ok);
                release_opened(devices.as_ref(), opened).await;
                debug!(target: "session.media.registry", "Local media acquisition cancelled");
                return None;
            }
            result = &mut camera_open, if camera.is_none() => camera = Some(result),
            result = &mut mic_open, if mic.is_none() => mic = Some(result),
        }
    }

    let (Some(camera), Some(mic)) = (camera, mic) else {
        return None;
    };

    let initial = tokio::select! {
        () = cancel.cancelled() => None,
        flags = async {
            tokio::join!(
                initial_enabled(devices.as_ref(), &camera, camera_wanted),
                initial_enabled(devices.as_ref(), &mic, mic_wanted)
            )
        } => Some(flags),
    };

    let Some((camera_enabled, mic_enabled)) = initial else {
        let opened = [camera, mic].into_iter().filter_map(Result::ok);
        release_opened(devices.as_ref(), opened).await;
        debug!(target: "session.media.registry", "Local media acquisition cancelled");
        return None;
    };

    Some(LocalAcquisition {
        camera: camera.map(|track| OpenedTrack {
            track,
            enabled: camera_enabled,
        }),
        mic: mic.map(|track| OpenedTrack {
            track,
            enabled: mic_enabled,
        }),
    })
}

/// Enabled flag for a freshly opened track, disabling it if the caller
/// asked for it off.
async fn initial_enabled(
    devices: &dyn CaptureDevices,
    opened: &Result<TrackHandle, DeviceError>,
    wanted: bool,
) -> bool {
    let Ok(track) = opened else {
        return false;
    };
    if wanted {
        return true;
    }
    match devices.set_enabled(track, false).await {
        Ok(()) => false,
        Err(e) => {
            warn!(
                target: "session.media.registry",
                kind = %track.kind(),
                error = %e,
                "Failed to apply initial disabled state"
            );
            true
        }
    }
}

async fn release_opened(
    devices: &dyn CaptureDevices,
    tracks: impl IntoIterator<Item = TrackHandle>,
) {
    let mut released = 0;
    for track in tracks {
        devices.release(&track).await;
        released += 1;
    }
    if released > 0 {
        debug!(
            target: "session.media.registry",
            released = released,
            "Released tracks of abandoned acquisition"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Minimal device double; the full scriptable mock lives in the test-utils crate.
    #[derive(Default)]
    struct Devices {
        fail_camera: bool,
        fail_mic: bool,
        hang_camera: bool,
        opens: AtomicU32,
        set_enabled_calls: AtomicU32,
        releases: AtomicU32,
    }

    #[async_trait]
    impl CaptureDevices for Devices {
        async fn open(&self, kind: MediaKind) -> Result<TrackHandle, DeviceError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if kind == MediaKind::Video && self.hang_camera {
                std::future::pending::<()>().await;
            }
            let fail = match kind {
                MediaKind::Video => self.fail_camera,
                MediaKind::Audio => self.fail_mic,
            };
            if fail {
                return Err(DeviceError::Unavailable {
                    kind,
                    reason: "not found".to_string(),
                });
            }
            Ok(TrackHandle::new(kind))
        }

        async fn set_enabled(&self, _track: &TrackHandle, _enabled: bool) -> Result<(), DeviceError> {
            self.set_enabled_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn release(&self, _track: &TrackHandle) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    async fn acquire(registry: &mut MediaTrackRegistry) -> Result<LocalMediaState, SessionError> {
        let acquisition = open_local(
            &registry.devices(),
            registry.is_enabled(MediaKind::Video),
            registry.is_enabled(MediaKind::Audio),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        registry.install_local(acquisition)
    }

    #[tokio::test]
    async fn test_acquire_both_devices() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices.clone());

        let state = acquire(&mut registry).await.unwrap();
        assert!(state.camera_enabled && state.mic_enabled);
        assert!(!state.is_degraded());
        assert!(state.camera_track.is_some() && state.mic_track.is_some());
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_acquire_camera_failure_is_degraded() {
        let devices = Arc::new(Devices {
            fail_camera: true,
            ..Default::default()
        });
        let mut registry = MediaTrackRegistry::new(devices);

        let state = acquire(&mut registry).await.unwrap();
        assert!(!state.camera_enabled);
        assert!(state.mic_enabled);
        assert!(state.camera_track.is_none());
        assert!(state.is_degraded());
    }

    #[tokio::test]
    async fn test_acquire_both_failures_is_device_unavailable() {
        let devices = Arc::new(Devices {
            fail_camera: true,
            fail_mic: true,
            ..Default::default()
        });
        let mut registry = MediaTrackRegistry::new(devices);

        let result = acquire(&mut registry).await;
        assert!(matches!(result, Err(SessionError::DeviceUnavailable(_))));
        assert_eq!(registry.local_state(), &LocalMediaState::default());
    }

    #[tokio::test]
    async fn test_set_enabled_is_idempotent() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices.clone());
        acquire(&mut registry).await.unwrap();

        assert!(registry.set_mic_enabled(false).await.unwrap());
        assert!(!registry.set_mic_enabled(false).await.unwrap());
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 1);

        // Enabling an already-enabled camera reaches no device
        assert!(!registry.set_camera_enabled(true).await.unwrap());
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_toggle_before_acquire_is_applied_on_open() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices.clone());

        assert!(registry.set_camera_enabled(false).await.unwrap());
        assert!(!registry.is_enabled(MediaKind::Video));
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 0);

        let state = acquire(&mut registry).await.unwrap();
        assert!(!state.camera_enabled);
        assert!(state.mic_enabled);
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_toggle_while_opening_is_applied_after_install() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices.clone());

        let acquisition = open_local(&registry.devices(), true, true, &CancellationToken::new())
            .await
            .unwrap();
        assert!(registry.set_mic_enabled(false).await.unwrap());

        let state = registry.install_local(acquisition).unwrap();
        assert!(state.mic_enabled);

        assert!(registry.apply_requested().await.unwrap());
        assert!(!registry.is_enabled(MediaKind::Audio));
        assert!(registry.is_enabled(MediaKind::Video));
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 1);

        // Nothing left to reconcile
        assert!(!registry.apply_requested().await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_open_releases_the_device_that_answered() {
        let devices = Arc::new(Devices {
            hang_camera: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let task = {
            let devices: Arc<dyn CaptureDevices> = devices.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { open_local(&devices, true, true, &cancel).await })
        };

        while devices.opens.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert!(task.await.unwrap().is_none());
        assert_eq!(devices.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_uninstalled_acquisition_release() {
        let devices = Arc::new(Devices {
            fail_camera: true,
            ..Default::default()
        });
        let shared: Arc<dyn CaptureDevices> = devices.clone();

        let acquisition = open_local(&shared, true, false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(acquisition.camera.is_err());
        assert!(!acquisition.mic.as_ref().unwrap().enabled);
        assert_eq!(acquisition.tracks().len(), 1);

        acquisition.release(shared.as_ref()).await;
        assert_eq!(devices.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_toggle_missing_device_is_noop() {
        let devices = Arc::new(Devices {
            fail_camera: true,
            ..Default::default()
        });
        let mut registry = MediaTrackRegistry::new(devices.clone());
        acquire(&mut registry).await.unwrap();

        assert!(!registry.set_camera_enabled(true).await.unwrap());
        assert!(!registry.is_enabled(MediaKind::Video));
        assert_eq!(devices.set_enabled_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_release_local_is_idempotent() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices.clone());
        acquire(&mut registry).await.unwrap();

        registry.release_local().await;
        registry.release_local().await;

        assert_eq!(devices.releases.load(Ordering::SeqCst), 2);
        assert_eq!(registry.local_state(), &LocalMediaState::default());
    }

    #[test]
    fn test_remote_attach_replace_and_detach() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices);
        let u2 = pid("u2");

        let first = TrackHandle::new(MediaKind::Video);
        assert!(registry.attach_remote(&u2, first.clone()).is_none());

        // Republish replaces, never appends
        let second = TrackHandle::new(MediaKind::Video);
        assert_eq!(registry.attach_remote(&u2, second.clone()), Some(first));
        assert_eq!(registry.remote(&u2).unwrap().video, Some(second));

        registry.attach_remote(&u2, TrackHandle::new(MediaKind::Audio));
        registry.detach_remote(&u2, MediaKind::Video);
        assert!(registry.remote_keys().contains(&u2));

        registry.detach_remote(&u2, MediaKind::Audio);
        assert!(registry.remote_keys().is_empty());
    }

    #[test]
    fn test_detach_unknown_participant_is_noop() {
        let devices = Arc::new(Devices::default());
        let mut registry = MediaTrackRegistry::new(devices);

        assert!(registry.detach_remote(&pid("ghost"), MediaKind::Audio).is_none());
        assert!(registry.detach_all_remote(&pid("ghost")).is_none());
    }
}
