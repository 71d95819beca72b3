//! Capture devices with failure switches and call accounting.

use async_trait::async_trait;
use common::types::MediaKind;
use session_coordinator::media::{CaptureDevices, DeviceError, TrackHandle};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    missing: HashSet<MediaKind>,
    hanging: HashSet<MediaKind>,
    fail_set_enabled: bool,
    open_calls: Vec<MediaKind>,
    set_enabled_calls: Vec<(MediaKind, bool)>,
    released: Vec<TrackHandle>,
    live: HashSet<TrackHandle>,
}

/// Camera and microphone double.
#[derive(Debug, Clone, Default)]
pub struct MockDevices {
    inner: Arc<Mutex<Inner>>,
}

impl MockDevices {
    /// Both devices present and working.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening the camera fails.
    #[must_use]
    pub fn without_camera(self) -> Self {
        self.inner.lock().unwrap().missing.insert(MediaKind::Video);
        self
    }

    /// Opening the microphone fails.
    #[must_use]
    pub fn without_mic(self) -> Self {
        self.inner.lock().unwrap().missing.insert(MediaKind::Audio);
        self
    }

    /// Opening the camera never completes.
    #[must_use]
    pub fn hanging_camera(self) -> Self {
        self.inner.lock().unwrap().hanging.insert(MediaKind::Video);
        self
    }

    /// Every enable/disable call fails.
    #[must_use]
    pub fn failing_set_enabled(self) -> Self {
        self.inner.lock().unwrap().fail_set_enabled = true;
        self
    }

    /// Kinds passed to `open`, in order.
    #[must_use]
    pub fn open_calls(&self) -> Vec<MediaKind> {
        self.inner.lock().unwrap().open_calls.clone()
    }

    /// Arguments of every `set_enabled` call, in order.
    #[must_use]
    pub fn set_enabled_calls(&self) -> Vec<(MediaKind, bool)> {
        self.inner.lock().unwrap().set_enabled_calls.clone()
    }

    /// Number of `release` calls.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.inner.lock().unwrap().released.len()
    }

    /// Tracks opened and not yet released.
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }
}

#[async_trait]
impl CaptureDevices for MockDevices {
    async fn open(&self, kind: MediaKind) -> Result<TrackHandle, DeviceError> {
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.open_calls.push(kind);
            inner.hanging.contains(&kind)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.missing.contains(&kind) {
            return Err(DeviceError::Unavailable {
                kind,
                reason: "device not found".to_string(),
            });
        }
        let track = TrackHandle::new(kind);
        inner.live.insert(track.clone());
        Ok(track)
    }

    async fn set_enabled(&self, track: &TrackHandle, enabled: bool) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.set_enabled_calls.push((track.kind(), enabled));
        if inner.fail_set_enabled {
            return Err(DeviceError::Operation {
                kind: track.kind(),
                reason: "device busy".to_string(),
            });
        }
        Ok(())
    }

    async fn release(&self, track: &TrackHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.live.remove(track);
        inner.released.push(track.clone());
    }
}
