//! Local capture and remote track ownership.
//!
//! - [`TrackHandle`] - opaque reference to an audio or video resource
//! - [`CaptureDevices`] - seam over camera/microphone hardware
//! - [`MediaTrackRegistry`] - sole owner of local and remote track handles

mod registry;

pub use registry::{
    open_local, LocalAcquisition, LocalMediaState, MediaTrackRegistry, OpenedTrack, RemoteTracks,
};

use async_trait::async_trait;
use common::types::MediaKind;
use thiserror::Error;
use uuid::Uuid;

/// Opaque reference to a capturable or playable track.
///
/// Cloning a handle clones the reference, not the resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    id: Uuid,
    kind: MediaKind,
}

impl TrackHandle {
    /// Create a handle with a fresh identifier.
    #[must_use]
    pub fn new(kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// Capture device failures.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// Device could not be opened (missing, busy, permission denied).
    #[error("{kind} device unavailable: {reason}")]
    Unavailable { kind: MediaKind, reason: String },

    /// An operation on an open track failed.
    #[error("{kind} track operation failed: {reason}")]
    Operation { kind: MediaKind, reason: String },
}

/// Camera and microphone hardware.
#[async_trait]
pub trait CaptureDevices: Send + Sync {
    /// Open the capture device for `kind` and return its track.
    async fn open(&self, kind: MediaKind) -> Result<TrackHandle, DeviceError>;

    /// Enable or disable capture on an open track without renegotiating.
    async fn set_enabled(&self, track: &TrackHandle, enabled: bool) -> Result<(), DeviceError>;

    /// Stop capture and free the hardware behind `track`.
    async fn release(&self, track: &TrackHandle);
}
