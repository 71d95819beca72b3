//! # Session Test Utilities
//!
//! Mocks and fixtures for exercising the session coordinator without a real
//! token endpoint, media transport or camera.
//!
//! ## Modules
//!
//! - `mock_token` - Scriptable `TokenClient`
//! - `mock_transport` - `MediaTransport` that records calls and injects events
//! - `mock_devices` - `CaptureDevices` with per-device failure switches
//! - `fixtures` - Identifiers, configuration and a ready-to-drive harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = SessionHarness::start(
//!         MockTokenClient::succeeding(),
//!         MockTransport::new(),
//!         MockDevices::new().without_camera(),
//!     );
//!
//!     let outcome = harness
//!         .handle
//!         .join(channel("room1"), participant("u1"), JoinOptions::default())
//!         .await
//!         .unwrap();
//!     assert!(outcome.local_media.camera_track.is_none());
//! }
//! ```

pub mod fixtures;
pub mod mock_devices;
pub mod mock_token;
pub mod mock_transport;

pub use fixtures::*;
pub use mock_devices::MockDevices;
pub use mock_token::MockTokenClient;
pub use mock_transport::{ConnectBehavior, MockTransport};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
