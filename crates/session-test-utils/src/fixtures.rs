//! Identifiers, configuration and a coordinator wired to mocks.

use crate::{MockDevices, MockTokenClient, MockTransport};
use common::types::{ChannelId, ParticipantId};
use session_coordinator::actors::{
    SessionCoordinator, SessionCoordinatorHandle, SessionDeps, SessionView,
};
use session_coordinator::config::Config;
use session_coordinator::session::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use session_coordinator::actors::JoinOptions;

/// How long [`wait_for_state`] waits before giving up.
pub const STATE_WAIT: Duration = Duration::from_secs(5);

/// # Panics
///
/// Panics on an empty name.
#[must_use]
pub fn channel(name: &str) -> ChannelId {
    ChannelId::new(name).expect("test channel name")
}

/// # Panics
///
/// Panics on an empty id.
#[must_use]
pub fn participant(id: &str) -> ParticipantId {
    ParticipantId::new(id).expect("test participant id")
}

/// Environment for [`test_config`].
#[must_use]
pub fn test_vars() -> HashMap<String, String> {
    HashMap::from([
        (
            "SESSION_TOKEN_ENDPOINT".to_string(),
            "http://localhost:8080/token".to_string(),
        ),
        ("SESSION_APP_ID".to_string(), "test-app".to_string()),
        ("SESSION_TOKEN_TIMEOUT_MS".to_string(), "2000".to_string()),
        ("SESSION_CONNECT_TIMEOUT_MS".to_string(), "3000".to_string()),
        ("CHAT_POLL_INTERVAL_MS".to_string(), "50".to_string()),
    ])
}

/// Configuration with short timeouts and the in-memory chat log.
///
/// # Panics
///
/// Panics if [`test_vars`] stops parsing.
#[must_use]
pub fn test_config() -> Config {
    Config::from_vars(&test_vars()).expect("test config")
}

/// A running coordinator and the mocks behind it.
pub struct SessionHarness {
    pub handle: SessionCoordinatorHandle,
    pub task: JoinHandle<()>,
    pub token: MockTokenClient,
    pub transport: MockTransport,
    pub devices: MockDevices,
    pub cancel_token: CancellationToken,
    pub config: Config,
}

impl SessionHarness {
    /// Spawn a coordinator over the given mocks with [`test_config`].
    #[must_use]
    pub fn start(token: MockTokenClient, transport: MockTransport, devices: MockDevices) -> Self {
        Self::start_with_config(token, transport, devices, test_config())
    }

    #[must_use]
    pub fn start_with_config(
        token: MockTokenClient,
        transport: MockTransport,
        devices: MockDevices,
        config: Config,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let (handle, task) = SessionCoordinator::spawn(
            Self::deps(&token, &transport, &devices),
            &config,
            cancel_token.clone(),
        );

        Self {
            handle,
            task,
            token,
            transport,
            devices,
            cancel_token,
            config,
        }
    }

    /// Wire the mocks into coordinator dependencies.
    #[must_use]
    pub fn deps(
        token: &MockTokenClient,
        transport: &MockTransport,
        devices: &MockDevices,
    ) -> SessionDeps {
        SessionDeps {
            token_client: Arc::new(token.clone()),
            transport: Arc::new(transport.clone()),
            devices: Arc::new(devices.clone()),
        }
    }

    /// Wait until the published view reaches `state`.
    ///
    /// # Panics
    ///
    /// Panics if the state is not reached within [`STATE_WAIT`].
    pub async fn wait_for_state(&self, state: SessionState) -> SessionView {
        wait_for_state(self.handle.view(), state).await
    }

    /// Wait until the published view satisfies `condition`.
    ///
    /// # Panics
    ///
    /// Panics if no view matches within [`STATE_WAIT`].
    pub async fn wait_for_view(&self, condition: impl FnMut(&SessionView) -> bool) -> SessionView {
        wait_for_view(self.handle.view(), condition).await
    }

    /// Cancel the coordinator and wait for its task to end.
    ///
    /// # Panics
    ///
    /// Panics if the task does not stop within [`STATE_WAIT`].
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        tokio::time::timeout(STATE_WAIT, self.task)
            .await
            .expect("coordinator did not stop")
            .expect("coordinator task panicked");
    }
}

/// Wait until `view` publishes `state`.
///
/// # Panics
///
/// Panics if the state is not reached within [`STATE_WAIT`] or the
/// coordinator is gone.
pub async fn wait_for_state(view: watch::Receiver<SessionView>, state: SessionState) -> SessionView {
    wait_for_view(view, |v| v.state == state).await
}

/// Wait until a published view satisfies `condition`.
///
/// # Panics
///
/// Panics if no view matches within [`STATE_WAIT`] or the coordinator is
/// gone.
pub async fn wait_for_view(
    mut view: watch::Receiver<SessionView>,
    condition: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    let matched = tokio::time::timeout(STATE_WAIT, view.wait_for(condition))
        .await
        .expect("session view never matched")
        .expect("coordinator gone")
        .clone();
    matched
}
