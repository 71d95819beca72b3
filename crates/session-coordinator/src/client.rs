//! `MeetingClient` - the presentation layer's surface for one channel.
//!
//! Wraps a [`SessionCoordinatorHandle`] and a [`ChatStream`] bound to the same
//! channel. Media calls go through the coordinator; chat calls go straight to
//! the chat log and work in any session state.

use crate::actors::{
    JoinOptions, JoinOutcome, SessionCoordinator, SessionCoordinatorHandle, SessionDeps,
    SessionView,
};
use crate::chat::{ChatLog, ChatMessage, ChatStream, ChatSubscription, InMemoryChatLog, RedisChatLog};
use crate::config::Config;
use crate::errors::SessionError;
use crate::media::CaptureDevices;
use crate::transport::MediaTransport;

use common::token_client::{HttpTokenClient, TokenClientConfig};
use common::types::{ChannelId, ParticipantId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Meeting surface bound to one channel.
#[derive(Clone)]
pub struct MeetingClient {
    channel_id: ChannelId,
    coordinator: SessionCoordinatorHandle,
    chat: ChatStream,
}

impl MeetingClient {
    /// Bind an existing coordinator and chat stream to `channel_id`.
    #[must_use]
    pub fn new(channel_id: ChannelId, coordinator: SessionCoordinatorHandle, chat: ChatStream) -> Self {
        Self {
            channel_id,
            coordinator,
            chat,
        }
    }

    /// Spawn a coordinator over `deps` and bind it with a chat stream over
    /// `chat_log`.
    #[must_use]
    pub fn start(
        channel_id: ChannelId,
        deps: SessionDeps,
        chat_log: Arc<dyn ChatLog>,
        config: &Config,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (coordinator, task) = SessionCoordinator::spawn(deps, config, cancel_token);
        let chat = ChatStream::new(
            chat_log,
            config.chat_poll_interval,
            config.chat_subscription_buffer,
        );
        (Self::new(channel_id, coordinator, chat), task)
    }

    /// Build everything from configuration: the HTTP token client against
    /// `config.token_endpoint`, and the Redis chat log when
    /// `config.chat_redis_url` is set (in-memory otherwise).
    ///
    /// # Errors
    ///
    /// `SessionError::Config` if the token client or chat log cannot be built.
    pub async fn from_config(
        channel_id: ChannelId,
        config: &Config,
        transport: Arc<dyn MediaTransport>,
        devices: Arc<dyn CaptureDevices>,
        cancel_token: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), SessionError> {
        let token_config = TokenClientConfig::new(config.token_endpoint.clone())
            .with_http_timeout(config.token_timeout);
        let token_client = HttpTokenClient::new(token_config).map_err(|e| {
            error!(target: "session.client", error = %e, "Failed to build token client");
            SessionError::Config(e.to_string())
        })?;

        let chat_log: Arc<dyn ChatLog> = match &config.chat_redis_url {
            Some(url) => Arc::new(RedisChatLog::connect(url).await.map_err(|e| {
                error!(target: "session.client", error = %e, "Failed to connect chat log");
                SessionError::Config(e.to_string())
            })?),
            None => Arc::new(InMemoryChatLog::new()),
        };

        info!(
            target: "session.client",
            channel_id = %channel_id,
            redis_chat = config.chat_redis_url.is_some(),
            "Meeting client ready"
        );

        let deps = SessionDeps {
            token_client: Arc::new(token_client),
            transport,
            devices,
        };
        Ok(Self::start(channel_id, deps, chat_log, config, cancel_token))
    }

    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Join with default options.
    ///
    /// # Errors
    ///
    /// See [`SessionCoordinatorHandle::join`].
    pub async fn join(&self, identity: ParticipantId) -> Result<JoinOutcome, SessionError> {
        self.join_with(identity, JoinOptions::default()).await
    }

    /// Join with explicit timeouts and initial device state.
    ///
    /// # Errors
    ///
    /// See [`SessionCoordinatorHandle::join`].
    pub async fn join_with(
        &self,
        identity: ParticipantId,
        options: JoinOptions,
    ) -> Result<JoinOutcome, SessionError> {
        self.coordinator
            .join(self.channel_id.clone(), identity, options)
            .await
    }

    /// # Errors
    ///
    /// `SessionError::Internal` if the coordinator is gone.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.coordinator.leave().await
    }

    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the camera rejected the change.
    pub async fn toggle_camera(&self) -> Result<Option<bool>, SessionError> {
        self.coordinator.toggle_camera().await
    }

    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the microphone rejected the change.
    pub async fn toggle_mic(&self) -> Result<Option<bool>, SessionError> {
        self.coordinator.toggle_mic().await
    }

    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the camera rejected the change.
    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<Option<bool>, SessionError> {
        self.coordinator.set_camera_enabled(enabled).await
    }

    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the microphone rejected the change.
    pub async fn set_mic_enabled(&self, enabled: bool) -> Result<Option<bool>, SessionError> {
        self.coordinator.set_mic_enabled(enabled).await
    }

    /// # Errors
    ///
    /// `SessionError::Internal` if the coordinator is gone.
    pub async fn set_hand_raised(&self, raised: bool) -> Result<Option<bool>, SessionError> {
        self.coordinator.set_hand_raised(raised).await
    }

    /// Post an anonymous message to the channel.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidInput` for empty text, `SessionError::SendFailed`
    /// if the log did not record it.
    pub async fn send_chat(&self, text: &str) -> Result<ChatMessage, SessionError> {
        self.chat.append(&self.channel_id, text).await
    }

    /// Post a message attributed to `sender`.
    ///
    /// # Errors
    ///
    /// See [`MeetingClient::send_chat`].
    pub async fn send_chat_as(
        &self,
        sender: &ParticipantId,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        self.chat
            .append_from(&self.channel_id, Some(sender), text)
            .await
    }

    /// Follow the channel's chat from its first message.
    #[must_use]
    pub fn chat(&self) -> ChatSubscription {
        self.chat.subscribe(&self.channel_id)
    }

    /// Receiver of every published session view.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.coordinator.view()
    }

    /// # Errors
    ///
    /// `SessionError::Internal` if the coordinator is gone.
    pub async fn get_state(&self) -> Result<SessionView, SessionError> {
        self.coordinator.get_state().await
    }

    /// Stop the coordinator, releasing the session if one is active.
    pub fn shutdown(&self) {
        self.coordinator.cancel();
    }
}
