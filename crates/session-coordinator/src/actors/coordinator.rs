//! `SessionCoordinator` - actor that owns one meeting session.
//!
//! The actor serialises every state change: mailbox requests, transport
//! events and join-step completions are handled one at a time on a single
//! task, so no locks guard session state.
//!
//! # Join pipeline
//!
//! ```text
//! join ─► Acquiring ──token──► Connecting ──connect──► open devices, publish ─► Connected
//!             │                    │
//!             └──── error/timeout ─┴──► Failed
//! ```
//!
//! Token acquisition, transport connect and local media setup run as step
//! tasks whose `JoinHandle` is polled by the actor loop, so no external call
//! made while joining can hold up the mailbox. `leave()` cancels the running
//! step and drops its handle, so a late completion never reaches the actor.

use super::messages::{JoinOptions, JoinOutcome, SessionMessage, SessionView};
use crate::config::Config;
use crate::errors::{ErrorKind, SessionError};
use crate::layout::{self, LayoutDescriptor};
use crate::media::{self, CaptureDevices, LocalAcquisition, MediaTrackRegistry, TrackHandle};
use crate::observability::metrics;
use crate::roster::RosterManager;
use crate::session::{Session, SessionState};
use crate::transport::{ConnectParams, MediaTransport, TransportError, TransportEvent};

use common::token_client::{Credential, TokenClient};
use common::types::{ChannelId, MediaKind, ParticipantId};
use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How long an abandoned step may take to observe its cancellation.
const ABANDON_GRACE: Duration = Duration::from_secs(1);

/// External collaborators of a coordinator.
#[derive(Clone)]
pub struct SessionDeps {
    pub token_client: Arc<dyn TokenClient>,
    pub transport: Arc<dyn MediaTransport>,
    pub devices: Arc<dyn CaptureDevices>,
}

/// Handle to a `SessionCoordinator`.
#[derive(Clone)]
pub struct SessionCoordinatorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    view: watch::Receiver<SessionView>,
}

impl SessionCoordinatorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Join `channel_id` as `identity`. Resolves once the session is
    /// `Connected`, or with the error that ended the attempt.
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyActive` if a session is in progress
    /// - `SessionError::TokenUnavailable`, `TransportConnectFailed`,
    ///   `TimeoutExceeded` if the attempt failed (state is then `Failed`)
    /// - `SessionError::Cancelled` if `leave()` abandoned the attempt
    pub async fn join(
        &self,
        channel_id: ChannelId,
        identity: ParticipantId,
        options: JoinOptions,
    ) -> Result<JoinOutcome, SessionError> {
        self.request(|respond_to| SessionMessage::Join {
            channel_id,
            identity,
            options,
            respond_to,
        })
        .await?
    }

    /// Leave the session. Idempotent.
    ///
    /// # Errors
    ///
    /// `SessionError::Internal` if the coordinator is gone.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::Leave { respond_to })
            .await
    }

    /// Flip the camera. Returns the resulting state, or `None` if ignored.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the device rejected the change.
    pub async fn toggle_camera(&self) -> Result<Option<bool>, SessionError> {
        self.request(|respond_to| SessionMessage::SetCamera {
            enabled: None,
            respond_to,
        })
        .await?
    }

    /// Flip the microphone. Returns the resulting state, or `None` if ignored.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the device rejected the change.
    pub async fn toggle_mic(&self) -> Result<Option<bool>, SessionError> {
        self.request(|respond_to| SessionMessage::SetMic {
            enabled: None,
            respond_to,
        })
        .await?
    }

    /// Set the camera state. Idempotent.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the device rejected the change.
    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<Option<bool>, SessionError> {
        self.request(|respond_to| SessionMessage::SetCamera {
            enabled: Some(enabled),
            respond_to,
        })
        .await?
    }

    /// Set the microphone state. Idempotent.
    ///
    /// # Errors
    ///
    /// `SessionError::DeviceUnavailable` if the device rejected the change.
    pub async fn set_mic_enabled(&self, enabled: bool) -> Result<Option<bool>, SessionError> {
        self.request(|respond_to| SessionMessage::SetMic {
            enabled: Some(enabled),
            respond_to,
        })
        .await?
    }

    /// Raise or lower the local hand. Returns `None` unless `Connected`.
    ///
    /// # Errors
    ///
    /// `SessionError::Internal` if the coordinator is gone.
    pub async fn set_hand_raised(&self, raised: bool) -> Result<Option<bool>, SessionError> {
        self.request(|respond_to| SessionMessage::SetHandRaised { raised, respond_to })
            .await
    }

    /// Snapshot of the session, taken inside the actor.
    ///
    /// # Errors
    ///
    /// `SessionError::Internal` if the coordinator is gone.
    pub async fn get_state(&self) -> Result<SessionView, SessionError> {
        self.request(|respond_to| SessionMessage::GetState { respond_to })
            .await
    }

    /// Receiver that observes every published view.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Shut the coordinator down, releasing everything like a leave.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Result of one join step task.
enum StepOutcome {
    Credential(Result<Credential, SessionError>),
    Connected(Result<mpsc::Receiver<TransportEvent>, SessionError>),
    /// Local devices opened and, if any did, the publish result.
    Media {
        acquisition: LocalAcquisition,
        publish: Result<(), TransportError>,
    },
    Cancelled,
}

/// Which step a join is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinPhase {
    Token,
    Connect,
    Media,
}

struct JoinStep {
    handle: JoinHandle<StepOutcome>,
    cancel_token: CancellationToken,
}

impl JoinStep {
    /// Spawn `work`, dropping it when the step is cancelled.
    fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = StepOutcome> + Send + 'static,
    {
        Self::spawn_with(|token| async move {
            tokio::select! {
                () = token.cancelled() => StepOutcome::Cancelled,
                outcome = work => outcome,
            }
        })
    }

    /// Spawn work that watches the cancel token itself, for steps that
    /// hold resources they must free before stopping.
    fn spawn_with<F, Fut>(work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(work(cancel_token.clone()));
        Self {
            handle,
            cancel_token,
        }
    }
}

/// A join in flight.
struct PendingJoin {
    attempt: u64,
    /// Running step; `None` between a step finishing and the next starting.
    step: Option<JoinStep>,
    phase: JoinPhase,
    connect_timeout: Duration,
    respond_to: oneshot::Sender<Result<JoinOutcome, SessionError>>,
    started: Instant,
}

/// The `SessionCoordinator` implementation.
pub struct SessionCoordinator {
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    view_tx: watch::Sender<SessionView>,
    token_client: Arc<dyn TokenClient>,
    transport: Arc<dyn MediaTransport>,
    registry: MediaTrackRegistry,
    roster: RosterManager,
    app_id: String,
    token_timeout: Duration,
    connect_timeout: Duration,
    state: SessionState,
    /// Kind of the error that ended the last session, while `Failed`.
    failure: Option<ErrorKind>,
    session: Option<Session>,
    hand_raised: bool,
    layout: LayoutDescriptor,
    /// Join attempt counter; each join gets a fresh number.
    attempt: u64,
    pending: Option<PendingJoin>,
    /// Open transport connection's event stream.
    events: Option<mpsc::Receiver<TransportEvent>>,
    /// Local tracks currently published.
    published: Vec<TrackHandle>,
    messages_processed: u64,
}

impl SessionCoordinator {
    /// Spawn a coordinator.
    ///
    /// Returns a handle and the task join handle.
    #[must_use]
    pub fn spawn(
        deps: SessionDeps,
        config: &Config,
        cancel_token: CancellationToken,
    ) -> (SessionCoordinatorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity);
        let (view_tx, view_rx) = watch::channel(SessionView::default());

        let actor = Self {
            receiver,
            cancel_token: cancel_token.clone(),
            view_tx,
            token_client: deps.token_client,
            transport: deps.transport,
            registry: MediaTrackRegistry::new(deps.devices),
            roster: RosterManager::new(),
            app_id: config.app_id.clone(),
            token_timeout: config.token_timeout,
            connect_timeout: config.connect_timeout,
            state: SessionState::Idle,
            failure: None,
            session: None,
            hand_raised: false,
            layout: LayoutDescriptor::default(),
            attempt: 0,
            pending: None,
            events: None,
            published: Vec::new(),
            messages_processed: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionCoordinatorHandle {
            sender,
            cancel_token,
            view: view_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor loop.
    #[instrument(skip_all, name = "session.actor.coordinator")]
    async fn run(mut self) {
        info!(target: "session.actor.coordinator", "SessionCoordinator started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "session.actor.coordinator",
                        "SessionCoordinator received cancellation signal"
                    );
                    self.shutdown().await;
                    break;
                }

                outcome = next_step_outcome(&mut self.pending) => {
                    self.handle_step(outcome).await;
                }

                event = next_event(&mut self.events) => {
                    self.handle_transport_event(event).await;
                }

                msg = self.receiver.recv() => {
                    if let Some(message) = msg {
                        self.handle_message(message).await;
                        self.messages_processed += 1;
                    } else {
                        info!(
                            target: "session.actor.coordinator",
                            "SessionCoordinator channel closed, exiting"
                        );
                        self.shutdown().await;
                        break;
                    }
                }
            }

            self.publish_view();
        }

        info!(
            target: "session.actor.coordinator",
            messages_processed = self.messages_processed,
            "SessionCoordinator stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                channel_id,
                identity,
                options,
                respond_to,
            } => {
                self.handle_join(channel_id, identity, options, respond_to)
                    .await;
            }

            SessionMessage::Leave { respond_to } => {
                self.handle_leave().await;
                let _ = respond_to.send(());
            }

            SessionMessage::SetCamera {
                enabled,
                respond_to,
            } => {
                let result = self.handle_set_media(MediaKind::Video, enabled).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SetMic {
                enabled,
                respond_to,
            } => {
                let result = self.handle_set_media(MediaKind::Audio, enabled).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SetHandRaised { raised, respond_to } => {
                let result = self.handle_hand_raised(raised);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.build_view());
            }
        }
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(channel_id = %channel_id, participant_id = %identity))]
    async fn handle_join(
        &mut self,
        channel_id: ChannelId,
        identity: ParticipantId,
        options: JoinOptions,
        respond_to: oneshot::Sender<Result<JoinOutcome, SessionError>>,
    ) {
        if !self.state.accepts_join() {
            debug!(
                target: "session.actor.coordinator",
                state = %self.state,
                "Join rejected, session already active"
            );
            metrics::record_join("rejected");
            let _ = respond_to.send(Err(SessionError::AlreadyActive(self.state)));
            return;
        }

        self.failure = None;
        self.attempt += 1;

        // Nothing is acquired yet, so these only record the requested state
        let _ = self.registry.set_camera_enabled(options.camera_enabled).await;
        let _ = self.registry.set_mic_enabled(options.mic_enabled).await;

        info!(
            target: "session.actor.coordinator",
            attempt = self.attempt,
            "Joining channel"
        );

        let token_timeout = options.token_timeout.unwrap_or(self.token_timeout);
        let step = {
            let client = Arc::clone(&self.token_client);
            let channel_id = channel_id.clone();
            let identity = identity.clone();
            JoinStep::spawn(async move {
                let result =
                    match tokio::time::timeout(token_timeout, client.acquire(&channel_id, &identity))
                        .await
                    {
                        Ok(Ok(credential)) => Ok(credential),
                        Ok(Err(e)) => Err(SessionError::TokenUnavailable(e.to_string())),
                        Err(_) => Err(SessionError::TimeoutExceeded("token acquisition")),
                    };
                StepOutcome::Credential(result)
            })
        };

        self.session = Some(Session::new(channel_id, identity));
        self.pending = Some(PendingJoin {
            attempt: self.attempt,
            step: Some(step),
            phase: JoinPhase::Token,
            connect_timeout: options.connect_timeout.unwrap_or(self.connect_timeout),
            respond_to,
            started: Instant::now(),
        });
        self.transition(SessionState::Acquiring);
    }

    async fn handle_step(&mut self, outcome: Result<StepOutcome, JoinError>) {
        // The finished handle must not be polled again
        if let Some(pending) = self.pending.as_mut() {
            pending.step = None;
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(target: "session.actor.coordinator", error = %e, "Join step task failed");
                self.fail(SessionError::Internal(format!("join step failed: {e}")))
                    .await;
                return;
            }
        };

        match outcome {
            StepOutcome::Credential(Ok(credential)) => self.start_connect(credential),
            StepOutcome::Connected(Ok(events)) => {
                self.events = Some(events);
                self.start_media();
            }
            StepOutcome::Media {
                acquisition,
                publish,
            } => self.finish_join(acquisition, publish).await,
            StepOutcome::Credential(Err(e)) | StepOutcome::Connected(Err(e)) => {
                self.fail(e).await;
            }
            StepOutcome::Cancelled => {
                // Steps are only cancelled by abandon_attempt, which drops them first
                if let Some(pending) = self.pending.take() {
                    let _ = pending.respond_to.send(Err(SessionError::Cancelled));
                }
                self.teardown().await;
                self.transition(SessionState::Idle);
            }
        }
    }

    fn start_connect(&mut self, credential: Credential) {
        let (Some(session), Some(pending)) = (self.session.as_mut(), self.pending.as_mut()) else {
            self.pending = None;
            return;
        };
        session.credential = Some(credential.clone());

        let params = ConnectParams {
            app_id: self.app_id.clone(),
            channel: session.channel_id.clone(),
            credential,
            identity: session.local_participant_id.clone(),
        };

        debug!(
            target: "session.actor.coordinator",
            attempt = pending.attempt,
            "Credential acquired, connecting transport"
        );

        let transport = Arc::clone(&self.transport);
        let connect_timeout = pending.connect_timeout;
        pending.phase = JoinPhase::Connect;
        pending.step = Some(JoinStep::spawn(async move {
            let result = match tokio::time::timeout(connect_timeout, transport.connect(params)).await
            {
                Ok(Ok(events)) => Ok(events),
                Ok(Err(e)) => Err(SessionError::TransportConnectFailed(e.to_string())),
                Err(_) => {
                    // The dropped connect may have opened something
                    transport.leave().await;
                    Err(SessionError::TimeoutExceeded("transport connect"))
                }
            };
            StepOutcome::Connected(result)
        }));

        self.transition(SessionState::Connecting);
    }

    /// Transport is up: open devices and publish what opened, off the actor.
    fn start_media(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        debug!(
            target: "session.actor.coordinator",
            attempt = pending.attempt,
            "Transport connected, opening local media"
        );

        let devices = self.registry.devices();
        let transport = Arc::clone(&self.transport);
        let camera_wanted = self.registry.is_enabled(MediaKind::Video);
        let mic_wanted = self.registry.is_enabled(MediaKind::Audio);

        pending.phase = JoinPhase::Media;
        pending.step = Some(JoinStep::spawn_with(move |cancel| async move {
            let Some(acquisition) =
                media::open_local(&devices, camera_wanted, mic_wanted, &cancel).await
            else {
                return StepOutcome::Cancelled;
            };

            let tracks = acquisition.tracks();
            if tracks.is_empty() {
                return StepOutcome::Media {
                    acquisition,
                    publish: Ok(()),
                };
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    acquisition.release(devices.as_ref()).await;
                    StepOutcome::Cancelled
                }
                publish = transport.publish(&tracks) => StepOutcome::Media { acquisition, publish },
            }
        }));
    }

    /// Local media is settled: take ownership of the tracks, report success.
    async fn finish_join(
        &mut self,
        acquisition: LocalAcquisition,
        publish: Result<(), TransportError>,
    ) {
        let tracks = acquisition.tracks();
        match self.registry.install_local(acquisition) {
            Ok(local) => {
                match publish {
                    Ok(()) => self.published = tracks,
                    Err(e) => warn!(
                        target: "session.actor.coordinator",
                        error = %e,
                        "Publishing local tracks failed, continuing receive-only"
                    ),
                }

                // Toggles made while the devices were opening
                if let Err(e) = self.registry.apply_requested().await {
                    warn!(
                        target: "session.actor.coordinator",
                        error = %e,
                        "Failed to apply requested media state"
                    );
                }

                if local.is_degraded() {
                    info!(
                        target: "session.actor.coordinator",
                        camera = local.camera_track.is_some(),
                        mic = local.mic_track.is_some(),
                        "Joined with degraded local media"
                    );
                }
            }
            Err(e) => warn!(
                target: "session.actor.coordinator",
                error = %e,
                "No local devices, continuing receive-only"
            ),
        }

        let Some(pending) = self.pending.take() else {
            return;
        };
        self.transition(SessionState::Connected);

        metrics::record_join("connected");
        metrics::record_join_duration(pending.started.elapsed());

        let outcome = self.session.as_ref().map(|session| JoinOutcome {
            channel_id: session.channel_id.clone(),
            local_participant_id: session.local_participant_id.clone(),
            local_media: self.registry.local_state().clone(),
        });

        info!(
            target: "session.actor.coordinator",
            attempt = pending.attempt,
            "Session connected"
        );

        let reply = outcome.ok_or_else(|| SessionError::Internal("session missing".to_string()));
        let _ = pending.respond_to.send(reply);
    }

    /// Drop the join in flight.
    ///
    /// Closes the transport only if a connect step was cut short; a
    /// connection that came up is closed by `teardown`, and one that failed
    /// never opened.
    async fn abandon_attempt(
        &mut self,
    ) -> Option<oneshot::Sender<Result<JoinOutcome, SessionError>>> {
        let pending = self.pending.take()?;

        if let Some(step) = pending.step {
            step.cancel_token.cancel();

            match tokio::time::timeout(ABANDON_GRACE, step.handle).await {
                // Finished before the cancel landed; nothing will install these
                Ok(Ok(StepOutcome::Media { acquisition, .. })) => {
                    acquisition.release(self.registry.devices().as_ref()).await;
                }
                Ok(_) => {}
                Err(_) => warn!(
                    target: "session.actor.coordinator",
                    attempt = pending.attempt,
                    "Abandoned join step did not stop in time"
                ),
            }

            if pending.phase == JoinPhase::Connect {
                self.transport.leave().await;
            }
        }

        debug!(
            target: "session.actor.coordinator",
            attempt = pending.attempt,
            "Join attempt abandoned"
        );

        Some(pending.respond_to)
    }

    // ------------------------------------------------------------------
    // Leave / failure
    // ------------------------------------------------------------------

    async fn handle_leave(&mut self) {
        match self.state {
            SessionState::Failed => {
                self.failure = None;
                self.transition(SessionState::Idle);
            }
            state if !state.is_active() => {
                debug!(target: "session.actor.coordinator", state = %state, "Leave ignored");
            }
            _ => {
                info!(target: "session.actor.coordinator", state = %self.state, "Leaving session");
                self.transition(SessionState::Leaving);
                if let Some(respond_to) = self.abandon_attempt().await {
                    metrics::record_join("cancelled");
                    let _ = respond_to.send(Err(SessionError::Cancelled));
                }
                self.teardown().await;
                self.transition(SessionState::Idle);
            }
        }
    }

    /// End the session in `Failed`, releasing everything it holds.
    async fn fail(&mut self, error: SessionError) {
        warn!(
            target: "session.actor.coordinator",
            state = %self.state,
            error = %error,
            "Session failed"
        );

        let respond_to = self.abandon_attempt().await;
        self.teardown().await;
        self.failure = Some(error.kind());
        self.transition(SessionState::Failed);

        if let Some(respond_to) = respond_to {
            metrics::record_join("failed");
            let _ = respond_to.send(Err(error));
        }
    }

    /// Release local media, close the transport, forget remote state.
    async fn teardown(&mut self) {
        if !self.published.is_empty() {
            let tracks = std::mem::take(&mut self.published);
            if let Err(e) = self.transport.unpublish(&tracks).await {
                warn!(target: "session.actor.coordinator", error = %e, "Unpublish failed");
            }
        }

        self.registry.release_local().await;

        if self.events.take().is_some() {
            self.transport.leave().await;
        }

        self.registry.clear_remote();
        self.roster.clear();
        self.hand_raised = false;
        self.session = None;
        self.update_layout();
    }

    async fn shutdown(&mut self) {
        if !self.state.is_active() {
            return;
        }
        self.handle_leave().await;
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        let Some(event) = event else {
            self.fail(SessionError::TransportFault("event stream closed".to_string()))
                .await;
            return;
        };

        metrics::record_transport_event(event.as_str());
        debug!(target: "session.actor.coordinator", event = event.as_str(), "Transport event");

        let size_changed = match event {
            TransportEvent::Joined { participant_id } => self.roster.on_joined(&participant_id),

            TransportEvent::Published {
                participant_id,
                kind,
            } => {
                let subscribe = self.transport.subscribe(&participant_id, kind);
                match tokio::time::timeout(self.connect_timeout, subscribe).await {
                    Ok(Ok(track)) => {
                        self.registry.attach_remote(&participant_id, track);
                        self.roster.on_published(&participant_id, kind)
                    }
                    Ok(Err(e)) => {
                        warn!(
                            target: "session.actor.coordinator",
                            participant_id = %participant_id,
                            kind = %kind,
                            error = %e,
                            "Subscribe failed, track skipped"
                        );
                        false
                    }
                    Err(_) => {
                        warn!(
                            target: "session.actor.coordinator",
                            participant_id = %participant_id,
                            kind = %kind,
                            "Subscribe timed out, track skipped"
                        );
                        false
                    }
                }
            }

            TransportEvent::Unpublished {
                participant_id,
                kind,
            } => {
                self.registry.detach_remote(&participant_id, kind);
                self.roster.on_unpublished(&participant_id, kind)
            }

            TransportEvent::Left { participant_id } => {
                self.registry.detach_all_remote(&participant_id);
                self.roster.on_left(&participant_id)
            }

            TransportEvent::Fault { reason } => {
                self.fail(SessionError::TransportFault(reason)).await;
                return;
            }
        };

        debug_assert_eq!(self.roster.keys(), self.registry.remote_keys());

        if size_changed {
            self.update_layout();
        }
    }

    // ------------------------------------------------------------------
    // Local controls
    // ------------------------------------------------------------------

    async fn handle_set_media(
        &mut self,
        kind: MediaKind,
        enabled: Option<bool>,
    ) -> Result<Option<bool>, SessionError> {
        if !self.state.accepts_media_controls() {
            debug!(
                target: "session.actor.coordinator",
                state = %self.state,
                kind = %kind,
                "Media control ignored"
            );
            return Ok(None);
        }

        let target = enabled.unwrap_or_else(|| !self.registry.is_enabled(kind));
        match kind {
            MediaKind::Video => self.registry.set_camera_enabled(target).await?,
            MediaKind::Audio => self.registry.set_mic_enabled(target).await?,
        };

        Ok(Some(self.registry.is_enabled(kind)))
    }

    fn handle_hand_raised(&mut self, raised: bool) -> Option<bool> {
        if self.state != SessionState::Connected {
            return None;
        }
        self.hand_raised = raised;
        Some(raised)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            debug!(
                target: "session.actor.coordinator",
                from = %self.state,
                to = %to,
                "State transition"
            );
            metrics::record_state_transition(to.as_str());
            self.state = to;
        }
        self.publish_view();
    }

    fn update_layout(&mut self) {
        let size = self.roster.len();
        self.layout = layout::project(size);
        metrics::set_roster_size(size);
    }

    fn build_view(&self) -> SessionView {
        SessionView {
            state: self.state,
            failure: self.failure,
            channel_id: self.session.as_ref().map(|s| s.channel_id.clone()),
            local_participant_id: self
                .session
                .as_ref()
                .map(|s| s.local_participant_id.clone()),
            local_media: self.registry.local_state().clone(),
            hand_raised: self.hand_raised,
            participants: self.roster.snapshot(&self.registry),
            layout: self.layout,
        }
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(self.build_view());
    }
}

/// Completion of the running join step; pends forever when there is none.
async fn next_step_outcome(slot: &mut Option<PendingJoin>) -> Result<StepOutcome, JoinError> {
    match slot.as_mut().and_then(|p| p.step.as_mut()) {
        Some(step) => (&mut step.handle).await,
        None => pending().await,
    }
}

/// Next transport event; pends forever while disconnected.
async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}
