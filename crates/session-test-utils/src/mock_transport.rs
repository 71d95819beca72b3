//! In-process media transport.
//!
//! Records every call and lets the test push remote events into the open
//! connection with [`MockTransport::emit`].

use async_trait::async_trait;
use common::types::{ChannelId, MediaKind, ParticipantId};
use session_coordinator::media::TrackHandle;
use session_coordinator::transport::{ConnectParams, MediaTransport, TransportError, TransportEvent};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Event buffer of a mock connection.
const EVENT_BUFFER: usize = 64;

/// How `connect` answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail(String),
    /// Succeed after the delay (use with a paused clock).
    Delay(Duration),
    /// Never answer.
    Hang,
}

#[derive(Debug)]
struct Inner {
    connect: ConnectBehavior,
    fail_publish: bool,
    failing_subscribes: HashSet<(ParticipantId, MediaKind)>,
    hanging_subscribes: HashSet<(ParticipantId, MediaKind)>,
    events: Option<mpsc::Sender<TransportEvent>>,
    connects: Vec<(String, ChannelId, ParticipantId)>,
    published: Vec<TrackHandle>,
    unpublish_calls: usize,
    subscribes: Vec<(ParticipantId, MediaKind)>,
    leave_calls: usize,
}

/// Transport double.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Connects immediately; every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                connect: ConnectBehavior::Succeed,
                fail_publish: false,
                failing_subscribes: HashSet::new(),
                hanging_subscribes: HashSet::new(),
                events: None,
                connects: Vec::new(),
                published: Vec::new(),
                unpublish_calls: 0,
                subscribes: Vec::new(),
                leave_calls: 0,
            })),
        }
    }

    #[must_use]
    pub fn with_connect(self, behavior: ConnectBehavior) -> Self {
        self.inner.lock().unwrap().connect = behavior;
        self
    }

    /// Every `publish` fails.
    #[must_use]
    pub fn failing_publish(self) -> Self {
        self.inner.lock().unwrap().fail_publish = true;
        self
    }

    /// Subscribing to `kind` from `participant_id` fails.
    #[must_use]
    pub fn failing_subscribe(self, participant_id: ParticipantId, kind: MediaKind) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failing_subscribes
            .insert((participant_id, kind));
        self
    }

    /// Subscribing to `kind` from `participant_id` never completes.
    #[must_use]
    pub fn hanging_subscribe(self, participant_id: ParticipantId, kind: MediaKind) -> Self {
        self.inner
            .lock()
            .unwrap()
            .hanging_subscribes
            .insert((participant_id, kind));
        self
    }

    /// Deliver `event` on the open connection. Returns false when no
    /// connection is open.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = self.inner.lock().unwrap().events.clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drop the event stream, as a transport that died without a fault would.
    pub fn close_events(&self) {
        self.inner.lock().unwrap().events = None;
    }

    /// Whether a connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().events.is_some()
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().connects.len()
    }

    /// App id, channel and identity of every connect call.
    #[must_use]
    pub fn connects(&self) -> Vec<(String, ChannelId, ParticipantId)> {
        self.inner.lock().unwrap().connects.clone()
    }

    /// Tracks currently published.
    #[must_use]
    pub fn published(&self) -> Vec<TrackHandle> {
        self.inner.lock().unwrap().published.clone()
    }

    #[must_use]
    pub fn unpublish_count(&self) -> usize {
        self.inner.lock().unwrap().unpublish_calls
    }

    /// Arguments of every subscribe call, in order.
    #[must_use]
    pub fn subscribes(&self) -> Vec<(ParticipantId, MediaKind)> {
        self.inner.lock().unwrap().subscribes.clone()
    }

    #[must_use]
    pub fn leave_count(&self) -> usize {
        self.inner.lock().unwrap().leave_calls
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let behavior = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .connects
                .push((params.app_id, params.channel, params.identity));
            inner.connect.clone()
        };

        match behavior {
            ConnectBehavior::Succeed => {}
            ConnectBehavior::Fail(reason) => return Err(TransportError::Connect(reason)),
            ConnectBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            ConnectBehavior::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.inner.lock().unwrap().events = Some(tx);
        Ok(rx)
    }

    async fn publish(&self, tracks: &[TrackHandle]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_publish {
            return Err(TransportError::Publish("publish refused".to_string()));
        }
        inner.published.extend_from_slice(tracks);
        Ok(())
    }

    async fn unpublish(&self, tracks: &[TrackHandle]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.unpublish_calls += 1;
        inner.published.retain(|t| !tracks.contains(t));
        Ok(())
    }

    async fn subscribe(
        &self,
        participant_id: &ParticipantId,
        kind: MediaKind,
    ) -> Result<TrackHandle, TransportError> {
        let key = (participant_id.clone(), kind);
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.subscribes.push(key.clone());
            inner.hanging_subscribes.contains(&key)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let inner = self.inner.lock().unwrap();
        if inner.failing_subscribes.contains(&key) {
            return Err(TransportError::Subscribe {
                participant_id: participant_id.clone(),
                kind,
                reason: "track unavailable".to_string(),
            });
        }
        Ok(TrackHandle::new(kind))
    }

    async fn leave(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.leave_calls += 1;
        inner.events = None;
    }
}
