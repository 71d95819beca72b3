//! Channel-scoped chat.
//!
//! Messages live in an append-only [`ChatLog`]; the log assigns each message
//! a [`MessageId`] that fixes its position in the channel's total order.
//! [`ChatStream`] is the client surface: `append` records a message and
//! `subscribe` replays the channel from the start, then tails it.
//!
//! Chat does not depend on the media session and keeps working whatever
//! state the coordinator is in.

mod in_memory;
mod redis_stream;

pub use in_memory::InMemoryChatLog;
pub use redis_stream::RedisChatLog;

use crate::errors::SessionError;
use crate::observability::metrics;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ChannelId, ParticipantId};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum messages fetched per log read.
const READ_BATCH: usize = 100;

/// Log-assigned message position: milliseconds plus a sequence number
/// within that millisecond. Ordering is lexicographic on the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId {
    pub millis: u64,
    pub seq: u64,
}

impl MessageId {
    #[must_use]
    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Wall-clock time encoded in the id.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        i64::try_from(self.millis)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for MessageId {
    type Err = ChatLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (millis, seq) = s
            .split_once('-')
            .ok_or_else(|| ChatLogError::Decode(format!("malformed message id '{s}'")))?;
        let millis = millis
            .parse()
            .map_err(|_| ChatLogError::Decode(format!("malformed message id '{s}'")))?;
        let seq = seq
            .parse()
            .map_err(|_| ChatLogError::Decode(format!("malformed message id '{s}'")))?;
        Ok(Self { millis, seq })
    }
}

/// One recorded chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub text: String,
    pub sender: Option<ParticipantId>,
    pub timestamp: DateTime<Utc>,
}

/// Chat log failures.
#[derive(Debug, Clone, Error)]
pub enum ChatLogError {
    /// Storage backend failed or is unreachable.
    #[error("Chat log backend error: {0}")]
    Backend(String),

    /// Stored entry could not be decoded.
    #[error("Chat log decode error: {0}")]
    Decode(String),
}

/// Append-only, per-channel message log.
#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Durably record a message and return it with its assigned id.
    async fn append(
        &self,
        channel: &ChannelId,
        text: &str,
        sender: Option<&ParticipantId>,
    ) -> Result<ChatMessage, ChatLogError>;

    /// Messages with ids strictly greater than `after` (all when `None`),
    /// oldest first, at most `limit`. When nothing is available, waits up to
    /// `block` for new messages before returning an empty batch.
    async fn read_after(
        &self,
        channel: &ChannelId,
        after: Option<MessageId>,
        limit: usize,
        block: Duration,
    ) -> Result<Vec<ChatMessage>, ChatLogError>;
}

/// Client surface for sending and following channel chat.
#[derive(Clone)]
pub struct ChatStream {
    log: Arc<dyn ChatLog>,
    poll_interval: Duration,
    buffer: usize,
}

impl ChatStream {
    /// Create a stream over `log`.
    ///
    /// `poll_interval` bounds each tail wait and the back-off after a read
    /// error; `buffer` is the per-subscription queue depth.
    #[must_use]
    pub fn new(log: Arc<dyn ChatLog>, poll_interval: Duration, buffer: usize) -> Self {
        Self {
            log,
            poll_interval,
            buffer: buffer.max(1),
        }
    }

    /// Record an anonymous message.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidInput` for empty text, `SessionError::SendFailed`
    /// if the log did not record it.
    pub async fn append(
        &self,
        channel_id: &ChannelId,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        self.append_from(channel_id, None, text).await
    }

    /// Record a message attributed to `sender`.
    ///
    /// # Errors
    ///
    /// See [`ChatStream::append`].
    pub async fn append_from(
        &self,
        channel_id: &ChannelId,
        sender: Option<&ParticipantId>,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Message text must not be empty".to_string(),
            ));
        }

        match self.log.append(channel_id, text, sender).await {
            Ok(message) => {
                metrics::record_chat_append("success");
                debug!(
                    target: "session.chat",
                    channel_id = %channel_id,
                    message_id = %message.id,
                    "Chat message recorded"
                );
                Ok(message)
            }
            Err(e) => {
                metrics::record_chat_append("error");
                warn!(
                    target: "session.chat",
                    channel_id = %channel_id,
                    error = %e,
                    "Chat append failed"
                );
                Err(SessionError::SendFailed(e.to_string()))
            }
        }
    }

    /// Follow a channel from its first message.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn subscribe(&self, channel_id: &ChannelId) -> ChatSubscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel_token = CancellationToken::new();

        tokio::spawn(pump(
            Arc::clone(&self.log),
            channel_id.clone(),
            tx,
            cancel_token.clone(),
            self.poll_interval,
        ));

        debug!(target: "session.chat", channel_id = %channel_id, "Chat subscription opened");

        ChatSubscription {
            channel_id: channel_id.clone(),
            receiver: rx,
            cancel_token,
        }
    }
}

/// Live, id-ascending view of one channel. Dropping it stops delivery.
pub struct ChatSubscription {
    channel_id: ChannelId,
    receiver: mpsc::Receiver<ChatMessage>,
    cancel_token: CancellationToken,
}

impl ChatSubscription {
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Next message, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<ChatMessage> {
        self.receiver.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_next(&mut self) -> Option<ChatMessage> {
        self.receiver.try_recv().ok()
    }

    /// Stop delivery. Messages already queued can still be drained.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for ChatSubscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Feed one subscription: replay, then tail until cancelled.
async fn pump(
    log: Arc<dyn ChatLog>,
    channel_id: ChannelId,
    tx: mpsc::Sender<ChatMessage>,
    cancel_token: CancellationToken,
    poll_interval: Duration,
) {
    let mut cursor: Option<MessageId> = None;

    loop {
        let read = tokio::select! {
            () = cancel_token.cancelled() => break,
            read = log.read_after(&channel_id, cursor, READ_BATCH, poll_interval) => read,
        };

        match read {
            Ok(messages) => {
                for message in messages {
                    // Never deliver an id twice or out of order
                    if cursor.is_some_and(|c| message.id <= c) {
                        continue;
                    }
                    cursor = Some(message.id);

                    tokio::select! {
                        () = cancel_token.cancelled() => return,
                        sent = tx.send(message) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: "session.chat",
                    channel_id = %channel_id,
                    error = %e,
                    "Chat read failed, retrying"
                );
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    () = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }

    debug!(target: "session.chat", channel_id = %channel_id, "Chat subscription closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn channel(s: &str) -> ChannelId {
        ChannelId::new(s).unwrap()
    }

    fn stream(log: Arc<dyn ChatLog>) -> ChatStream {
        ChatStream::new(log, Duration::from_millis(50), 16)
    }

    #[test]
    fn test_message_id_order_and_format() {
        let a = MessageId::new(1000, 5);
        let b = MessageId::new(1001, 0);
        assert!(a < b);
        assert!(MessageId::new(1000, 1) < a);
        assert_eq!(a.to_string(), "1000-5");
        assert_eq!("1000-5".parse::<MessageId>().unwrap(), a);
        assert!("1000".parse::<MessageId>().is_err());
        assert!("x-1".parse::<MessageId>().is_err());
    }

    #[test]
    fn test_message_id_timestamp() {
        let id = MessageId::new(1_700_000_000_123, 0);
        assert_eq!(id.timestamp().timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_message_serializes_for_presentation() {
        let message = ChatMessage {
            id: MessageId::new(1_700_000_000_000, 1),
            channel_id: channel("room1"),
            text: "hi".to_string(),
            sender: Some(ParticipantId::new("42").unwrap()),
            timestamp: MessageId::new(1_700_000_000_000, 1).timestamp(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["channel_id"], "room1");
        assert_eq!(json["sender"], "42");
        assert_eq!(json["id"]["seq"], 1);
    }

    #[tokio::test]
    async fn test_append_rejects_empty_text() {
        let chat = stream(Arc::new(InMemoryChatLog::new()));
        let result = chat.append(&channel("room1"), "   ").await;
        assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_subscribe_replays_then_tails() {
        let chat = stream(Arc::new(InMemoryChatLog::new()));
        let room = channel("room1");

        chat.append(&room, "first").await.unwrap();
        chat.append(&room, "second").await.unwrap();

        let mut sub = chat.subscribe(&room);
        assert_eq!(sub.next().await.unwrap().text, "first");
        assert_eq!(sub.next().await.unwrap().text, "second");

        chat.append(&room, "third").await.unwrap();
        assert_eq!(sub.next().await.unwrap().text, "third");
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let chat = stream(Arc::new(InMemoryChatLog::new()));
        chat.append(&channel("a"), "for a").await.unwrap();
        chat.append(&channel("b"), "for b").await.unwrap();

        let mut sub = chat.subscribe(&channel("b"));
        let message = sub.next().await.unwrap();
        assert_eq!(message.text, "for b");
        assert_eq!(message.channel_id, channel("b"));
    }

    #[tokio::test]
    async fn test_resubscribe_restarts_from_beginning() {
        let chat = stream(Arc::new(InMemoryChatLog::new()));
        let room = channel("room1");
        chat.append(&room, "hello").await.unwrap();

        let mut first = chat.subscribe(&room);
        assert_eq!(first.next().await.unwrap().text, "hello");
        drop(first);

        let mut second = chat.subscribe(&room);
        assert_eq!(second.next().await.unwrap().text, "hello");
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let chat = stream(Arc::new(InMemoryChatLog::new()));
        let mut sub = chat.subscribe(&channel("room1"));
        sub.close();
        assert!(sub.next().await.is_none());
    }

    /// Log that returns every batch twice and fails its second read.
    struct StutteringLog {
        inner: InMemoryChatLog,
        reads: AtomicU32,
    }

    #[async_trait]
    impl ChatLog for StutteringLog {
        async fn append(
            &self,
            channel: &ChannelId,
            text: &str,
            sender: Option<&ParticipantId>,
        ) -> Result<ChatMessage, ChatLogError> {
            self.inner.append(channel, text, sender).await
        }

        async fn read_after(
            &self,
            channel: &ChannelId,
            after: Option<MessageId>,
            limit: usize,
            block: Duration,
        ) -> Result<Vec<ChatMessage>, ChatLogError> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(ChatLogError::Backend("connection reset".to_string()));
            }
            let mut all = self.inner.read_after(channel, after, limit, block).await?;
            all.extend(all.clone());
            Ok(all)
        }
    }

    #[tokio::test]
    async fn test_subscription_never_repeats_ids_and_survives_errors() {
        let log = Arc::new(StutteringLog {
            inner: InMemoryChatLog::new(),
            reads: AtomicU32::new(0),
        });
        let chat = stream(log);
        let room = channel("room1");
        chat.append(&room, "one").await.unwrap();

        let mut sub = chat.subscribe(&room);
        assert_eq!(sub.next().await.unwrap().text, "one");

        chat.append(&room, "two").await.unwrap();
        let next = sub.next().await.unwrap();
        assert_eq!(next.text, "two");
        assert!(sub.try_next().is_none());
    }

    /// Log whose backend is down.
    struct DownLog;

    #[async_trait]
    impl ChatLog for DownLog {
        async fn append(
            &self,
            _channel: &ChannelId,
            _text: &str,
            _sender: Option<&ParticipantId>,
        ) -> Result<ChatMessage, ChatLogError> {
            Err(ChatLogError::Backend("refused".to_string()))
        }

        async fn read_after(
            &self,
            _channel: &ChannelId,
            _after: Option<MessageId>,
            _limit: usize,
            _block: Duration,
        ) -> Result<Vec<ChatMessage>, ChatLogError> {
            Err(ChatLogError::Backend("refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_append_failure_is_send_failed() {
        let chat = stream(Arc::new(DownLog));
        let result = chat.append(&channel("room1"), "hi").await;
        assert!(matches!(result, Err(SessionError::SendFailed(_))));
    }
}
