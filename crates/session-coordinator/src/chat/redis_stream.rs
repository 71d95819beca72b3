//! Redis Streams chat log.
//!
//! # Key Patterns
//!
//! - `chat:{channel}:messages` - one stream per channel, entries carry
//!   `text` and optionally `sender`
//!
//! Stream entry ids (`<millis>-<seq>`) are the message ids, so Redis fixes
//! the total order and the timestamp of every message.
//!
//! Appends share one multiplexed connection. A blocking `XREAD` holds its
//! connection until it returns, so blocking reads check out a dedicated
//! connection from a small idle pool instead.

use super::{ChatLog, ChatLogError, ChatMessage, MessageId};

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::{ChannelId, ParticipantId};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

/// Idle blocking-read connections kept for reuse.
const MAX_IDLE_READERS: usize = 8;

fn stream_key(channel: &ChannelId) -> String {
    format!("chat:{channel}:messages")
}

/// Chat log backed by one Redis stream per channel.
pub struct RedisChatLog {
    client: Client,
    writer: MultiplexedConnection,
    idle_readers: Mutex<Vec<MultiplexedConnection>>,
}

impl RedisChatLog {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `ChatLogError::Backend` if the URL is invalid or the server
    /// is unreachable.
    pub async fn connect(redis_url: &SecretString) -> Result<Self, ChatLogError> {
        let client = Client::open(redis_url.expose_secret()).map_err(|e| {
            // Do NOT log the URL, it may carry credentials
            error!(target: "session.chat.redis", error = %e, "Failed to open Redis client");
            ChatLogError::Backend(format!("Failed to open Redis client: {e}"))
        })?;

        let writer = client.get_multiplexed_async_connection().await.map_err(|e| {
            error!(target: "session.chat.redis", error = %e, "Failed to connect to Redis");
            ChatLogError::Backend(format!("Failed to connect to Redis: {e}"))
        })?;

        Ok(Self {
            client,
            writer,
            idle_readers: Mutex::new(Vec::new()),
        })
    }

    async fn checkout_reader(&self) -> Result<MultiplexedConnection, ChatLogError> {
        if let Some(conn) = self.idle_readers.lock().await.pop() {
            return Ok(conn);
        }
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ChatLogError::Backend(format!("Failed to open reader connection: {e}")))
    }

    async fn checkin_reader(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle_readers.lock().await;
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
    }
}

#[async_trait]
impl ChatLog for RedisChatLog {
    #[instrument(skip_all, fields(channel_id = %channel))]
    async fn append(
        &self,
        channel: &ChannelId,
        text: &str,
        sender: Option<&ParticipantId>,
    ) -> Result<ChatMessage, ChatLogError> {
        let mut conn = self.writer.clone();
        let key = stream_key(channel);

        let mut fields: Vec<(&str, &str)> = vec![("text", text)];
        if let Some(sender) = sender {
            fields.push(("sender", sender.as_str()));
        }

        let raw_id: String = conn.xadd(&key, "*", fields.as_slice()).await.map_err(|e| {
            warn!(target: "session.chat.redis", error = %e, "XADD failed");
            ChatLogError::Backend(format!("XADD failed: {e}"))
        })?;

        debug!(target: "session.chat.redis", message_id = %raw_id, "Appended to stream");

        decode_entry(
            channel,
            &raw_id,
            Some(text.to_string()),
            sender.map(|s| s.as_str().to_string()),
        )
    }

    #[instrument(skip_all, fields(channel_id = %channel))]
    async fn read_after(
        &self,
        channel: &ChannelId,
        after: Option<MessageId>,
        limit: usize,
        block: Duration,
    ) -> Result<Vec<ChatMessage>, ChatLogError> {
        let key = stream_key(channel);
        let cursor = after.map_or_else(|| "0".to_string(), |id| id.to_string());

        let mut options = StreamReadOptions::default().count(limit);
        let block_ms = usize::try_from(block.as_millis()).unwrap_or(usize::MAX);
        if block_ms > 0 {
            options = options.block(block_ms);
        }

        let reply: Result<Option<StreamReadReply>, redis::RedisError> = if block_ms > 0 {
            let mut conn = self.checkout_reader().await?;
            let reply = conn.xread_options(&[&key], &[&cursor], &options).await;
            if reply.is_ok() {
                self.checkin_reader(conn).await;
            }
            reply
        } else {
            let mut conn = self.writer.clone();
            conn.xread_options(&[&key], &[&cursor], &options).await
        };

        let reply = reply.map_err(|e| {
            warn!(target: "session.chat.redis", error = %e, "XREAD failed");
            ChatLogError::Backend(format!("XREAD failed: {e}"))
        })?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        // A malformed entry is skipped rather than wedging every subscriber on it
        let messages = reply
            .keys
            .into_iter()
            .flat_map(|stream| stream.ids)
            .filter_map(|entry| {
                decode_entry(
                    channel,
                    &entry.id,
                    entry.get::<String>("text"),
                    entry.get::<String>("sender"),
                )
                .inspect_err(|e| {
                    warn!(target: "session.chat.redis", error = %e, "Skipping stream entry");
                })
                .ok()
            })
            .collect();

        Ok(messages)
    }
}

/// Build a message from the parts of a stream entry.
fn decode_entry(
    channel: &ChannelId,
    raw_id: &str,
    text: Option<String>,
    sender: Option<String>,
) -> Result<ChatMessage, ChatLogError> {
    let id: MessageId = raw_id.parse()?;
    let text =
        text.ok_or_else(|| ChatLogError::Decode(format!("entry {raw_id} has no text field")))?;
    let sender = sender.and_then(|s| ParticipantId::new(s).ok());

    Ok(ChatMessage {
        id,
        channel_id: channel.clone(),
        text,
        sender,
        timestamp: id.timestamp(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn channel() -> ChannelId {
        ChannelId::new("room1").unwrap()
    }

    #[test]
    fn test_stream_key_format() {
        assert_eq!(stream_key(&channel()), "chat:room1:messages");
    }

    #[test]
    fn test_decode_entry() {
        let message = decode_entry(
            &channel(),
            "1700000000000-2",
            Some("hello".to_string()),
            Some("4711".to_string()),
        )
        .unwrap();

        assert_eq!(message.id, MessageId::new(1_700_000_000_000, 2));
        assert_eq!(message.text, "hello");
        assert_eq!(message.sender.unwrap().as_str(), "4711");
        assert_eq!(message.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_decode_entry_without_sender() {
        let message =
            decode_entry(&channel(), "5-0", Some("anon".to_string()), None).unwrap();
        assert!(message.sender.is_none());
    }

    #[test]
    fn test_decode_entry_rejects_missing_text() {
        let result = decode_entry(&channel(), "5-0", None, None);
        assert!(matches!(result, Err(ChatLogError::Decode(_))));
    }

    #[test]
    fn test_decode_entry_rejects_bad_id() {
        let result = decode_entry(&channel(), "not-an-id", Some("x".to_string()), None);
        assert!(matches!(result, Err(ChatLogError::Decode(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let url = SecretString::from("not a redis url".to_string());
        let result = RedisChatLog::connect(&url).await;
        assert!(matches!(result, Err(ChatLogError::Backend(_))));
    }
}
