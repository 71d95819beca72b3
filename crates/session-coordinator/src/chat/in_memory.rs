//! Process-local chat log.

use super::{ChatLog, ChatLogError, ChatMessage, MessageId};

use async_trait::async_trait;
use chrono::Utc;
use common::types::{ChannelId, ParticipantId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Default)]
struct LogState {
    channels: HashMap<ChannelId, Vec<ChatMessage>>,
    last_id: Option<MessageId>,
}

/// Chat log kept in memory. Ids are strictly increasing across all channels.
#[derive(Default)]
pub struct InMemoryChatLog {
    state: Mutex<LogState>,
    appended: Notify,
}

impl InMemoryChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored for `channel`.
    pub async fn message_count(&self, channel: &ChannelId) -> usize {
        self.state
            .lock()
            .await
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }

    fn next_id(last: Option<MessageId>) -> MessageId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        match last {
            Some(last) if last.millis >= now => MessageId::new(last.millis, last.seq + 1),
            _ => MessageId::new(now, 0),
        }
    }

    async fn collect(
        &self,
        channel: &ChannelId,
        after: Option<MessageId>,
        limit: usize,
    ) -> Vec<ChatMessage> {
        let state = self.state.lock().await;
        let Some(messages) = state.channels.get(channel) else {
            return Vec::new();
        };
        let start = after.map_or(0, |after| messages.partition_point(|m| m.id <= after));
        messages.iter().skip(start).take(limit).cloned().collect()
    }
}

#[async_trait]
impl ChatLog for InMemoryChatLog {
    async fn append(
        &self,
        channel: &ChannelId,
        text: &str,
        sender: Option<&ParticipantId>,
    ) -> Result<ChatMessage, ChatLogError> {
        let message = {
            let mut state = self.state.lock().await;
            let id = Self::next_id(state.last_id);
            state.last_id = Some(id);

            let message = ChatMessage {
                id,
                channel_id: channel.clone(),
                text: text.to_string(),
                sender: sender.cloned(),
                timestamp: id.timestamp(),
            };
            state
                .channels
                .entry(channel.clone())
                .or_default()
                .push(message.clone());
            message
        };

        self.appended.notify_waiters();
        Ok(message)
    }

    async fn read_after(
        &self,
        channel: &ChannelId,
        after: Option<MessageId>,
        limit: usize,
        block: Duration,
    ) -> Result<Vec<ChatMessage>, ChatLogError> {
        let deadline = Instant::now() + block;

        loop {
            // Register interest before looking, so an append in between is not missed
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.collect(channel, after, limit).await;
            if !batch.is_empty() || block.is_zero() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}
