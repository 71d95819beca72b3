//! Scriptable token client.

use async_trait::async_trait;
use common::secret::SecretString;
use common::token_client::{Credential, TokenClient, TokenError};
use common::types::{ChannelId, ParticipantId};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 2100-01-01T00:00:00Z.
const FAR_FUTURE: i64 = 4_102_444_800;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(TokenError),
    Hang,
}

#[derive(Debug)]
struct Inner {
    behavior: Behavior,
    delay: Duration,
    requests: Vec<(ChannelId, ParticipantId)>,
}

/// Token client whose answer is chosen by the test.
#[derive(Debug, Clone)]
pub struct MockTokenClient {
    inner: Arc<Mutex<Inner>>,
}

impl MockTokenClient {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                behavior,
                delay: Duration::ZERO,
                requests: Vec::new(),
            })),
        }
    }

    /// Issue a credential that never expires within a test run.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    /// Fail every request with `error`.
    #[must_use]
    pub fn failing(error: TokenError) -> Self {
        Self::with_behavior(Behavior::Fail(error))
    }

    /// Fail every request as an HTTP 500 would.
    #[must_use]
    pub fn server_error() -> Self {
        Self::failing(TokenError::HttpError("Status 500".to_string()))
    }

    /// Never answer.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    /// Answer only after `delay` (use with a paused clock).
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().delay = delay;
        self
    }

    /// Number of credential requests received.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    /// Channel and identity of every request, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<(ChannelId, ParticipantId)> {
        self.inner.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl TokenClient for MockTokenClient {
    async fn acquire(
        &self,
        channel: &ChannelId,
        identity: &ParticipantId,
    ) -> Result<Credential, TokenError> {
        let (behavior, delay) = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push((channel.clone(), identity.clone()));
            (inner.behavior.clone(), inner.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            Behavior::Succeed => Ok(Credential::new(
                SecretString::from(format!("token-{channel}-{identity}")),
                FAR_FUTURE,
            )),
            Behavior::Fail(error) => Err(error),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
