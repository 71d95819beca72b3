//! Session coordinator configuration.
//!
//! Configuration is loaded from environment variables. The chat Redis URL may
//! embed a password and is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bound on token acquisition, in milliseconds.
pub const DEFAULT_TOKEN_TIMEOUT_MS: u64 = 10_000;

/// Default bound on transport connect, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Default coordinator mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default per-subscription chat queue depth.
pub const DEFAULT_CHAT_SUBSCRIPTION_BUFFER: usize = 256;

/// Default chat tail wait and error back-off, in milliseconds.
pub const DEFAULT_CHAT_POLL_INTERVAL_MS: u64 = 1_000;

/// Session coordinator configuration.
#[derive(Clone)]
pub struct Config {
    /// Token endpoint URL, queried with `channelName` and `uid`.
    pub token_endpoint: String,

    /// Transport application identifier passed on connect.
    pub app_id: String,

    /// Bound on token acquisition (default: 10s).
    pub token_timeout: Duration,

    /// Bound on transport connect (default: 15s).
    pub connect_timeout: Duration,

    /// Coordinator mailbox capacity (default: 64).
    pub mailbox_capacity: usize,

    /// Per-subscription chat queue depth (default: 256).
    pub chat_subscription_buffer: usize,

    /// Redis URL for the chat log. `None` selects the in-memory log.
    pub chat_redis_url: Option<SecretString>,

    /// Chat tail wait and error back-off (default: 1s).
    pub chat_poll_interval: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token_endpoint", &self.token_endpoint)
            .field("app_id", &self.app_id)
            .field("token_timeout", &self.token_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("chat_subscription_buffer", &self.chat_subscription_buffer)
            .field(
                "chat_redis_url",
                &self.chat_redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("chat_poll_interval", &self.chat_poll_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingEnvVar` when a required variable is absent,
    /// `ConfigError::InvalidValue` when a value does not parse or is zero
    /// where a positive value is required.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_endpoint = required(vars, "SESSION_TOKEN_ENDPOINT")?;
        if !token_endpoint.starts_with("http://") && !token_endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "SESSION_TOKEN_ENDPOINT must be an http(s) URL, got '{token_endpoint}'"
            )));
        }

        let app_id = required(vars, "SESSION_APP_ID")?;

        let token_timeout = Duration::from_millis(positive(
            vars,
            "SESSION_TOKEN_TIMEOUT_MS",
            DEFAULT_TOKEN_TIMEOUT_MS,
        )?);

        let connect_timeout = Duration::from_millis(positive(
            vars,
            "SESSION_CONNECT_TIMEOUT_MS",
            DEFAULT_CONNECT_TIMEOUT_MS,
        )?);

        let mailbox_capacity = positive(vars, "SESSION_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?;

        let chat_subscription_buffer = positive(
            vars,
            "CHAT_SUBSCRIPTION_BUFFER",
            DEFAULT_CHAT_SUBSCRIPTION_BUFFER,
        )?;

        let chat_redis_url = vars
            .get("CHAT_REDIS_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|s| SecretString::from(s.clone()));

        let chat_poll_interval = Duration::from_millis(positive(
            vars,
            "CHAT_POLL_INTERVAL_MS",
            DEFAULT_CHAT_POLL_INTERVAL_MS,
        )?);

        Ok(Config {
            token_endpoint,
            app_id,
            token_timeout,
            connect_timeout,
            mailbox_capacity,
            chat_subscription_buffer,
            chat_redis_url,
            chat_poll_interval,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse an optional positive number, falling back to `default` when unset.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };
    let value: T = raw.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(format!("{name} must be a positive integer, got '{raw}'"))
    })?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(value)
}
