//! Join credential acquisition.
//!
//! A session needs one time-boxed credential per join, minted by an external
//! token endpoint for a `(channel, identity)` pair. This module provides:
//!
//! - [`TokenClient`]: the seam the session coordinator consumes
//! - [`HttpTokenClient`]: the HTTP implementation against the token endpoint
//! - [`Credential`]: the minted token (kept as `SecretString`) plus expiry
//!
//! # Wire format
//!
//! ```text
//! GET {endpoint}?channelName={channel}&uid={identity}
//! 200 {"token": "...", "expiresAt": 1700000000}
//! ```
//!
//! `credential` is accepted as an alias of `token`. When `expiresAt` is
//! missing the credential is assumed valid for [`DEFAULT_CREDENTIAL_LIFETIME`].
//!
//! # Retry
//!
//! There is none. A failed acquisition is reported once; the caller decides
//! whether to issue a fresh join.
//!
//! # Security
//!
//! - The token is stored as `SecretString` (never logged)
//! - Acquisition events are logged without values
//! - HTTP timeouts prevent hanging connections

use crate::secret::SecretString;
use crate::types::{ChannelId, ParticipantId};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime assumed for credentials whose response omits `expiresAt`.
pub const DEFAULT_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(3600);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while acquiring a join credential.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// Request parameters were rejected before any network call.
    #[error("Invalid token request: {0}")]
    InvalidRequest(String),

    /// HTTP client error or non-success status.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Endpoint refused to mint a credential (400, 401, 403).
    #[error("Token request rejected: {0}")]
    Rejected(String),

    /// Token response parsing failed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Credential
// =============================================================================

/// Time-boxed join credential for one channel and identity.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Opaque token handed to the transport on connect.
    pub token: SecretString,
    /// Expiration as a Unix timestamp (seconds).
    pub expires_at: i64,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub fn new(token: SecretString, expires_at: i64) -> Self {
        Self { token, expires_at }
    }

    /// Whether the credential is past its expiration time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at
    }
}

// =============================================================================
// Client seam
// =============================================================================

/// Source of join credentials.
#[async_trait]
pub trait TokenClient: Send + Sync {
    /// Request a credential for `identity` in `channel`.
    ///
    /// # Errors
    ///
    /// Returns a `TokenError` on any non-success outcome. Implementations
    /// must not retry.
    async fn acquire(
        &self,
        channel: &ChannelId,
        identity: &ParticipantId,
    ) -> Result<Credential, TokenError>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP token client.
#[derive(Debug, Clone)]
pub struct TokenClientConfig {
    /// Token endpoint URL (e.g., `https://app.example.com/api/agora/agoraToken`).
    pub endpoint: String,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl TokenClientConfig {
    /// Create a new configuration with the default timeout.
    ///
    /// # Security Warning
    ///
    /// Plain HTTP exposes the minted credential in transit. Use
    /// [`TokenClientConfig::new_secure`] outside local development.
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Create a new configuration requiring HTTPS.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the URL doesn't use HTTPS.
    pub fn new_secure(endpoint: String) -> Result<Self, TokenError> {
        if !endpoint.starts_with("https://") {
            return Err(TokenError::Configuration(
                "Token endpoint must use HTTPS".into(),
            ));
        }
        Ok(Self::new(endpoint))
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Token endpoint response body.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "credential")]
    token: String,
    #[serde(default, rename = "expiresAt", alias = "expires_at")]
    expires_at: Option<i64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// `TokenClient` backed by the HTTP token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenClient {
    config: TokenClientConfig,
    http_client: reqwest::Client,
}

impl HttpTokenClient {
    /// Build a client for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: TokenClientConfig) -> Result<Self, TokenError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl TokenClient for HttpTokenClient {
    #[instrument(skip_all, fields(channel = %channel))]
    async fn acquire(
        &self,
        channel: &ChannelId,
        identity: &ParticipantId,
    ) -> Result<Credential, TokenError> {
        if channel.as_str().trim().is_empty() || identity.as_str().trim().is_empty() {
            return Err(TokenError::InvalidRequest(
                "channel and identity are required".into(),
            ));
        }

        debug!(
            target: "common.token_client",
            channel = %channel,
            "Requesting join credential"
        );

        let response = self
            .http_client
            .get(&self.config.endpoint)
            .query(&[("channelName", channel.as_str()), ("uid", identity.as_str())])
            .send()
            .await
            .map_err(|e| {
                debug!(target: "common.token_client", error = %e, "HTTP request failed");
                TokenError::HttpError(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                warn!(target: "common.token_client", error = %e, "Failed to parse token response");
                TokenError::InvalidResponse(e.to_string())
            })?;

            if body.token.is_empty() {
                warn!(target: "common.token_client", "Token endpoint returned an empty token");
                return Err(TokenError::InvalidResponse("empty token".into()));
            }

            #[allow(clippy::cast_possible_wrap)]
            let expires_at = body.expires_at.unwrap_or_else(|| {
                chrono::Utc::now().timestamp() + DEFAULT_CREDENTIAL_LIFETIME.as_secs() as i64
            });

            debug!(
                target: "common.token_client",
                expires_at = expires_at,
                "Join credential acquired"
            );

            Ok(Credential::new(SecretString::from(body.token), expires_at))
        } else if matches!(status.as_u16(), 400 | 401 | 403) {
            // Body may echo request details; keep it at trace level only
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "common.token_client", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "common.token_client",
                status = %status,
                "Token request rejected"
            );
            trace!(
                target: "common.token_client",
                body = %body,
                "Token rejection response body"
            );
            Err(TokenError::Rejected(format!("Status {status}")))
        } else {
            warn!(
                target: "common.token_client",
                status = %status,
                "Unexpected response from token endpoint"
            );
            Err(TokenError::HttpError(format!("Unexpected status: {status}")))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::secret::ExposeSecret;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/api/agora/agoraToken";

    fn client_for(server: &MockServer) -> HttpTokenClient {
        let config = TokenClientConfig::new(format!("{}{TOKEN_PATH}", server.uri()));
        HttpTokenClient::new(config).unwrap()
    }

    fn ids() -> (ChannelId, ParticipantId) {
        (
            ChannelId::new("room1").unwrap(),
            ParticipantId::new("4242").unwrap(),
        )
    }

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_defaults() {
        let config = TokenClientConfig::new("http://localhost:3000/token".to_string());
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);

        let config = config.with_http_timeout(Duration::from_secs(2));
        assert_eq!(config.http_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_new_secure_requires_https() {
        let result = TokenClientConfig::new_secure("http://insecure/token".to_string());
        assert!(matches!(result, Err(TokenError::Configuration(_))));

        let result = TokenClientConfig::new_secure("https://secure/token".to_string());
        assert!(result.is_ok());
    }

    #[test]
    fn test_token_response_debug_redacts_token() {
        let response = TokenResponse {
            token: "secret-token".to_string(),
            expires_at: Some(10),
        };
        let debug_str = format!("{response:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret-token"));
    }

    #[test]
    fn test_credential_expiry() {
        let past = Credential::new(SecretString::from("t"), 0);
        assert!(past.is_expired());

        let future = Credential::new(
            SecretString::from("t"),
            chrono::Utc::now().timestamp() + 60,
        );
        assert!(!future.is_expired());
    }

    // =========================================================================
    // Acquisition Tests
    // =========================================================================

    #[tokio::test]
    async fn test_acquire_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(query_param("channelName", "room1"))
            .and(query_param("uid", "4242"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "minted-token",
                "expiresAt": 1_900_000_000_i64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (channel, identity) = ids();
        let credential = client_for(&server)
            .acquire(&channel, &identity)
            .await
            .unwrap();

        assert_eq!(credential.token.expose_secret(), "minted-token");
        assert_eq!(credential.expires_at, 1_900_000_000);
    }

    #[tokio::test]
    async fn test_acquire_without_expiry_uses_default_lifetime() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "credential": "aliased" })),
            )
            .mount(&server)
            .await;

        let (channel, identity) = ids();
        let before = chrono::Utc::now().timestamp();
        let credential = client_for(&server)
            .acquire(&channel, &identity)
            .await
            .unwrap();

        assert_eq!(credential.token.expose_secret(), "aliased");
        assert!(credential.expires_at >= before + 3600);
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn test_acquire_server_error_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (channel, identity) = ids();
        let result = client_for(&server).acquire(&channel, &identity).await;

        assert!(matches!(result, Err(TokenError::HttpError(_))));
    }

    #[tokio::test]
    async fn test_acquire_bad_request_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "channelName and uid are required and must be strings."
            })))
            .mount(&server)
            .await;

        let (channel, identity) = ids();
        let result = client_for(&server).acquire(&channel, &identity).await;

        match result {
            Err(TokenError::Rejected(msg)) => assert!(msg.contains("400")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acquire_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let (channel, identity) = ids();
        let result = client_for(&server).acquire(&channel, &identity).await;

        assert!(matches!(result, Err(TokenError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_acquire_empty_token_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "" })),
            )
            .mount(&server)
            .await;

        let (channel, identity) = ids();
        let result = client_for(&server).acquire(&channel, &identity).await;

        assert!(matches!(result, Err(TokenError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_acquire_unreachable_endpoint() {
        let config = TokenClientConfig::new("http://127.0.0.1:1/token".to_string())
            .with_http_timeout(Duration::from_millis(500));
        let client = HttpTokenClient::new(config).unwrap();

        let (channel, identity) = ids();
        let result = client.acquire(&channel, &identity).await;

        assert!(matches!(result, Err(TokenError::HttpError(_))));
    }

    #[test]
    fn test_token_error_display() {
        assert_eq!(
            TokenError::Rejected("Status 401".to_string()).to_string(),
            "Token request rejected: Status 401"
        );
        assert_eq!(
            TokenError::InvalidResponse("eof".to_string()).to_string(),
            "Invalid token response: eof"
        );
    }
}
