//! Session coordinator error types.
//!
//! Every failure surfaced to the presentation layer is a `SessionError`. A
//! session that ends in `Failed` keeps the matching [`ErrorKind`] so the UI
//! can explain why without holding on to internal details.

use crate::session::SessionState;
use thiserror::Error;

/// Cloneable tag of a `SessionError`, stored alongside a `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TokenUnavailable,
    DeviceUnavailable,
    TransportConnectFailed,
    TimeoutExceeded,
    SendFailed,
    TransportFault,
    AlreadyActive,
    Cancelled,
    InvalidInput,
    Config,
    Internal,
}

impl ErrorKind {
    /// Returns the kind as a string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TokenUnavailable => "token_unavailable",
            ErrorKind::DeviceUnavailable => "device_unavailable",
            ErrorKind::TransportConnectFailed => "transport_connect_failed",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::SendFailed => "send_failed",
            ErrorKind::TransportFault => "transport_fault",
            ErrorKind::AlreadyActive => "already_active",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Session coordinator error type.
///
/// Propagation policy:
/// - `DeviceUnavailable` is absorbed by the coordinator (degraded session)
/// - `TokenUnavailable`, `TransportConnectFailed`, `TimeoutExceeded` and
///   `TransportFault` end the session in `Failed`
/// - `SendFailed` is reported per chat call and never touches session state
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Join credential could not be obtained.
    #[error("Token unavailable: {0}")]
    TokenUnavailable(String),

    /// Neither capture device could be opened, or a device call failed.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Transport connection could not be established.
    #[error("Transport connect failed: {0}")]
    TransportConnectFailed(String),

    /// A bounded phase (token acquisition, transport connect) ran out of time.
    #[error("Timed out during {0}")]
    TimeoutExceeded(&'static str),

    /// Chat message could not be recorded.
    #[error("Chat send failed: {0}")]
    SendFailed(String),

    /// Connected session lost its transport.
    #[error("Transport fault: {0}")]
    TransportFault(String),

    /// A join was requested while another session is in progress.
    #[error("Session already active ({0})")]
    AlreadyActive(SessionState),

    /// The pending join was abandoned by `leave()`.
    #[error("Join cancelled by leave")]
    Cancelled,

    /// Caller supplied an unusable argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordinator task is gone or a reply channel broke.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the cloneable tag for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::TokenUnavailable(_) => ErrorKind::TokenUnavailable,
            SessionError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            SessionError::TransportConnectFailed(_) => ErrorKind::TransportConnectFailed,
            SessionError::TimeoutExceeded(_) => ErrorKind::TimeoutExceeded,
            SessionError::SendFailed(_) => ErrorKind::SendFailed,
            SessionError::TransportFault(_) => ErrorKind::TransportFault,
            SessionError::AlreadyActive(_) => ErrorKind::AlreadyActive,
            SessionError::Cancelled => ErrorKind::Cancelled,
            SessionError::InvalidInput(_) => ErrorKind::InvalidInput,
            SessionError::Config(_) => ErrorKind::Config,
            SessionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error moves a session into `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::TokenUnavailable(_)
                | SessionError::TransportConnectFailed(_)
                | SessionError::TimeoutExceeded(_)
                | SessionError::TransportFault(_)
        )
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::TokenUnavailable(_) => "Could not get permission to join".to_string(),
            SessionError::DeviceUnavailable(_) => {
                "Camera or microphone is unavailable".to_string()
            }
            SessionError::TransportConnectFailed(_) => {
                "Could not connect to the meeting".to_string()
            }
            SessionError::TimeoutExceeded(_) => "The meeting took too long to respond".to_string(),
            SessionError::SendFailed(_) => "Message could not be sent".to_string(),
            SessionError::TransportFault(_) => "Connection to the meeting was lost".to_string(),
            SessionError::AlreadyActive(_) => "Already in a meeting".to_string(),
            SessionError::Cancelled => "Join was cancelled".to_string(),
            SessionError::InvalidInput(msg) => msg.clone(),
            SessionError::Config(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}
