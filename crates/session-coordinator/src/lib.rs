//! Meeting Session Coordinator Library
//!
//! Establishes, maintains and tears down a live audio/video meeting among
//! the participants of a channel, plus an ordered chat stream scoped to the
//! same channel:
//!
//! - Join/leave state machine with bounded token and connect phases
//! - Local capture ownership with degraded (camera- or mic-less) sessions
//! - Roster of remote participants driven by transport events
//! - Grid layout projection from roster size
//! - Append-only chat with replay-then-tail subscriptions
//!
//! # Architecture
//!
//! ```text
//! MeetingClient
//! ├── SessionCoordinatorHandle ──► SessionCoordinator (actor)
//! │                                ├── TokenClient        (credential)
//! │                                ├── MediaTransport     (connect, publish, events)
//! │                                ├── MediaTrackRegistry (CaptureDevices, remote tracks)
//! │                                ├── RosterManager
//! │                                └── layout::project
//! └── ChatStream ──► ChatLog (in-memory or Redis Streams)
//! ```
//!
//! The transport, capture devices, token endpoint and chat storage are all
//! traits, so the coordinator runs unchanged against real backends or the
//! mocks in `session-test-utils`.
//!
//! # Modules
//!
//! - [`actors`] - The coordinator actor, its handle and messages
//! - [`chat`] - Chat log seam, implementations and subscriptions
//! - [`client`] - `MeetingClient` facade
//! - [`config`] - Configuration from environment
//! - [`errors`] - `SessionError` and `ErrorKind`
//! - [`layout`] - Roster size to grid shape
//! - [`media`] - Track handles, capture seam, track registry
//! - [`roster`] - Remote participant ordering and membership
//! - [`transport`] - Media transport seam and events

pub mod actors;
pub mod chat;
pub mod client;
pub mod config;
pub mod errors;
pub mod layout;
pub mod media;
pub mod observability;
pub mod roster;
pub mod session;
pub mod transport;

pub use actors::{
    JoinOptions, JoinOutcome, SessionCoordinator, SessionCoordinatorHandle, SessionDeps,
    SessionView,
};
pub use client::MeetingClient;
pub use errors::{ErrorKind, SessionError};
pub use session::SessionState;
