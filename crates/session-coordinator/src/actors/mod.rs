//! Actor that owns the meeting session.
//!
//! ```text
//! MeetingClient
//! └── SessionCoordinatorHandle ──mpsc──► SessionCoordinator (one task)
//!                                         ├── MediaTrackRegistry
//!                                         ├── RosterManager
//!                                         ├── join step task (token, then connect)
//!                                         └── transport event stream
//! ```
//!
//! - [`coordinator`] - `SessionCoordinator` and its handle
//! - [`messages`] - mailbox messages, join options and the published view

pub mod coordinator;
pub mod messages;

pub use coordinator::{SessionCoordinator, SessionCoordinatorHandle, SessionDeps};
pub use messages::{JoinOptions, JoinOutcome, SessionMessage, SessionView};
