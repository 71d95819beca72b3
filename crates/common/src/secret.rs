//! Secret types for protecting join credentials from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for every credential that crosses a
//! session boundary: the token minted for a channel join, the Redis URL of the
//! chat log (which may embed a password), and any bearer material handed to a
//! transport.
//!
//! `SecretString` implements `Debug` with redaction, so a struct that derives
//! `Debug` and holds a credential is safe to pass to `tracing` fields.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinGrant {
//!     channel: String,
//!     token: SecretString,
//! }
//!
//! let grant = JoinGrant {
//!     channel: "room1".to_string(),
//!     token: SecretString::from("006abc"),
//! };
//!
//! assert!(!format!("{grant:?}").contains("006abc"));
//! assert_eq!(grant.token.expose_secret(), "006abc");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
