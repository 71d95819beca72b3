//! Common utilities and types shared across meeting session components.

#![warn(clippy::pedantic)]

/// Module for channel and participant identifiers
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for join credential acquisition from the token endpoint
pub mod token_client;
