//! Common utilities and types shared across Blastfurnace components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (structure parsing, audience, expiry)
pub mod jwt;
