//! Blastfurnace Web Client Library
//!
//! Client-side half of Blastfurnace: keeps an access token in step with the
//! user's authentication state and fetches the protected secrets with it.
//!
//! # Modules
//!
//! - `config` - Client configuration from environment
//! - `session` - Authentication state and the session provider seam
//! - `token_supplier` - Access token tracking keyed on authentication state
//! - `fetch_coordinator` - Single-flight fetch of the protected endpoint

pub mod config;
pub mod fetch_coordinator;
pub mod session;
pub mod token_supplier;
