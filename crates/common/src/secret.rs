//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for bearer tokens throughout
//! Blastfurnace. `SecretString` implements `Debug` with redaction, so any
//! struct deriving `Debug` that holds a token stays safe to log.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Session {
//!     user: String,
//!     access_token: SecretString,
//! }
//!
//! let session = Session {
//!     user: "alice".to_string(),
//!     access_token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{session:?}").contains("eyJhbGciOi"));
//! let header = format!("Bearer {}", session.access_token.expose_secret());
//! # assert!(header.starts_with("Bearer "));
//! ```

pub use secrecy::{ExposeSecret, SecretString};
