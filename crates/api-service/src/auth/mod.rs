//! Authentication for the API service.
//!
//! Public keys come from the identity provider's key discovery endpoint via
//! [`KeyCache`]; [`TokenVerifier`] checks bearer tokens against them.

pub mod jwks;
pub mod jwt;
pub mod principal;
pub mod rate_limit;

pub use jwks::{HttpKeyFetcher, KeyCache, KeyCacheError, KeyFetcher};
pub use jwt::{TokenVerifier, VerifyError};
pub use principal::VerifiedPrincipal;
