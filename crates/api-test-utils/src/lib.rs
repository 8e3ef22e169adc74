//! # API Test Utilities
//!
//! Shared test utilities for the Blastfurnace API service.
//!
//! This crate provides:
//! - Fixed RSA signing keys with matching public JWKs
//! - Test token builder producing signed access tokens
//! - Mock key discovery endpoint (wiremock)
//! - Server test harness (`TestApiServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use api_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let jwks = MockJwks::start(&[TestKeypair::primary()]).await;
//!     let server = TestApiServer::spawn(&jwks).await?;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .sign(&TestKeypair::primary());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
