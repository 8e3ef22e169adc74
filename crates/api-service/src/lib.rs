//! Blastfurnace API Service Library
//!
//! An HTTP API that serves public data to anyone and secrets only to callers
//! holding a valid access token from the identity provider.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/jwt.rs -> auth/jwks.rs
//!               -> handlers/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache, rate limiter and token verifier
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Auth guard and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
