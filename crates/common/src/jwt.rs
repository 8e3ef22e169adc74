//! JWT utilities shared across Blastfurnace components.
//!
//! This module provides the structural half of token validation:
//! - Size limits for DoS prevention
//! - Splitting a compact JWT into header, claims and signature segments
//! - The audience claim type (single value or set)
//! - Expiry validation with a configurable clock skew tolerance
//!
//! Nothing here checks a signature. Callers MUST verify the signature over
//! [`UnverifiedToken::signing_input`] before trusting any claim.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_token, validate_exp, DEFAULT_CLOCK_SKEW};
//!
//! let parsed = parse_token(token)?;
//! let kid = parsed.kid().ok_or(...)?;
//! // ... resolve key, verify signature over parsed.signing_input() ...
//! validate_exp(parsed.exp(), DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical identity-provider access tokens are under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default clock skew tolerance for `exp` validation (none).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::ZERO;

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected at startup.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during structural JWT validation.
///
/// Display strings are generic on purpose; details go to debug logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not three base64url segments with JSON header and claims.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `exp` claim is missing or in the past.
    #[error("The access token is invalid or expired")]
    Expired,
}

// =============================================================================
// Token Types
// =============================================================================

/// JOSE header fields needed before verification.
///
/// `alg` is kept as a raw string so that unsupported values such as `none`
/// surface as an algorithm mismatch rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm.
    pub alg: String,

    /// Key ID used to select the verification key.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

/// A structurally valid but NOT yet verified token.
///
/// Borrows from the original token string so the exact signed bytes are
/// preserved for signature verification.
#[derive(Debug, Clone)]
pub struct UnverifiedToken<'a> {
    header: TokenHeader,
    claims: Map<String, Value>,
    signing_input: &'a str,
    signature: &'a str,
}

impl<'a> UnverifiedToken<'a> {
    /// Decoded header.
    #[must_use]
    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Key ID from the header, if present and non-empty.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref().filter(|kid| !kid.is_empty())
    }

    /// The `header.payload` bytes the signature covers.
    #[must_use]
    pub fn signing_input(&self) -> &'a str {
        self.signing_input
    }

    /// The base64url signature segment.
    #[must_use]
    pub fn signature(&self) -> &'a str {
        self.signature
    }

    /// Decoded claims. Untrusted until the signature is verified.
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Consume the token, returning its claims.
    #[must_use]
    pub fn into_claims(self) -> Map<String, Value> {
        self.claims
    }

    /// `iss` claim as a string.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// `aud` claim in either of its permitted shapes.
    #[must_use]
    pub fn audience(&self) -> Option<Audience> {
        self.claims
            .get("aud")
            .and_then(|v| Audience::deserialize(v).ok())
    }

    /// `exp` claim as Unix epoch seconds.
    ///
    /// NumericDate may carry a fraction; it is truncated to whole seconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn exp(&self) -> Option<i64> {
        let exp = self.claims.get("exp")?;
        exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))
    }
}

/// Audience claim value, which can be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience string.
    Single(String),
    /// A set of audience strings.
    Multiple(Vec<String>),
}

impl Audience {
    /// Check whether `expected` is one of the audiences (exact match).
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Split and decode a compact JWT without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Not exactly three non-empty base64url segments, or the
///   header/payload are not JSON objects
pub fn parse_token(token: &str) -> Result<UnverifiedToken<'_>, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or(JwtValidationError::MalformedToken)?;
    let (header_part, payload_part) = signing_input
        .split_once('.')
        .ok_or(JwtValidationError::MalformedToken)?;

    if payload_part.contains('.')
        || header_part.is_empty()
        || payload_part.is_empty()
        || signature.is_empty()
    {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    }

    URL_SAFE_NO_PAD.decode(signature).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT signature base64");
        JwtValidationError::MalformedToken
    })?;

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;
    let header: TokenHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtValidationError::MalformedToken
    })?;
    let claims: Map<String, Value> = serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtValidationError::MalformedToken
    })?;

    Ok(UnverifiedToken {
        header,
        claims,
        signing_input,
        signature,
    })
}

/// Validate the `exp` claim against the current time.
///
/// A token is accepted while `now < exp + clock_skew`.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp` is absent or has passed.
pub fn validate_exp(exp: Option<i64>, clock_skew: Duration) -> Result<(), JwtValidationError> {
    validate_exp_at(exp, clock_skew, chrono::Utc::now().timestamp())
}

/// Validate `exp` against an explicit `now` (Unix epoch seconds).
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp` is absent or has passed.
#[allow(clippy::cast_possible_wrap)] // skew is capped at MAX_CLOCK_SKEW
pub fn validate_exp_at(
    exp: Option<i64>,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let Some(exp) = exp else {
        tracing::debug!(target: "common.jwt", "Token rejected: missing exp claim");
        return Err(JwtValidationError::Expired);
    };

    let deadline = exp.saturating_add(clock_skew.as_secs() as i64);
    if now >= deadline {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_seconds = clock_skew.as_secs(),
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
