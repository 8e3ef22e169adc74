//! API service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! documented default so the service starts against the production identity
//! provider with no variables set.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default key discovery endpoint.
pub const DEFAULT_JWKS_URL: &str = "https://kleeut-blastfurnace.au.auth0.com/.well-known/jwks.json";

/// Default expected token issuer.
pub const DEFAULT_JWT_ISSUER: &str = "https://kleeut-blastfurnace.au.auth0.com/";

/// Default expected token audience.
pub const DEFAULT_JWT_AUDIENCE: &str = "BlastfurnaceAPI";

/// Default ceiling on discovery fetches per rate-limit window.
pub const DEFAULT_JWKS_RATE_LIMIT: u32 = 10;

/// Default rate-limit window length in seconds.
pub const DEFAULT_JWKS_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

/// Default HTTP timeout for discovery fetches in seconds.
pub const DEFAULT_JWKS_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// API service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the key discovery (JWKS) document.
    pub jwks_url: String,

    /// Expected `iss` claim, compared exactly.
    pub jwt_issuer: String,

    /// Expected entry in the `aud` claim.
    pub jwt_audience: String,

    /// The single accepted signing algorithm. Always asymmetric.
    pub jwt_algorithm: Algorithm,

    /// Maximum discovery fetches per window.
    pub jwks_rate_limit: u32,

    /// Length of the rate-limit window.
    pub jwks_rate_limit_window: Duration,

    /// Tolerance applied to the `exp` check.
    pub jwt_clock_skew: Duration,

    /// Timeout for a single discovery fetch.
    pub jwks_http_timeout: Duration,

    /// Drain period after a shutdown signal.
    pub drain_period: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JWT algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid value for {0}: must not be empty")]
    EmptyValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = string_var(vars, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?;
        let jwks_url = string_var(vars, "JWKS_URL", DEFAULT_JWKS_URL)?;
        let jwt_issuer = string_var(vars, "JWT_ISSUER", DEFAULT_JWT_ISSUER)?;
        let jwt_audience = string_var(vars, "JWT_AUDIENCE", DEFAULT_JWT_AUDIENCE)?;

        let jwt_algorithm = match vars.get("JWT_ALGORITHM") {
            Some(value) => parse_asymmetric_algorithm(value)?,
            None => Algorithm::RS256,
        };

        let jwks_rate_limit = if let Some(value_str) = vars.get("JWKS_RATE_LIMIT") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "JWKS_RATE_LIMIT must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "JWKS_RATE_LIMIT must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_JWKS_RATE_LIMIT
        };

        let jwks_rate_limit_window = positive_seconds_var(
            vars,
            "JWKS_RATE_LIMIT_WINDOW_SECONDS",
            DEFAULT_JWKS_RATE_LIMIT_WINDOW_SECONDS,
        )?;

        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_http_timeout = positive_seconds_var(
            vars,
            "JWKS_HTTP_TIMEOUT_SECONDS",
            DEFAULT_JWKS_HTTP_TIMEOUT_SECONDS,
        )?;

        let drain_period = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => Duration::from_secs(value_str.parse().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?),
            None => Duration::ZERO,
        };

        Ok(Config {
            bind_address,
            jwks_url,
            jwt_issuer,
            jwt_audience,
            jwt_algorithm,
            jwks_rate_limit,
            jwks_rate_limit_window,
            jwt_clock_skew,
            jwks_http_timeout,
            drain_period,
        })
    }
}

fn string_var(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(name.to_string())),
        Some(value) => Ok(value.clone()),
        None => Ok(default.to_string()),
    }
}

fn positive_seconds_var(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(Duration::from_secs(value))
}

/// Parse an algorithm name, accepting only asymmetric signature algorithms.
///
/// HMAC algorithms are refused: a shared-secret algorithm verified against a
/// published public key is the classic algorithm-confusion attack.
fn parse_asymmetric_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(value).map_err(|_| {
        ConfigError::InvalidAlgorithm(format!("Unknown JWT_ALGORITHM '{}'", value))
    })?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(ConfigError::InvalidAlgorithm(format!(
                "JWT_ALGORITHM must be asymmetric, got '{}'",
                value
            )))
        }
        asymmetric => Ok(asymmetric),
    }
}
