//! Web client configuration.
//!
//! Loaded from environment variables; every value except the access token has
//! a default pointing at a locally running API.

use crate::fetch_coordinator::MissingTokenPolicy;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default path of the protected endpoint.
pub const DEFAULT_SECRETS_PATH: &str = "/private";

/// Default per-request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Web client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the API (default: "http://localhost:8080").
    pub api_base_url: String,

    /// Path of the protected endpoint (default: "/private").
    pub secrets_path: String,

    /// Per-request timeout.
    pub http_timeout: Duration,

    /// Behavior when no token is available.
    pub missing_token_policy: MissingTokenPolicy,

    /// Access token for the static session provider. `None` means signed out.
    pub access_token: Option<SecretString>,
}

/// Custom Debug implementation that redacts the access token.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("secrets_path", &self.secrets_path)
            .field("http_timeout", &self.http_timeout)
            .field("missing_token_policy", &self.missing_token_policy)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid MISSING_TOKEN_POLICY '{0}': expected 'send-unauthenticated' or 'fail-fast'")]
    InvalidPolicy(String),

    #[error("Invalid value for {0}: must not be empty")]
    EmptyValue(String),
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_base_url = string_var(vars, "API_BASE_URL", DEFAULT_API_BASE_URL)?;
        let secrets_path = string_var(vars, "SECRETS_PATH", DEFAULT_SECRETS_PATH)?;

        let http_timeout = match vars.get("HTTP_TIMEOUT_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidDuration(format!(
                        "HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidDuration(
                        "HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }
                Duration::from_secs(value)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
        };

        let missing_token_policy = match vars.get("MISSING_TOKEN_POLICY").map(String::as_str) {
            None | Some("send-unauthenticated") => MissingTokenPolicy::SendUnauthenticated,
            Some("fail-fast") => MissingTokenPolicy::FailFast,
            Some(other) => return Err(ConfigError::InvalidPolicy(other.to_string())),
        };

        let access_token = vars
            .get("ACCESS_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .map(|token| SecretString::from(token.clone()));

        Ok(ClientConfig {
            api_base_url,
            secrets_path,
            http_timeout,
            missing_token_policy,
            access_token,
        })
    }

    /// Full URL of the protected endpoint.
    pub fn secrets_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.secrets_path.trim_start_matches('/')
        )
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
