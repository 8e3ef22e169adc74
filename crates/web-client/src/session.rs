//! Authentication state and the session provider seam.
//!
//! The session layer (an identity provider SDK in a browser, a static token
//! here) owns login. The client only observes whether the user is
//! authenticated and asks the session layer for access tokens.

use async_trait::async_trait;
use common::secret::SecretString;
use thiserror::Error;

/// Whether the user is currently logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    Authenticated,
    Unauthenticated,
}

impl AuthState {
    /// `true` when authenticated.
    pub fn is_authenticated(self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

/// Errors from the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No active session")]
    NotAuthenticated,

    #[error("Session provider failed: {0}")]
    Provider(String),
}

/// Source of access tokens for the logged-in user.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Obtain a fresh access token for the protected API.
    async fn get_access_token(&self) -> Result<SecretString, SessionError>;
}

/// Session provider backed by a token supplied up front.
#[derive(Debug, Clone)]
pub struct StaticSessionProvider {
    token: Option<SecretString>,
}

impl StaticSessionProvider {
    /// Create a provider; `None` means nobody is logged in.
    pub fn new(token: Option<SecretString>) -> Self {
        Self { token }
    }

    /// Authentication state implied by the configured token.
    pub fn auth_state(&self) -> AuthState {
        if self.token.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn get_access_token(&self) -> Result<SecretString, SessionError> {
        self.token.clone().ok_or(SessionError::NotAuthenticated)
    }
}

/// Lines describing the session for display: the login state, then the
/// session layer's error if obtaining a token failed.
pub fn session_summary(auth: AuthState, error: Option<&SessionError>) -> Vec<String> {
    let mut lines = vec![format!(
        "Is Logged In: {}",
        if auth.is_authenticated() { "yes" } else { "no" }
    )];
    if let Some(e) = error {
        lines.push(format!("Session error: {e}"));
    }
    lines
}
