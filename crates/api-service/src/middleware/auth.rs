//! Authentication guard for protected routes.
//!
//! Extracts the bearer token from the Authorization header, verifies it and
//! injects the principal into request extensions. Every rejection is the same
//! generic 401; the reason is logged at debug level only.

use crate::auth::{TokenVerifier, VerifiedPrincipal};
use crate::errors::ApiError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Verifier bound to the configured audience and issuer.
    pub verifier: Arc<TokenVerifier>,
}

/// Authentication middleware that verifies bearer tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 Unauthorized with WWW-Authenticate if the token is missing or invalid
/// - Otherwise continues with a [`VerifiedPrincipal`] in extensions
#[instrument(skip(state, req, next), name = "api.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthenticated)?;

    let principal = state
        .verifier
        .verify_configured(token)
        .await
        .map_err(|e| {
            tracing::debug!(target: "api.middleware.auth", reason = e.as_str(), "Rejecting request");
            ApiError::Unauthenticated
        })?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Pull a non-empty bearer token out of the Authorization header.
fn bearer_token(req: &Request) -> Option<&str> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        tracing::debug!(target: "api.middleware.auth", "Missing Authorization header");
        return None;
    };

    let Ok(value) = value.to_str() else {
        tracing::debug!(target: "api.middleware.auth", "Authorization header is not ASCII");
        return None;
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Some(token),
        _ => {
            tracing::debug!(target: "api.middleware.auth", "Invalid Authorization header format");
            None
        }
    }
}

/// Extension trait for reading the principal from a request.
pub trait PrincipalExt {
    /// The verified principal, or `None` if the guard did not run.
    fn principal(&self) -> Option<&VerifiedPrincipal>;
}

impl<B> PrincipalExt for axum::extract::Request<B> {
    fn principal(&self) -> Option<&VerifiedPrincipal> {
        self.extensions().get::<VerifiedPrincipal>()
    }
}
