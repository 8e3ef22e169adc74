//! Protected secrets handler.
//!
//! Only reachable through the auth guard, which attaches the principal.

use crate::auth::VerifiedPrincipal;
use crate::errors::ApiError;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// The secrets served to authenticated callers.
pub const SECRETS: [&str; 3] = [
    "The furnace is lit at dawn",
    "Slag is tapped every four hours",
    "Coke is stored in the east shed",
];

/// Response for `/private`.
#[derive(Debug, Clone, Serialize)]
pub struct SecretsResponse {
    pub secrets: Vec<String>,
}

/// Handler for GET /private
///
/// Requires valid authentication via the auth middleware. A request without a
/// principal means the route was mounted without the guard and fails with 500.
///
/// ## Response
///
/// ```json
/// {"secrets": ["...", "..."]}
/// ```
#[instrument(skip_all, name = "api.handlers.secrets")]
pub async fn get_secrets(
    principal: Option<Extension<VerifiedPrincipal>>,
) -> Result<Json<SecretsResponse>, ApiError> {
    let Some(Extension(principal)) = principal else {
        tracing::error!(target: "api.handlers.secrets", "Protected route reached without a principal");
        return Err(ApiError::Internal);
    };

    tracing::debug!(
        target: "api.handlers.secrets",
        principal = ?principal,
        "Returning secrets"
    );

    Ok(Json(SecretsResponse {
        secrets: SECRETS.iter().map(|s| (*s).to_string()).collect(),
    }))
}
