//! Unauthenticated greeting.

use axum::Json;
use serde::Serialize;

/// Response for `/public`.
#[derive(Debug, Clone, Serialize)]
pub struct GreetingResponse {
    pub hello: &'static str,
}

/// Handler for GET /public
///
/// ```json
/// {"hello": "world"}
/// ```
#[tracing::instrument(skip_all, name = "api.handlers.public")]
pub async fn public_greeting() -> Json<GreetingResponse> {
    tracing::debug!(target: "api.handlers.public", "Serving public greeting");
    Json(GreetingResponse { hello: "world" })
}
