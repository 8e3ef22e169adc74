//! HTTP routes for the API service.
//!
//! Defines the Axum router and application state.

use crate::auth::{HttpKeyFetcher, KeyCache, TokenVerifier};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Process-wide cache of the identity provider's signing keys.
    pub key_cache: Arc<KeyCache>,
}

impl AppState {
    /// Build state with an HTTP-backed key cache for `config`.
    pub fn from_config(config: Config) -> Self {
        let fetcher = Arc::new(HttpKeyFetcher::new(
            config.jwks_url.clone(),
            config.jwks_http_timeout,
        ));
        let key_cache = Arc::new(KeyCache::new(
            fetcher,
            config.jwt_algorithm,
            config.jwks_rate_limit,
            config.jwks_rate_limit_window,
        ));

        Self { config, key_cache }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/public` - Greeting - public
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/private` - Secrets - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
/// - CORS headers on every response
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let verifier = Arc::new(TokenVerifier::new(
        state.key_cache.clone(),
        state.config.jwt_algorithm,
        state.config.jwt_clock_skew,
        state.config.jwt_audience.clone(),
        state.config.jwt_issuer.clone(),
    ));
    let auth_state = Arc::new(AuthState { verifier });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/public", get(handlers::public_greeting))
        .route("/health", get(handlers::health_check));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/private", get(handlers::get_secrets))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses
    // 4. CORS headers - Decorate ALL responses, including 401/404 (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("authorization"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}
