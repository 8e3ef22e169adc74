//! Metrics definitions for the API service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `api_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: the fixed route set plus `/other`
//! - `status`: success, error, timeout (HTTP) or success, error, rate_limited (JWKS)
//! - `outcome`: accepted or one of the verification failure reasons

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("api_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("api_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `api_http_requests_total`, `api_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("api_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("api_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the bounded endpoint label set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/public" => "/public",
        "/private" => "/private",
        _ => "/other",
    }
}

// ============================================================================
// Key Discovery Metrics
// ============================================================================

/// Record a key discovery refresh attempt.
///
/// Metric: `api_jwks_refresh_total`, `api_jwks_refresh_duration_seconds`
/// Labels: `status` (success, error, rate_limited)
///
/// Rate-limited attempts never reach the network, so no duration is recorded
/// for them.
pub fn record_jwks_refresh(status: &'static str, duration: Option<Duration>) {
    if let Some(duration) = duration {
        histogram!("api_jwks_refresh_duration_seconds").record(duration.as_secs_f64());
    }

    counter!("api_jwks_refresh_total",
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Token Verification Metrics
// ============================================================================

/// Record the outcome of a token verification.
///
/// Metric: `api_token_verifications_total`
/// Labels: `outcome` (accepted, or a failure reason label)
pub fn record_token_verification(outcome: &'static str) {
    counter!("api_token_verifications_total",
        "outcome" => outcome
    )
    .increment(1);
}
