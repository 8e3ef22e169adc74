//! Liveness probe handler.

/// Handler for GET /health
///
/// Returns "OK" whenever the process is serving requests. Does not check the
/// identity provider.
pub async fn health_check() -> &'static str {
    "OK"
}
