//! Mock key discovery endpoint
//!
//! Wraps a wiremock `MockServer` serving a JWKS document at
//! `/.well-known/jwks.json`.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A running mock identity provider publishing signing keys.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwks::start(&[TestKeypair::primary()]).await;
/// let cache = KeyCache::new(
///     Arc::new(HttpKeyFetcher::new(jwks.url(), Duration::from_secs(5))),
///     Algorithm::RS256,
///     10,
///     Duration::from_secs(60),
/// );
/// assert_eq!(jwks.fetch_count().await, 0);
/// ```
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Start a mock publishing `keys`.
    pub async fn start(keys: &[TestKeypair]) -> Self {
        Self::start_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys))).await
    }

    /// Start a mock publishing `keys` after `delay`, for overlapping-fetch tests.
    pub async fn start_delayed(keys: &[TestKeypair], delay: Duration) -> Self {
        Self::start_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_json(keys))
                .set_delay(delay),
        )
        .await
    }

    /// Start a mock answering every fetch with `response`.
    pub async fn start_with(response: ResponseTemplate) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&server)
            .await;
        Self { server }
    }

    /// Replace the published key set.
    pub async fn publish(&self, keys: &[TestKeypair]) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .mount(&self.server)
            .await;
    }

    /// Full URL of the key set document.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of key set fetches received so far.
    ///
    /// Counts survive [`MockJwks::publish`] only until the reset it performs.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| {
                requests
                    .iter()
                    .filter(|request| request.url.path() == JWKS_PATH)
                    .count()
            })
    }

    /// The underlying server, for mounting extra expectations.
    pub fn server(&self) -> &MockServer {
        &self.server
    }
}
