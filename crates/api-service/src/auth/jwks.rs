//! Key cache for public signing keys from the key discovery (JWKS) endpoint.
//!
//! # Behavior
//!
//! - A hit returns immediately without touching the network
//! - A miss triggers a full refresh: the whole key set is fetched and the
//!   cache is replaced wholesale, then the lookup is retried once
//! - Refreshes are single-flight: concurrent misses queue on one refresh lock
//!   and callers that waited behind a refresh reuse its outcome instead of
//!   fetching again
//! - Refresh attempts are capped per fixed window; an attempt over the ceiling
//!   fails with `RateLimited` without contacting the endpoint
//! - Network failures surface as `FetchFailed` and are not retried here

use crate::auth::rate_limit::FixedWindowLimiter;
use crate::observability::metrics::record_jwks_refresh;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Errors from key resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyCacheError {
    /// The key ID is absent even from a freshly fetched key set.
    #[error("Signing key not found")]
    KeyNotFound,

    /// The discovery endpoint could not be reached or returned garbage.
    #[error("Key discovery fetch failed: {0}")]
    FetchFailed(String),

    /// Too many refreshes in the current window.
    #[error("Key discovery rate limit exceeded")]
    RateLimited,
}

/// JSON Web Key as published by the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// Key discovery document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// A public key ready for signature verification.
///
/// Immutable once built; shared out of the cache behind an `Arc`.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("decoding_key", &"[OPAQUE]")
            .finish()
    }
}

impl SigningKey {
    /// Build a signing key from a JWK, accepting it only for `algorithm`.
    ///
    /// Returns a description of the problem when the JWK is unusable.
    pub fn from_jwk(jwk: &Jwk, algorithm: Algorithm) -> Result<Self, String> {
        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(format!("key use '{key_use}' is not 'sig'"));
            }
        }

        if let Some(alg) = jwk.alg.as_deref() {
            match Algorithm::from_str(alg) {
                Ok(declared) if declared == algorithm => {}
                _ => return Err(format!("algorithm '{alg}' is not allowed")),
            }
        }

        let decoding_key = match (algorithm, jwk.kty.as_str()) {
            (
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
                "RSA",
            ) => {
                let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                    return Err("RSA key missing n or e".to_string());
                };
                DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?
            }
            (Algorithm::ES256 | Algorithm::ES384, "EC") => {
                let (Some(x), Some(y)) = (jwk.x.as_deref(), jwk.y.as_deref()) else {
                    return Err("EC key missing x or y".to_string());
                };
                DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?
            }
            (Algorithm::EdDSA, "OKP") => {
                let Some(x) = jwk.x.as_deref() else {
                    return Err("OKP key missing x".to_string());
                };
                DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?
            }
            (_, kty) => return Err(format!("key type '{kty}' does not match {algorithm:?}")),
        };

        Ok(Self {
            kid: jwk.kid.clone(),
            algorithm,
            decoding_key,
        })
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The algorithm this key verifies.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Key material for `jsonwebtoken`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Source of the published key set.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetch the complete key set.
    async fn fetch_keys(&self) -> Result<Vec<Jwk>, KeyCacheError>;
}

/// Fetches the key set over HTTP.
pub struct HttpKeyFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Create a fetcher for `jwks_url`, timing out each request after `timeout`.
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "api.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    /// The configured discovery URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch_keys(&self) -> Result<Vec<Jwk>, KeyCacheError> {
        tracing::debug!(target: "api.auth.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "api.auth.jwks", error = %e, "Failed to fetch JWKS");
                KeyCacheError::FetchFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "api.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeyCacheError::FetchFailed(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "api.auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyCacheError::FetchFailed(e.to_string())
        })?;

        Ok(jwks.keys)
    }
}

/// The current key set. Replaced wholesale on every successful refresh.
struct CachedJwks {
    /// Map of key ID to key. At most one entry per key ID.
    keys: HashMap<String, Arc<SigningKey>>,

    /// When this key set was fetched.
    fetched_at: Instant,
}

/// Serialized refresh bookkeeping, guarded by the refresh lock.
struct RefreshState {
    limiter: FixedWindowLimiter,

    /// Outcome of the most recent network refresh, shared with callers that
    /// queued behind it.
    last_outcome: Option<Result<(), KeyCacheError>>,
}

/// Cache of public signing keys keyed by key ID.
pub struct KeyCache {
    fetcher: Arc<dyn KeyFetcher>,

    /// The only algorithm keys are accepted for.
    algorithm: Algorithm,

    cache: RwLock<Option<CachedJwks>>,

    refresh: Mutex<RefreshState>,

    /// Count of completed network refreshes. Lets a caller that waited on the
    /// refresh lock detect that someone else already refreshed.
    generation: AtomicU64,
}

impl KeyCache {
    /// Create a key cache.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of the key set
    /// * `algorithm` - The single algorithm keys are accepted for
    /// * `rate_limit` - Maximum refreshes per window
    /// * `window` - Rate-limit window length
    pub fn new(
        fetcher: Arc<dyn KeyFetcher>,
        algorithm: Algorithm,
        rate_limit: u32,
        window: Duration,
    ) -> Self {
        Self {
            fetcher,
            algorithm,
            cache: RwLock::new(None),
            refresh: Mutex::new(RefreshState {
                limiter: FixedWindowLimiter::new(rate_limit, window),
                last_outcome: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve a key by ID, refreshing the key set on a miss.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` - absent after a refresh
    /// - `FetchFailed` - the refresh failed
    /// - `RateLimited` - the refresh ceiling for this window is reached
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyCacheError> {
        let observed_generation = self.generation.load(Ordering::Acquire);

        if let Some(key) = self.lookup(kid).await {
            tracing::debug!(target: "api.auth.jwks", "JWKS cache hit");
            return Ok(key);
        }

        let mut refresh = self.refresh.lock().await;

        if self.generation.load(Ordering::Acquire) != observed_generation {
            // Another caller refreshed while we waited for the lock.
            if let Some(key) = self.lookup(kid).await {
                return Ok(key);
            }
            return match &refresh.last_outcome {
                Some(Err(e)) => Err(e.clone()),
                _ => {
                    tracing::warn!(target: "api.auth.jwks", "Key not found in JWKS after refresh");
                    Err(KeyCacheError::KeyNotFound)
                }
            };
        }

        if let Err(retry_after) = refresh.limiter.try_acquire(Instant::now()) {
            tracing::warn!(
                target: "api.auth.jwks",
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "JWKS refresh rate limited"
            );
            record_jwks_refresh("rate_limited", None);
            return Err(KeyCacheError::RateLimited);
        }

        let outcome = self.refresh_cache().await;
        refresh.last_outcome = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(refresh);

        outcome?;

        self.lookup(kid).await.ok_or_else(|| {
            tracing::warn!(target: "api.auth.jwks", "Key not found in JWKS after refresh");
            KeyCacheError::KeyNotFound
        })
    }

    /// When the current key set was fetched, if any has been.
    pub async fn last_refreshed_at(&self) -> Option<Instant> {
        self.cache.read().await.as_ref().map(|cached| cached.fetched_at)
    }

    /// Number of keys currently cached.
    pub async fn len(&self) -> usize {
        self.cache
            .read()
            .await
            .as_ref()
            .map_or(0, |cached| cached.keys.len())
    }

    /// Whether the cache holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn lookup(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.cache
            .read()
            .await
            .as_ref()
            .and_then(|cached| cached.keys.get(kid).cloned())
    }

    /// Fetch the key set and replace the cache. Caller holds the refresh lock.
    async fn refresh_cache(&self) -> Result<(), KeyCacheError> {
        let started = Instant::now();

        let jwks = match self.fetcher.fetch_keys().await {
            Ok(jwks) => jwks,
            Err(e) => {
                record_jwks_refresh("error", Some(started.elapsed()));
                return Err(e);
            }
        };

        let mut keys = HashMap::with_capacity(jwks.len());
        for jwk in &jwks {
            match SigningKey::from_jwk(jwk, self.algorithm) {
                Ok(key) => {
                    if keys.insert(jwk.kid.clone(), Arc::new(key)).is_some() {
                        tracing::warn!(target: "api.auth.jwks", kid = %jwk.kid, "Duplicate kid in JWKS, keeping last");
                    }
                }
                Err(reason) => {
                    tracing::warn!(target: "api.auth.jwks", kid = %jwk.kid, reason = %reason, "Skipping unusable JWK");
                }
            }
        }

        tracing::info!(
            target: "api.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );
        record_jwks_refresh("success", Some(started.elapsed()));

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}
