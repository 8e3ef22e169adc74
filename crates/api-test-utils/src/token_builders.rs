//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed access tokens.

use crate::crypto_fixtures::TestKeypair;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Issuer used by test tokens and the test server.
pub const TEST_ISSUER: &str = "https://kleeut-blastfurnace.au.auth0.com/";

/// Audience used by test tokens and the test server.
pub const TEST_AUDIENCE: &str = "BlastfurnaceAPI";

/// Builder for creating signed test access tokens
///
/// Defaults to a token the test server accepts: issuer [`TEST_ISSUER`],
/// audience [`TEST_AUDIENCE`], valid for an hour.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_audience("OtherAPI")
///     .expires_in(-60)
///     .sign(&TestKeypair::primary());
/// ```
pub struct TestTokenBuilder {
    sub: Option<String>,
    iss: Option<String>,
    aud: Option<Value>,
    exp: Option<i64>,
    kid: Option<String>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        Self {
            sub: Some("auth0|test-user".to_string()),
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(json!(TEST_AUDIENCE)),
            exp: Some((Utc::now() + Duration::seconds(3600)).timestamp()),
            kid: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Omit the `sub` claim
    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    /// Set the issuer
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Set a single audience
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(json!(audience));
        self
    }

    /// Set a list of audiences
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(json!(audiences));
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set the raw `exp` timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Omit the `exp` claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Override the header `kid` (defaults to the signing key's kid)
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        if let Some(sub) = self.sub {
            claims.insert("sub".to_string(), json!(sub));
        }
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        claims.insert("iat".to_string(), json!(Utc::now().timestamp()));
        Value::Object(claims)
    }

    /// Sign with RS256 under `keypair`
    pub fn sign(self, keypair: &TestKeypair) -> String {
        let kid = self.kid.clone().unwrap_or_else(|| keypair.kid().to_string());
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid);

        jsonwebtoken::encode(&header, &self.build(), &keypair.encoding_key())
            .expect("signing a test token should succeed")
    }

    /// Sign with HS256 under a shared secret, for algorithm confusion tests
    pub fn sign_hs256(self, kid: &str, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());

        jsonwebtoken::encode(&header, &self.build(), &EncodingKey::from_secret(secret))
            .expect("signing a test token should succeed")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
