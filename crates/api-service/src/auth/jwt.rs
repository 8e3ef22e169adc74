//! Access token verification.
//!
//! Verifies bearer tokens against public keys from the key cache.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Exactly one asymmetric algorithm is accepted; the header's declared
//!   algorithm is checked before any key lookup or signature work
//! - Checks run in a fixed order and the first failure wins
//! - The specific failure is for logs and metrics only; callers at the HTTP
//!   boundary collapse it to a generic 401

use crate::auth::jwks::KeyCache;
use crate::auth::principal::VerifiedPrincipal;
use crate::observability::metrics::record_token_verification;
use common::jwt::{parse_token, validate_exp};
use jsonwebtoken::Algorithm;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Reason a token was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Token is malformed")]
    MalformedToken,

    #[error("Token algorithm is not allowed")]
    AlgorithmMismatch,

    #[error("Token signing key is unknown")]
    UnknownKey,

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token issuer does not match")]
    IssuerMismatch,

    #[error("Token audience does not match")]
    AudienceMismatch,

    #[error("Token is expired")]
    Expired,
}

impl VerifyError {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyError::MalformedToken => "malformed_token",
            VerifyError::AlgorithmMismatch => "algorithm_mismatch",
            VerifyError::UnknownKey => "unknown_key",
            VerifyError::BadSignature => "bad_signature",
            VerifyError::IssuerMismatch => "issuer_mismatch",
            VerifyError::AudienceMismatch => "audience_mismatch",
            VerifyError::Expired => "expired",
        }
    }
}

/// Verifies access tokens issued by the configured identity provider.
pub struct TokenVerifier {
    key_cache: Arc<KeyCache>,

    /// The single allowed algorithm.
    algorithm: Algorithm,

    /// Tolerance applied to `exp`.
    clock_skew: Duration,

    /// Configured audience for [`TokenVerifier::verify_configured`].
    audience: String,

    /// Configured issuer for [`TokenVerifier::verify_configured`].
    issuer: String,
}

impl TokenVerifier {
    /// Create a new verifier.
    ///
    /// # Arguments
    ///
    /// * `key_cache` - Source of public keys
    /// * `algorithm` - The only accepted signing algorithm
    /// * `clock_skew` - Tolerance for the expiry check
    /// * `audience` - Expected audience
    /// * `issuer` - Expected issuer
    pub fn new(
        key_cache: Arc<KeyCache>,
        algorithm: Algorithm,
        clock_skew: Duration,
        audience: String,
        issuer: String,
    ) -> Self {
        Self {
            key_cache,
            algorithm,
            clock_skew,
            audience,
            issuer,
        }
    }

    /// Verify against the configured audience and issuer.
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify`].
    pub async fn verify_configured(&self, token: &str) -> Result<VerifiedPrincipal, VerifyError> {
        self.verify(token, &self.audience, &self.issuer).await
    }

    /// Verify a token and return its principal.
    ///
    /// # Checks, in order
    ///
    /// 1. Structure - three base64url segments, JSON header and payload
    /// 2. Algorithm - header `alg` equals the allowed algorithm
    /// 3. Key - header `kid` resolves through the key cache
    /// 4. Signature - over `header.payload` with the resolved key
    /// 5. Issuer - exact, case-sensitive match
    /// 6. Audience - `aud` (string or list) contains `expected_audience`
    /// 7. Expiry - `exp` in the future, within the clock skew
    ///
    /// # Errors
    ///
    /// Returns the [`VerifyError`] for the first failing check.
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        token: &str,
        expected_audience: &str,
        expected_issuer: &str,
    ) -> Result<VerifiedPrincipal, VerifyError> {
        let result = self
            .verify_inner(token, expected_audience, expected_issuer)
            .await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "api.auth.jwt", "Token verified successfully");
                record_token_verification("accepted");
            }
            Err(e) => {
                tracing::debug!(target: "api.auth.jwt", reason = e.as_str(), "Token rejected");
                record_token_verification(e.as_str());
            }
        }

        result
    }

    async fn verify_inner(
        &self,
        token: &str,
        expected_audience: &str,
        expected_issuer: &str,
    ) -> Result<VerifiedPrincipal, VerifyError> {
        // 1. Structure (includes size check via common::jwt)
        let parsed = parse_token(token).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = ?e, "Token structure invalid");
            VerifyError::MalformedToken
        })?;

        // 2. Algorithm, before touching keys or the signature
        match Algorithm::from_str(&parsed.header().alg) {
            Ok(alg) if alg == self.algorithm => {}
            _ => {
                tracing::debug!(
                    target: "api.auth.jwt",
                    alg = %parsed.header().alg,
                    "Token algorithm not allowed"
                );
                return Err(VerifyError::AlgorithmMismatch);
            }
        }

        // 3. Key
        let kid = parsed.kid().ok_or_else(|| {
            tracing::debug!(target: "api.auth.jwt", "Token header missing kid");
            VerifyError::UnknownKey
        })?;
        let key = self.key_cache.resolve(kid).await.map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = %e, "Signing key unavailable");
            VerifyError::UnknownKey
        })?;
        if key.algorithm() != self.algorithm {
            return Err(VerifyError::UnknownKey);
        }

        // 4. Signature
        let signature_valid = jsonwebtoken::crypto::verify(
            parsed.signature(),
            parsed.signing_input().as_bytes(),
            key.decoding_key(),
            self.algorithm,
        )
        .unwrap_or(false);
        if !signature_valid {
            return Err(VerifyError::BadSignature);
        }

        // 5. Issuer
        if parsed.issuer() != Some(expected_issuer) {
            return Err(VerifyError::IssuerMismatch);
        }

        // 6. Audience
        if !parsed
            .audience()
            .is_some_and(|aud| aud.contains(expected_audience))
        {
            return Err(VerifyError::AudienceMismatch);
        }

        // 7. Expiry
        validate_exp(parsed.exp(), self.clock_skew).map_err(|_| VerifyError::Expired)?;

        Ok(VerifiedPrincipal::from_claims(parsed.into_claims()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::{Jwk, KeyCacheError, KeyFetcher};
    use api_test_utils::{TestKeypair, TestTokenBuilder, TEST_AUDIENCE, TEST_ISSUER};
    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixtureFetcher {
        keys: Vec<TestKeypair>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyFetcher for FixtureFetcher {
        async fn fetch_keys(&self) -> Result<Vec<Jwk>, KeyCacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .keys
                .iter()
                .map(|k| serde_json::from_value(k.jwk_json()).unwrap())
                .collect())
        }
    }

    fn verifier_with(keys: Vec<TestKeypair>) -> (TokenVerifier, Arc<FixtureFetcher>) {
        let fetcher = Arc::new(FixtureFetcher {
            keys,
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(KeyCache::new(
            fetcher.clone(),
            Algorithm::RS256,
            10,
            Duration::from_secs(60),
        ));
        let verifier = TokenVerifier::new(
            cache,
            Algorithm::RS256,
            Duration::ZERO,
            TEST_AUDIENCE.to_string(),
            TEST_ISSUER.to_string(),
        );
        (verifier, fetcher)
    }

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    // ------------------------------------------------------------------------
    // Success
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_valid_token_accepted() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .for_user("auth0|alice")
            .sign(&TestKeypair::primary());

        let principal = verifier.verify_configured(&token).await.unwrap();

        assert_eq!(principal.subject, "auth0|alice");
        assert_eq!(principal.claim_str("iss"), Some(TEST_ISSUER));

        // Every claim in the payload reaches the principal unchanged.
        let (_, rest) = token.split_once('.').unwrap();
        let (payload, _) = rest.split_once('.').unwrap();
        let payload: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(principal.claims, payload);
    }

    #[tokio::test]
    async fn test_audience_list_containing_expected_accepted() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .with_audiences(&["https://userinfo.example/", TEST_AUDIENCE])
            .sign(&TestKeypair::primary());

        assert!(verifier.verify_configured(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_subject_accepted_with_empty_subject() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .without_subject()
            .sign(&TestKeypair::primary());

        let principal = verifier.verify_configured(&token).await.unwrap();
        assert_eq!(principal.subject, "");
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_malformed_tokens_rejected() {
        let (verifier, fetcher) = verifier_with(vec![TestKeypair::primary()]);

        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.@@@.###", "e30..sig"] {
            assert_eq!(
                verifier.verify_configured(token).await.unwrap_err(),
                VerifyError::MalformedToken,
                "token {token:?}"
            );
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_token_rejected_as_malformed() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES + 1);

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::MalformedToken
        );
    }

    // ------------------------------------------------------------------------
    // Algorithm
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_symmetric_algorithm_rejected_before_key_lookup() {
        let (verifier, fetcher) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new().sign_hs256("test-key-1", b"secret");

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_alg_none_rejected() {
        let (verifier, fetcher) = verifier_with(vec![TestKeypair::primary()]);
        let header = encode_segment(&json!({"alg": "none", "kid": "test-key-1"}));
        let payload = encode_segment(&TestTokenBuilder::new().build());
        let token = format!("{header}.{payload}.AAAA");

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disallowed_algorithm_outcome_independent_of_signature() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let header = encode_segment(&json!({"alg": "RS512", "kid": "test-key-1"}));
        let payload = encode_segment(&TestTokenBuilder::new().build());

        let garbage = format!("{header}.{payload}.AAAA");
        let other = format!("{header}.{payload}.BBBBBBBB");

        assert_eq!(
            verifier.verify_configured(&garbage).await.unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
        assert_eq!(
            verifier.verify_configured(&other).await.unwrap_err(),
            VerifyError::AlgorithmMismatch
        );
    }

    // ------------------------------------------------------------------------
    // Key
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_kid_rejected_after_single_refresh() {
        let (verifier, fetcher) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new().sign(&TestKeypair::secondary());

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::UnknownKey
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_kid_rejected() {
        let (verifier, fetcher) = verifier_with(vec![TestKeypair::primary()]);
        let header = encode_segment(&json!({"alg": "RS256"}));
        let payload = encode_segment(&TestTokenBuilder::new().build());
        let token = format!("{header}.{payload}.AAAA");

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::UnknownKey
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    // ------------------------------------------------------------------------
    // Signature
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_wrong_key_signature_rejected() {
        // Secondary key material published under the primary's kid.
        let impostor = TestKeypair::secondary().with_kid("test-key-1");
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new().sign(&impostor);

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::BadSignature
        );
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .for_user("alice")
            .sign(&TestKeypair::primary());

        let (header, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let forged = encode_segment(&TestTokenBuilder::new().for_user("mallory").build());
        let tampered = format!("{header}.{forged}.{signature}");

        assert_eq!(
            verifier.verify_configured(&tampered).await.unwrap_err(),
            VerifyError::BadSignature
        );
    }

    // ------------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);

        for issuer in [
            "https://evil.example/",
            "https://KLEEUT-blastfurnace.au.auth0.com/",
            "https://kleeut-blastfurnace.au.auth0.com",
        ] {
            let token = TestTokenBuilder::new()
                .with_issuer(issuer)
                .sign(&TestKeypair::primary());
            assert_eq!(
                verifier.verify_configured(&token).await.unwrap_err(),
                VerifyError::IssuerMismatch,
                "issuer {issuer}"
            );
        }
    }

    #[tokio::test]
    async fn test_audience_is_isolated_check() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let exp = chrono::Utc::now().timestamp() + 600;

        let wrong = TestTokenBuilder::new()
            .with_audience("OtherAPI")
            .expires_at(exp)
            .sign(&TestKeypair::primary());
        assert_eq!(
            verifier.verify_configured(&wrong).await.unwrap_err(),
            VerifyError::AudienceMismatch
        );

        let right = TestTokenBuilder::new()
            .with_audience(TEST_AUDIENCE)
            .expires_at(exp)
            .sign(&TestKeypair::primary());
        assert!(verifier.verify_configured(&right).await.is_ok());
    }

    #[tokio::test]
    async fn test_explicit_audience_and_issuer() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .with_issuer("https://other-issuer.example/")
            .with_audience("OtherAPI")
            .sign(&TestKeypair::primary());

        assert!(verifier
            .verify(&token, "OtherAPI", "https://other-issuer.example/")
            .await
            .is_ok());
        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::IssuerMismatch
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .expires_in(-10)
            .sign(&TestKeypair::primary());

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::Expired
        );
    }

    #[tokio::test]
    async fn test_fractional_exp_accepted() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let exp = chrono::Utc::now().timestamp() as f64 + 600.5;
        let token = TestTokenBuilder::new()
            .without_expiry()
            .with_claim("exp", json!(exp))
            .sign(&TestKeypair::primary());

        assert!(verifier.verify_configured(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_exp_rejected() {
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .without_expiry()
            .sign(&TestKeypair::primary());

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::Expired
        );
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        // Wrong issuer, wrong audience and expired: issuer is checked first.
        let (verifier, _) = verifier_with(vec![TestKeypair::primary()]);
        let token = TestTokenBuilder::new()
            .with_issuer("https://evil.example/")
            .with_audience("OtherAPI")
            .expires_in(-10)
            .sign(&TestKeypair::primary());

        assert_eq!(
            verifier.verify_configured(&token).await.unwrap_err(),
            VerifyError::IssuerMismatch
        );
    }

    #[test]
    fn test_error_labels_are_distinct() {
        let labels = [
            VerifyError::MalformedToken,
            VerifyError::AlgorithmMismatch,
            VerifyError::UnknownKey,
            VerifyError::BadSignature,
            VerifyError::IssuerMismatch,
            VerifyError::AudienceMismatch,
            VerifyError::Expired,
        ]
        .map(|e| e.as_str());

        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
