//! Fixed cryptographic fixtures for testing
//!
//! Two 2048-bit RSA keypairs checked in under `fixtures/`. They are
//! test-only keys and are NOT used anywhere else.

use jsonwebtoken::EncodingKey;
use serde_json::{json, Value};

/// Public exponent shared by both fixture keys (65537).
pub const TEST_RSA_EXPONENT: &str = "AQAB";

const PRIMARY_PEM: &str = include_str!("../fixtures/primary.pem");
const PRIMARY_MODULUS: &str = "j9EkIptemy4ZDj8rgGGcgIlN_BYVW0tCaEweIMkqqznn0sWKLbZAvzOENJpT9C93qqc6WbIW7H4uAS-F7rZ4J6lIgdTyqtYEIbPtnFYB0clPvXGWeNkveTVUEJvLGkCcFTigWqYLxVbiALpz08xV0OndI9lor5u9jiNt8n2zY5WtCTYM-zR3OJQFX_vpZmVGG17P8HnkWA5aHZ8Jx2t--7si9eRY-BPDiu9NnP-oKIwmMnuNo8v5UnUkoM_JSLr4RsRA8Z8roFIM7J-RmPca8dBIThxKxpYU8nz3IdpFJW7U2arnfgXG2NLq0g4xhutbRak4Wu6WmlzXcc74joAPCw";

const SECONDARY_PEM: &str = include_str!("../fixtures/secondary.pem");
const SECONDARY_MODULUS: &str = "k9XWwezFL4aHdw8v5eoNvT5XwsUokMRCbsVHxhrkpYtbbInC0ETP2hNGrgSVKNFBlU1s16zTK6D5OG0Dt5roCiVe-AdcEH7cZEo8eoVwqP2x75SD56zVd-qfAjtQUFoefaBVfXcloI-zqC9iAkjP4c34yuUdHf6kW2ESuK7_jdri8Go7QRh24VSnB_M_HRaidlCsKyDy1KsXs-Fihdv05hLcrgccwfo0R0tzDwaWPJHmDfxg9Hz8ug9Uf7uVZUgQWP4V40znXf90FYKJ45WZ-mVOJWSZIqmLKLBBZhl22OeQdPCCIXlHuhSrew0rSpvVDYOEB0-rn5KYZLbYIG1O0Q";

/// An RSA keypair with a key ID.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::primary();
/// let jwks = json!({ "keys": [keypair.jwk_json()] });
/// let token = TestTokenBuilder::new().sign(&keypair);
/// ```
#[derive(Debug, Clone)]
pub struct TestKeypair {
    kid: String,
    private_pem: &'static str,
    modulus: &'static str,
}

impl TestKeypair {
    /// The primary fixture key, kid `test-key-1`.
    pub fn primary() -> Self {
        Self {
            kid: "test-key-1".to_string(),
            private_pem: PRIMARY_PEM,
            modulus: PRIMARY_MODULUS,
        }
    }

    /// The secondary fixture key, kid `test-key-2`.
    pub fn secondary() -> Self {
        Self {
            kid: "test-key-2".to_string(),
            private_pem: SECONDARY_PEM,
            modulus: SECONDARY_MODULUS,
        }
    }

    /// Same key material under a different key ID.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Key ID.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Base64url RSA modulus.
    pub fn modulus(&self) -> &str {
        self.modulus
    }

    /// Private key for signing tokens.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.private_pem.as_bytes())
            .expect("fixture PEM should be a valid RSA private key")
    }

    /// The public half as a JWK, as an identity provider would publish it.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "alg": "RS256",
            "use": "sig",
            "n": self.modulus,
            "e": TEST_RSA_EXPONENT,
        })
    }
}

/// A key discovery document containing `keys`.
pub fn jwks_json(keys: &[TestKeypair]) -> Value {
    json!({
        "keys": keys.iter().map(TestKeypair::jwk_json).collect::<Vec<_>>()
    })
}
