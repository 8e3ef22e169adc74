//! Identity established by a successfully verified token.
//!
//! The subject identifies a user and is redacted in Debug output.

use serde_json::{Map, Value};
use std::fmt;

/// The identity attached to a request after verification.
#[derive(Clone)]
pub struct VerifiedPrincipal {
    /// `sub` claim, or empty when the token carries none.
    pub subject: String,

    /// All claims of the verified token.
    pub claims: Map<String, Value>,
}

impl fmt::Debug for VerifiedPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut claim_names: Vec<&str> = self.claims.keys().map(String::as_str).collect();
        claim_names.sort_unstable();

        f.debug_struct("VerifiedPrincipal")
            .field("subject", &"[REDACTED]")
            .field("claims", &claim_names)
            .finish()
    }
}

impl VerifiedPrincipal {
    /// Build a principal from verified claims.
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self { subject, claims }
    }

    /// Look up a string claim.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}
