//! Webhook signature verification
//!
//! The signature header doubles as the idempotency key, so the verifier
//! always returns it as an opaque [`Signature`]. When a webhook secret is
//! configured the header must also be the hex HMAC-SHA256 of the raw body.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::reversal::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Characters of a signature that are safe to put in logs
const LOG_PREFIX_LEN: usize = 12;

/// Authenticity token attached to a delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log fields
    pub fn redacted(&self) -> &str {
        match self.0.char_indices().nth(LOG_PREFIX_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Signature {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Verifies the signature header of inbound deliveries
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier; without a secret only presence is checked
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Whether payload HMACs are checked
    pub fn checks_payload(&self) -> bool {
        self.secret.is_some()
    }

    /// Require a non-blank header
    pub fn verify(&self, raw_header: Option<&str>) -> Result<Signature, SignatureError> {
        raw_header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(Signature::new)
            .ok_or(SignatureError::Missing)
    }

    /// Require a non-blank header and, when a secret is set, a matching HMAC
    pub fn verify_payload(
        &self,
        raw_header: Option<&str>,
        body: &[u8],
    ) -> Result<Signature, SignatureError> {
        let signature = self.verify(raw_header)?;

        if let Some(secret) = &self.secret {
            let expected = hex::decode(signature.as_str()).map_err(|_| SignatureError::Mismatch)?;
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|_| SignatureError::Mismatch)?;
            mac.update(body);
            // verify_slice compares in constant time
            mac.verify_slice(&expected)
                .map_err(|_| SignatureError::Mismatch)?;
        }

        Ok(signature)
    }

    /// Compute the header value for a body (used by tests and senders)
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_signature() {
        let verifier = SignatureVerifier::default();
        assert_eq!(verifier.verify(None), Err(SignatureError::Missing));
        assert_eq!(verifier.verify(Some("")), Err(SignatureError::Missing));
        assert_eq!(verifier.verify(Some("   ")), Err(SignatureError::Missing));
    }

    #[test]
    fn test_presence_only() {
        let verifier = SignatureVerifier::new(None);
        assert!(!verifier.checks_payload());
        let sig = verifier.verify_payload(Some("sig-1"), b"{}").unwrap();
        assert_eq!(sig.as_str(), "sig-1");
    }

    #[test]
    fn test_hmac_roundtrip() {
        let verifier = SignatureVerifier::new(Some("whsec_test".to_string()));
        let body = br#"{"transaction":{}}"#;
        let header = verifier.sign(body).unwrap();

        assert!(verifier.verify_payload(Some(&header), body).is_ok());
        assert_eq!(
            verifier.verify_payload(Some(&header), b"tampered"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_hmac_rejects_non_hex() {
        let verifier = SignatureVerifier::new(Some("whsec_test".to_string()));
        assert_eq!(
            verifier.verify_payload(Some("not-hex"), b"{}"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_empty_secret_means_presence_only() {
        let verifier = SignatureVerifier::new(Some(String::new()));
        assert!(!verifier.checks_payload());
    }

    #[test]
    fn test_redacted() {
        let sig = Signature::new("eyJhbGciOiJSUzI1NiIsImtpZCI6IjEifQ");
        assert_eq!(sig.redacted(), "eyJhbGciOiJS");
        assert_eq!(Signature::new("short").redacted(), "short");
    }

    #[test]
    fn test_debug_hides_secret() {
        let verifier = SignatureVerifier::new(Some("whsec_test".to_string()));
        assert!(!format!("{verifier:?}").contains("whsec_test"));
    }
}
