//! Request-level idempotency: fingerprinting and replay detection for
//! `Idempotency-Key`-bearing API requests.

use sha2::{Digest, Sha256};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Fingerprints a canonicalized request body so that a reused
/// `Idempotency-Key` with a *different* body can be rejected as a
/// conflict rather than silently replaying the wrong cached response.
pub fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bodies_fingerprint_identically() {
        assert_eq!(fingerprint(r#"{"a":1}"#), fingerprint(r#"{"a":1}"#));
    }

    #[test]
    fn different_bodies_fingerprint_differently() {
        assert_ne!(fingerprint(r#"{"a":1}"#), fingerprint(r#"{"a":2}"#));
    }
}
