//! HMAC-SHA256 signing of outbound merchant callbacks.
//!
//! Signature covers `"{timestamp}.{body}"` under this gateway's own
//! header names (`X-Signature` / `X-Signature-Timestamp`).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Signature-Timestamp";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing secret")]
    InvalidKey,
}

/// Computes `v1=<hex>` for `body` signed at `timestamp` (unix seconds).
pub fn sign(secret: &str, timestamp: u64, body: &str) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError::InvalidKey)?;
    mac.update(format!("{timestamp}.{body}").as_bytes());
    Ok(format!("v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Current-time convenience wrapper around [`sign`] for outbound calls.
pub fn sign_now(secret: &str, body: &str) -> Result<(u64, String), SigningError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let signature = sign(secret, now, body)?;
    Ok((now, signature))
}

/// Verifies a `v1=<hex>` signature against `body` signed at `timestamp`.
/// Constant-time by virtue of `Mac::verify_slice`.
pub fn verify(secret: &str, timestamp: u64, body: &str, signature: &str) -> bool {
    let Some(hex_sig) = signature.strip_prefix("v1=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{timestamp}.{body}").as_bytes());
    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_sign_and_verify() {
        let secret = "topsecret";
        let body = r#"{"event":"INVOICE_STATUS_CHANGED"}"#;
        let signature = sign(secret, 1_700_000_000, body).unwrap();
        assert!(verify(secret, 1_700_000_000, body, &signature));
    }

    #[test]
    fn rejects_signature_for_a_different_body() {
        let secret = "topsecret";
        let signature = sign(secret, 1_700_000_000, "original").unwrap();
        assert!(!verify(secret, 1_700_000_000, "tampered", &signature));
    }

    #[test]
    fn rejects_malformed_signature_prefix() {
        assert!(!verify("secret", 1_700_000_000, "body", "deadbeef"));
    }
}
