//! Webhook signature verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 keyed by the
//! shared webhook secret and sends the hex digest in [`SIGNATURE_HEADER`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::WebhookPayload;
use crate::{HostingError, Result};

pub const SIGNATURE_HEADER: &str = "x-hosting-signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Parse a webhook body.
pub fn parse_payload(body: &[u8]) -> Result<WebhookPayload> {
    serde_json::from_slice(body).map_err(|e| HostingError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"id":"dpl_1","state":"READY"}"#;
        let signature = sign("s3cret", body);

        assert!(verify_signature("s3cret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("s3cret", b"tampered", &signature));
        assert!(!verify_signature("s3cret", body, "not-hex"));
    }
}
