// Webhook signing (HMAC-SHA256 over the raw request body)

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded signature, both directions
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex HMAC-SHA256 of `body`.
///
/// None if the key is rejected by the MAC.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return None;
    };
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex signature in constant time.
///
/// An optional `sha256=` prefix is accepted. Malformed hex never matches.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_accepts_valid_signature() {
        let body = br#"{"success":true}"#;
        let sig = sign("secret", body).unwrap();
        assert!(verify("secret", body, &sig));
        assert!(verify("secret", body, &format!("sha256={}", sig)));
        assert!(verify("secret", body, &sig.to_uppercase()));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let sig = sign("secret", br#"{"success":false}"#).unwrap();
        assert!(!verify("secret", br#"{"success":true}"#, &sig));
        assert!(!verify("other", br#"{"success":false}"#, &sig));
        assert!(!verify("secret", br#"{"success":false}"#, "not-hex"));
        assert!(!verify("secret", br#"{"success":false}"#, ""));
    }

    #[test]
    fn test_sign_accepts_any_key_length() {
        let body = b"{}";
        let long = "x".repeat(200);
        for secret in ["", "k", long.as_str()] {
            let sig = sign(secret, body).unwrap();
            assert_eq!(sig.len(), 64);
            assert!(verify(secret, body, &sig));
        }
    }
}
