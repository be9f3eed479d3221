use hmac::{Hmac, Mac};
use log::warn;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Check an Iute webhook signature: HMAC-SHA256 over the raw body concatenated with the
/// timestamp header, compared against the base64 signature header.
pub fn verify_webhook_signature(secret: &str, body: &[u8], timestamp: &str, signature_b64: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        warn!("🪝️ Webhook secret unusable as an HMAC key");
        return false;
    };
    mac.update(body);
    mac.update(timestamp.as_bytes());
    let Ok(signature) = base64::decode(signature_b64) else {
        warn!("🪝️ Webhook signature is not valid base64");
        return false;
    };
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    fn sign(secret: &str, body: &[u8], timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        mac.update(timestamp.as_bytes());
        base64::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let body = br#"{"orderId":"CRM-42"}"#;
        let signature = sign("topsecret", body, "1715000000");
        assert!(verify_webhook_signature("topsecret", body, "1715000000", &signature));
    }

    #[test]
    fn rejects_tampering() {
        let body = br#"{"orderId":"CRM-42"}"#;
        let signature = sign("topsecret", body, "1715000000");
        assert!(!verify_webhook_signature("topsecret", br#"{"orderId":"CRM-43"}"#, "1715000000", &signature));
        assert!(!verify_webhook_signature("topsecret", body, "1715000001", &signature));
        assert!(!verify_webhook_signature("wrongsecret", body, "1715000000", &signature));
        assert!(!verify_webhook_signature("topsecret", body, "1715000000", "not-base64!!"));
    }
}
