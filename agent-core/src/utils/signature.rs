use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Sign a request with the agent key.
///
/// Format: HMAC-SHA256(method|path|timestamp|nonce|body_hash, key)
pub fn sign_request(
    key: &str,
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &str,
) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    let body_hash = hex::encode(Sha256::digest(body.as_bytes()));

    let payload = format!("{}|{}|{}|{}|{}", method, path, timestamp, nonce, body_hash);

    mac.update(payload.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a request signature using constant-time comparison.
pub fn verify_request(
    key: &str,
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &str,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = sign_request(key, method, path, timestamp, nonce, body)?;

    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let key = "agent_key_b64";
        let method = "POST";
        let path = "/guardiankey/webhook";
        let timestamp = 1722470400;
        let nonce = "d41f3c9a";
        let body = r#"{"payload":"AAAA"}"#;

        let signature = sign_request(key, method, path, timestamp, nonce, body).unwrap();
        assert!(!signature.is_empty());

        let is_valid =
            verify_request(key, method, path, timestamp, nonce, body, &signature).unwrap();
        assert!(is_valid);
    }

    #[test]
    fn altered_signature_is_rejected() {
        let key = "agent_key_b64";
        let method = "POST";
        let path = "/guardiankey/webhook";
        let timestamp = 1722470400;
        let nonce = "d41f3c9a";
        let body = r#"{"payload":"AAAA"}"#;

        let signature = sign_request(key, method, path, timestamp, nonce, body).unwrap();
        let tampered = format!("f{}", &signature[1..]);

        let is_valid =
            verify_request(key, method, path, timestamp, nonce, body, &tampered).unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn tampered_body_is_rejected() {
        let key = "agent_key_b64";
        let method = "POST";
        let path = "/api/v1/checkaccess";
        let timestamp = 1722470400;
        let nonce = "d41f3c9a";

        let signature =
            sign_request(key, method, path, timestamp, nonce, r#"{"username":"ann"}"#).unwrap();

        let is_valid = verify_request(
            key,
            method,
            path,
            timestamp,
            nonce,
            r#"{"username":"bob"}"#,
            &signature,
        )
        .unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn nonce_is_part_of_the_signature() {
        let key = "agent_key_b64";
        let body = r#"{"payload":"AAAA"}"#;

        let signature =
            sign_request(key, "POST", "/guardiankey/webhook", 1722470400, "n1", body).unwrap();

        let is_valid = verify_request(
            key,
            "POST",
            "/guardiankey/webhook",
            1722470400,
            "n2",
            body,
            &signature,
        )
        .unwrap();
        assert!(!is_valid);
    }
}
