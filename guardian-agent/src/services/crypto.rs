//! Payload envelope for requests to and deliveries from the risk service.
//!
//! AES-256-GCM with a random 96-bit nonce prepended to the ciphertext. The
//! agent id and the registration `iv` material are bound as associated data,
//! so an envelope sealed for one agent cannot be replayed against another.

use crate::models::AgentCredentials;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Key, Nonce,
};
use agent_core::error::AppError;
use base64::{engine::general_purpose::STANDARD as B64, Engine};

const NONCE_LEN: usize = 12;

fn cipher_for(creds: &AgentCredentials) -> Result<Aes256Gcm, AppError> {
    let key_bytes = B64
        .decode(&creds.key)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Agent key is not valid base64: {}", e)))?;

    if key_bytes.len() != 32 {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "Agent key must be 32 bytes, got {}",
            key_bytes.len()
        )));
    }

    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes)))
}

fn associated_data(creds: &AgentCredentials) -> Result<Vec<u8>, AppError> {
    let iv_bytes = B64
        .decode(&creds.iv)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Agent iv is not valid base64: {}", e)))?;

    let mut aad = creds.agent_id.as_bytes().to_vec();
    aad.extend_from_slice(&iv_bytes);
    Ok(aad)
}

/// Encrypt a payload for the wire. Returns base64(nonce || ciphertext).
pub fn seal(creds: &AgentCredentials, plaintext: &[u8]) -> Result<String, AppError> {
    let cipher = cipher_for(creds)?;
    let aad = associated_data(creds)?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            aes_gcm::aead::Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Envelope encryption failed: {}", e)))?;

    let mut sealed = nonce.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(B64.encode(sealed))
}

/// Decrypt a base64(nonce || ciphertext) envelope. Tampering, a wrong key,
/// or mismatched associated data all fail authentication.
pub fn open(creds: &AgentCredentials, sealed_b64: &str) -> Result<Vec<u8>, AppError> {
    let sealed = B64
        .decode(sealed_b64)
        .map_err(|e| AppError::AuthError(anyhow::anyhow!("Envelope is not valid base64: {}", e)))?;

    if sealed.len() < NONCE_LEN {
        return Err(AppError::AuthError(anyhow::anyhow!("Envelope too short")));
    }

    let cipher = cipher_for(creds)?;
    let aad = associated_data(creds)?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| AppError::AuthError(anyhow::anyhow!("Envelope authentication failed")))
}

/// Generate fresh key material, base64 encoded. Used by tests and local
/// tooling; production keys come from the registration response.
pub fn generate_key_b64() -> String {
    use rand::RngCore;
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    B64.encode(key)
}

pub fn generate_iv_b64() -> String {
    use rand::RngCore;
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    B64.encode(iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_creds() -> AgentCredentials {
        AgentCredentials {
            agent_id: "agent-1".to_string(),
            key: generate_key_b64(),
            iv: generate_iv_b64(),
            org_id: "org-1".to_string(),
            auth_group_id: "group-1".to_string(),
            service_name: "test".to_string(),
            salt: "00".to_string(),
            reverse_dns: true,
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let creds = test_creds();
        let sealed = seal(&creds, b"{\"username\":\"alice\"}").unwrap();
        let opened = open(&creds, &sealed).unwrap();
        assert_eq!(opened, b"{\"username\":\"alice\"}");
    }

    #[test]
    fn tampered_envelope_fails_authentication() {
        let creds = test_creds();
        let sealed = seal(&creds, b"payload").unwrap();

        let mut raw = B64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = B64.encode(raw);

        assert!(open(&creds, &tampered).is_err());
    }

    #[test]
    fn envelope_is_bound_to_the_agent() {
        let creds = test_creds();
        let sealed = seal(&creds, b"payload").unwrap();

        let mut other = creds.clone();
        other.agent_id = "agent-2".to_string();
        assert!(open(&other, &sealed).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let creds = test_creds();
        let sealed = seal(&creds, b"payload").unwrap();

        let mut other = creds.clone();
        other.key = generate_key_b64();
        assert!(open(&other, &sealed).is_err());
    }
}
