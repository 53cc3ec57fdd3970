//! Confidentiality Guard
//!
//! Field-level authenticated encryption for sensitive record fields
//! (content, context), AES-GCM-256 with a fresh nonce per call. Each agent
//! gets its own subkey derived from the process-wide master key, so an
//! envelope encrypted for one employee never decrypts for another.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MemoryError;

const TAG_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Output of [`ConfidentialityGuard::encrypt`]. All byte fields are hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub employee_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Encrypts and decrypts sensitive fields, keyed per agent.
pub struct ConfidentialityGuard {
    master_key: [u8; 32],
}

impl ConfidentialityGuard {
    /// The master key must come from a durable secret store; a key minted at
    /// startup strands every previously written ciphertext.
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    /// Per-agent subkey: SHA-256(master_key || employee_id).
    fn subkey(&self, employee_id: &str) -> Key<Aes256Gcm> {
        let mut hasher = Sha256::new();
        hasher.update(self.master_key);
        hasher.update(employee_id.as_bytes());
        let digest = hasher.finalize();
        *Key::<Aes256Gcm>::from_slice(&digest)
    }

    pub fn encrypt(&self, data: &str, employee_id: &str) -> Result<EncryptedEnvelope, MemoryError> {
        let cipher = Aes256Gcm::new(&self.subkey(employee_id));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut sealed = cipher.encrypt(&nonce, data.as_bytes()).map_err(|e| {
            MemoryError::Encryption {
                employee_id: employee_id.to_string(),
                operation: "encrypt",
                reason: e.to_string(),
            }
        })?;

        // The AEAD output carries the tag in its last 16 bytes; split it out
        // so the envelope exposes ciphertext and tag separately.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedEnvelope {
            ciphertext: hex::encode(sealed),
            iv: hex::encode(nonce),
            auth_tag: hex::encode(tag),
            employee_id: employee_id.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Verifies the tag and reverses encryption. Fails with a DecryptionError
    /// on tag mismatch, wrong employee, or a malformed envelope; never
    /// returns garbage plaintext.
    pub fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        employee_id: &str,
    ) -> Result<String, MemoryError> {
        let fail = |reason: String| MemoryError::Decryption {
            employee_id: employee_id.to_string(),
            operation: "decrypt",
            reason,
        };

        let iv = hex::decode(&envelope.iv).map_err(|e| fail(format!("bad iv: {e}")))?;
        if iv.len() != NONCE_LEN {
            return Err(fail(format!("iv must be {NONCE_LEN} bytes, got {}", iv.len())));
        }
        let mut sealed =
            hex::decode(&envelope.ciphertext).map_err(|e| fail(format!("bad ciphertext: {e}")))?;
        let tag =
            hex::decode(&envelope.auth_tag).map_err(|e| fail(format!("bad auth tag: {e}")))?;
        if tag.len() != TAG_LEN {
            return Err(fail(format!("auth tag must be {TAG_LEN} bytes, got {}", tag.len())));
        }
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(&self.subkey(employee_id));
        let nonce = Nonce::from_slice(&iv);
        let plaintext = cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| fail("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| fail(format!("plaintext not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ConfidentialityGuard {
        ConfidentialityGuard::new([7u8; 32])
    }

    #[test]
    fn round_trip() {
        let guard = guard();
        for content in ["hello", "", "snörkel 🧠 памятка", "a]b{c}\"d\""] {
            let envelope = guard.encrypt(content, "emp_004").unwrap();
            assert_eq!(guard.decrypt(&envelope, "emp_004").unwrap(), content);
        }
    }

    #[test]
    fn fresh_iv_per_call() {
        let guard = guard();
        let a = guard.encrypt("same", "emp_004").unwrap();
        let b = guard.encrypt("same", "emp_004").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_employee_fails() {
        let guard = guard();
        let envelope = guard.encrypt("private", "emp_004").unwrap();
        let err = guard.decrypt(&envelope, "emp_005").unwrap_err();
        assert!(matches!(err, MemoryError::Decryption { .. }));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let guard = guard();
        let mut envelope = guard.encrypt("private", "emp_004").unwrap();
        let mut bytes = hex::decode(&envelope.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        envelope.ciphertext = hex::encode(bytes);
        assert!(guard.decrypt(&envelope, "emp_004").is_err());
    }

    #[test]
    fn malformed_envelope_fails_cleanly() {
        let guard = guard();
        let envelope = EncryptedEnvelope {
            ciphertext: "zz-not-hex".to_string(),
            iv: "00".to_string(),
            auth_tag: String::new(),
            employee_id: "emp_004".to_string(),
            timestamp: Utc::now(),
        };
        assert!(matches!(
            guard.decrypt(&envelope, "emp_004"),
            Err(MemoryError::Decryption { .. })
        ));
    }
}
