//! Tokenization key handling.
//!
//! Operators supply a 32-byte key as url-safe base64 (the same shape the
//! previous service used). The cipher never sees it directly: it is stretched
//! through SHA-256 under a domain tag first.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::token::TokenError;

const KEY_LEN: usize = 32;
const DERIVATION_TAG: &[u8] = b"exitcast/ssn-token/v1";

/// A derived tokenization key.
#[derive(Clone)]
pub struct TokenKey {
    derived: [u8; KEY_LEN],
}

impl TokenKey {
    /// Parse an operator-supplied key (url-safe base64, padded or not).
    pub fn parse(encoded: &str) -> Result<Self, TokenError> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(TokenError::InvalidKey("key is empty".to_string()));
        }
        let raw = URL_SAFE
            .decode(trimmed)
            .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
            .map_err(|_| TokenError::InvalidKey("key is not url-safe base64".to_string()))?;
        if raw.len() != KEY_LEN {
            return Err(TokenError::InvalidKey(format!(
                "key must decode to {} bytes, got {}",
                KEY_LEN,
                raw.len()
            )));
        }
        Ok(Self::derive(&raw))
    }

    /// Generate a fresh random key, returned in its encoded form.
    pub fn generate_encoded() -> String {
        let mut raw = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        URL_SAFE.encode(raw)
    }

    fn derive(raw: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DERIVATION_TAG);
        hasher.update([0x1f]);
        hasher.update(raw);
        Self {
            derived: hasher.finalize().into(),
        }
    }

    /// Short, non-reversible identifier of the key for logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.derived);
        hex::encode(&digest[..6])
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.derived
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_parses() {
        let encoded = TokenKey::generate_encoded();
        let key = TokenKey::parse(&encoded).unwrap();
        assert_eq!(key.fingerprint().len(), 12);
    }

    #[test]
    fn test_unpadded_key_accepted() {
        let encoded = URL_SAFE_NO_PAD.encode([7u8; 32]);
        let padded = URL_SAFE.encode([7u8; 32]);
        assert_eq!(
            TokenKey::parse(&encoded).unwrap().fingerprint(),
            TokenKey::parse(&padded).unwrap().fingerprint()
        );
    }

    #[test]
    fn test_malformed_keys_rejected() {
        assert!(TokenKey::parse("").is_err());
        assert!(TokenKey::parse("not base64 !!").is_err());
        assert!(TokenKey::parse(&URL_SAFE.encode([1u8; 16])).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = TokenKey::parse(&URL_SAFE.encode([9u8; 32])).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("fingerprint"));
        assert!(!rendered.contains("derived"));
    }
}
