//! Authenticated, non-deterministic tokens.
//!
//! Layout before encoding:
//!
//! ```text
//! version (1) | issued_at unix seconds, big endian (8) | nonce (12) | ciphertext + tag
//! ```
//!
//! The version byte and timestamp are bound as associated data. A fresh random
//! nonce per call means the same plaintext never yields the same token twice.
//! Tokens are url-safe base64 without padding.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::key::TokenKey;

const VERSION: u8 = 0xA1;
const HEADER_LEN: usize = 1 + 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_TOKEN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Version byte and minimum decoded length of the previous service's tokens
/// (AES-CBC + HMAC with an embedded timestamp).
const LEGACY_VERSION: u8 = 0x80;
const LEGACY_MIN_LEN: usize = 1 + 8 + 16 + 16 + 32;

/// Token errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("not a token")]
    InvalidToken,
    #[error("invalid UTF-8 in decrypted value")]
    InvalidUtf8,
}

/// What a stored value looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Issued by this module
    Current,
    /// Issued by the previous tokenization service
    Legacy,
    /// Not a token; treat as plaintext
    Plain,
}

/// Classify a stored value without decrypting it.
pub fn token_kind(value: &str) -> TokenKind {
    let value = value.trim();
    if let Ok(bytes) = URL_SAFE_NO_PAD.decode(value) {
        if bytes.len() >= MIN_TOKEN_LEN && bytes[0] == VERSION {
            return TokenKind::Current;
        }
    }
    if let Ok(bytes) = URL_SAFE.decode(value) {
        if bytes.len() >= LEGACY_MIN_LEN && bytes[0] == LEGACY_VERSION {
            return TokenKind::Legacy;
        }
    }
    TokenKind::Plain
}

/// Encrypt `plaintext`, stamping the current time.
pub fn encrypt(plaintext: &str, key: &TokenKey) -> Result<String, TokenError> {
    encrypt_at(plaintext, key, Utc::now())
}

/// Encrypt `plaintext` with an explicit issue time.
pub fn encrypt_at(
    plaintext: &str,
    key: &TokenKey,
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    let seconds = u64::try_from(issued_at.timestamp()).map_err(|_| TokenError::EncryptionFailed)?;
    let mut header = [0u8; HEADER_LEN];
    header[0] = VERSION;
    header[1..].copy_from_slice(&seconds.to_be_bytes());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new(key.bytes().into());
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext.as_bytes(),
                aad: &header,
            },
        )
        .map_err(|_| TokenError::EncryptionFailed)?;

    let mut combined = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&header);
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(combined))
}

/// Decrypt a token, returning the plaintext and its issue time.
pub fn decrypt(token: &str, key: &TokenKey) -> Result<(String, DateTime<Utc>), TokenError> {
    let combined = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| TokenError::InvalidToken)?;
    if combined.len() < MIN_TOKEN_LEN || combined[0] != VERSION {
        return Err(TokenError::InvalidToken);
    }

    let (header, rest) = combined.split_at(HEADER_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = ChaCha20Poly1305::new(key.bytes().into());
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| TokenError::DecryptionFailed)?;

    let mut seconds = [0u8; 8];
    seconds.copy_from_slice(&header[1..]);
    let issued_at = i64::try_from(u64::from_be_bytes(seconds))
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or(TokenError::InvalidToken)?;

    let plaintext = String::from_utf8(plaintext).map_err(|_| TokenError::InvalidUtf8)?;
    Ok((plaintext, issued_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TokenKey {
        TokenKey::parse(&TokenKey::generate_encoded()).unwrap()
    }

    #[test]
    fn test_same_plaintext_different_tokens() {
        let key = key();
        let a = encrypt("6789", &key).unwrap();
        let b = encrypt("6789", &key).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, &key).unwrap().0, "6789");
        assert_eq!(decrypt(&b, &key).unwrap().0, "6789");
    }

    #[test]
    fn test_timestamp_embedded() {
        let key = key();
        let issued = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let token = encrypt_at("6789", &key, issued).unwrap();
        assert_eq!(decrypt(&token, &key).unwrap().1, issued);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let token = encrypt("6789", &key()).unwrap();
        assert_eq!(decrypt(&token, &key()), Err(TokenError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_timestamp_fails_authentication() {
        let key = key();
        let token = encrypt("6789", &key).unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        bytes[8] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);
        assert_eq!(decrypt(&tampered, &key), Err(TokenError::DecryptionFailed));
    }

    #[test]
    fn test_token_kind() {
        let token = encrypt("6789", &key()).unwrap();
        assert_eq!(token_kind(&token), TokenKind::Current);
        assert_eq!(token_kind("6789"), TokenKind::Plain);
        assert_eq!(token_kind("123-45-6789"), TokenKind::Plain);

        let mut legacy = vec![LEGACY_VERSION];
        legacy.extend_from_slice(&[0u8; LEGACY_MIN_LEN]);
        assert_eq!(token_kind(&URL_SAFE.encode(legacy)), TokenKind::Legacy);
    }

    #[test]
    fn test_plaintext_is_not_a_token() {
        assert_eq!(decrypt("6789", &key()), Err(TokenError::InvalidToken));
    }
}
