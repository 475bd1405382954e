//! Exitcast Security Module
//!
//! Provides:
//! - **Keys**: parsing and derivation of the tokenization key
//! - **Tokens**: authenticated, non-deterministic encryption of sensitive values

pub mod key;
pub mod token;

pub use key::TokenKey;
pub use token::{decrypt, encrypt, encrypt_at, token_kind, TokenError, TokenKind};
