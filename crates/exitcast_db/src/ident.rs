//! SQL identifier guard.
//!
//! The episode table name comes from configuration and is spliced into
//! statements, so it must be a plain identifier and nothing more.

use std::fmt;

use crate::error::{DbError, Result};

const MAX_IDENT_LEN: usize = 63;
const RESERVED: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TABLE", "WHERE", "FROM",
];

/// A validated table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_identifier(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate that `raw` is `[A-Za-z_][A-Za-z0-9_]*`, bounded and not a keyword.
pub fn validate_identifier(raw: &str) -> Result<()> {
    let mut chars = raw.chars();
    let first = chars
        .next()
        .ok_or_else(|| DbError::invalid_identifier("identifier is empty"))?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(DbError::invalid_identifier(format!(
            "'{}' must start with a letter or underscore",
            raw
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(DbError::invalid_identifier(format!(
            "'{}' contains forbidden character '{}'",
            raw, bad
        )));
    }
    if raw.len() > MAX_IDENT_LEN {
        return Err(DbError::invalid_identifier(format!(
            "'{}' is longer than {} characters",
            raw, MAX_IDENT_LEN
        )));
    }
    if RESERVED.contains(&raw.to_ascii_uppercase().as_str()) {
        return Err(DbError::invalid_identifier(format!(
            "'{}' is a reserved word",
            raw
        )));
    }
    Ok(())
}
