//! Error types for schema and contract checks.

use thiserror::Error;

/// Schema operation result type.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema and contract errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The feature schema document could not be parsed
    #[error("Invalid feature schema: {0}")]
    Parse(#[from] toml::de::Error),

    /// The feature schema document parsed but is inconsistent
    #[error("Invalid feature schema: {0}")]
    Invalid(String),

    /// IO error reading a schema file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An artifact header or column set does not match the contract
    #[error("Schema mismatch: {0}")]
    Mismatch(String),

    /// A value cannot be represented in the target type
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl SchemaError {
    /// Create an invalid schema error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a schema mismatch error.
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::Mismatch(msg.into())
    }

    /// Create an invalid value error.
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}
