//! Error types for the store layer.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Store errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// The store cannot be reached (pool, socket, TLS). Fatal for the invocation.
    #[error("Store unreachable: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// Any other SQL failure (missing table, bad column, constraint, ...)
    #[error("Database error: {0}")]
    Query(#[source] sqlx::Error),

    /// A configured identifier is not a plain SQL identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A column holds a type the extract cannot represent
    #[error("Unsupported type '{type_name}' in column '{column}'")]
    UnsupportedColumn { column: String, type_name: String },

    /// Extracted rows do not form a valid batch
    #[error("Schema error: {0}")]
    Schema(#[from] exitcast_schema::SchemaError),
}

impl DbError {
    /// True when the failure means the store could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DbError::Connectivity(_))
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::InvalidIdentifier(msg.into())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Connectivity(err),
            other => DbError::Query(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connectivity() {
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_connectivity());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_connectivity());
        assert!(!DbError::from(sqlx::Error::RowNotFound).is_connectivity());
    }
}
