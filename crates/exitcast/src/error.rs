//! Pipeline error taxonomy.
//!
//! Only batch-fatal conditions are errors. Per-row conditions (missing
//! episodes, dropped rows, already-encrypted values) are counted in the stage
//! reports instead.

use exitcast_db::DbError;
use exitcast_schema::SchemaError;
use exitcast_security::TokenError;
use thiserror::Error;

/// Pipeline operation result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The store could not be reached. The stage wrote nothing further.
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// An expected artifact is absent from the artifact channel
    #[error("Artifact '{0}' not found")]
    ArtifactMissing(String),

    /// An expected column is missing or renamed at a stage boundary
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The classifier does not fit the feature matrix
    #[error("Model mismatch: {0}")]
    ModelMismatch(String),

    /// A value cannot be interpreted
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A required setting is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store rejected a batch-level statement
    #[error("Store error: {0}")]
    Store(#[source] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn model_mismatch(msg: impl Into<String>) -> Self {
        Self::ModelMismatch(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the store or artifact channel was unreachable.
    ///
    /// The external scheduler retries these wholesale.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::ArtifactMissing(_))
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Connectivity(_) | Self::ArtifactMissing(_) => 3,
            Self::SchemaMismatch(_) | Self::ModelMismatch(_) => 4,
            Self::InvalidValue(_) => 5,
            Self::Store(_) | Self::Io(_) | Self::Csv(_) => 1,
        }
    }
}

impl From<DbError> for PipelineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connectivity(inner) => Self::Connectivity(inner.to_string()),
            DbError::InvalidIdentifier(msg) => Self::Config(msg),
            DbError::UnsupportedColumn { column, type_name } => Self::SchemaMismatch(format!(
                "column '{}' has unsupported store type {}",
                column, type_name
            )),
            DbError::Schema(inner) => inner.into(),
            other => Self::Store(other),
        }
    }
}

impl From<SchemaError> for PipelineError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Mismatch(msg) => Self::SchemaMismatch(msg),
            SchemaError::InvalidValue(msg) => Self::InvalidValue(msg),
            SchemaError::Io(inner) => Self::Io(inner),
            SchemaError::Parse(_) | SchemaError::Invalid(_) => Self::Config(err.to_string()),
        }
    }
}

impl From<TokenError> for PipelineError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidKey(msg) => Self::Config(format!("ENCRYPTION_KEY: {}", msg)),
            other => Self::InvalidValue(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_key_is_config() {
        let err: PipelineError = TokenError::InvalidKey("too short".into()).into();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_schema_errors_map_onto_taxonomy() {
        let err: PipelineError = SchemaError::mismatch("no gender").into();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
        let err: PipelineError = SchemaError::invalid_value("bad label").into();
        assert!(matches!(err, PipelineError::InvalidValue(_)));
    }

    #[test]
    fn test_missing_artifact_is_connectivity_class() {
        assert!(PipelineError::ArtifactMissing("predictions.csv".into()).is_connectivity());
        assert!(!PipelineError::schema_mismatch("x").is_connectivity());
    }
}
