//! Environment-supplied configuration.
//!
//! Every setting has a flag and an environment variable. Required values are
//! checked when a command resolves them, before any store or artifact I/O.

use clap::Args;
use exitcast_db::StoreConfig;
use exitcast_schema::FeatureSchemaSpec;
use std::path::PathBuf;
use std::time::Duration;

use crate::artifact::FsArtifactStore;
use crate::error::{PipelineError, Result};
use crate::tokenize::Tokenizer;

/// Store connection settings.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Store connection URL, credentials included
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Episode table
    #[arg(long, env = "EXITCAST_TABLE", default_value = "guests")]
    pub table: String,

    /// Seconds to wait for a store connection before failing the stage
    #[arg(long, env = "EXITCAST_CONNECT_TIMEOUT", default_value_t = 30)]
    pub connect_timeout: u64,
}

impl StoreArgs {
    pub fn store_config(&self) -> Result<StoreConfig> {
        let url = self
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PipelineError::config("DATABASE_URL is not set"))?;
        Ok(StoreConfig::new(url, self.table.clone())
            .with_acquire_timeout(Duration::from_secs(self.connect_timeout)))
    }
}

/// Artifact channel location and object names.
#[derive(Debug, Clone, Args)]
pub struct ArtifactArgs {
    /// Directory holding interchange artifacts and the model
    #[arg(long, env = "EXITCAST_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Feature artifact object name
    #[arg(long, env = "EXITCAST_FEATURES_OBJECT", default_value = "wrangled_guests.csv")]
    pub features_object: String,

    /// Prediction artifact object name
    #[arg(long, env = "EXITCAST_PREDICTIONS_OBJECT", default_value = "predictions.csv")]
    pub predictions_object: String,

    /// Serialized classifier object name
    #[arg(long, env = "EXITCAST_MODEL_OBJECT", default_value = "model.json")]
    pub model_object: String,
}

/// Object names used by one pipeline cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactObjects {
    pub features: String,
    pub predictions: String,
    pub model: String,
}

impl Default for ArtifactObjects {
    fn default() -> Self {
        Self {
            features: "wrangled_guests.csv".to_string(),
            predictions: "predictions.csv".to_string(),
            model: "model.json".to_string(),
        }
    }
}

impl ArtifactArgs {
    pub fn artifact_store(&self) -> Result<FsArtifactStore> {
        let dir = self
            .artifact_dir
            .clone()
            .ok_or_else(|| PipelineError::config("EXITCAST_ARTIFACT_DIR is not set"))?;
        Ok(FsArtifactStore::new(dir))
    }

    pub fn objects(&self) -> ArtifactObjects {
        ArtifactObjects {
            features: self.features_object.clone(),
            predictions: self.predictions_object.clone(),
            model: self.model_object.clone(),
        }
    }
}

/// Feature schema override.
#[derive(Debug, Clone, Args)]
pub struct SchemaArgs {
    /// Feature schema TOML replacing the built-in one
    #[arg(long = "schema", env = "EXITCAST_SCHEMA")]
    pub schema_path: Option<PathBuf>,
}

impl SchemaArgs {
    pub fn load(&self) -> Result<FeatureSchemaSpec> {
        match &self.schema_path {
            Some(path) => FeatureSchemaSpec::load_from_path(path).map_err(|e| {
                PipelineError::config(format!("feature schema {}: {}", path.display(), e))
            }),
            None => Ok(FeatureSchemaSpec::builtin()?),
        }
    }
}

/// Tokenization key.
#[derive(Debug, Clone, Args)]
pub struct KeyArgs {
    /// Url-safe base64 key (32 bytes)
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,
}

impl KeyArgs {
    pub fn tokenizer(&self) -> Result<Tokenizer> {
        let encoded = self
            .encryption_key
            .as_deref()
            .ok_or_else(|| PipelineError::config("ENCRYPTION_KEY is not set"))?;
        Tokenizer::from_encoded_key(encoded)
    }
}
