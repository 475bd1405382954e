//! Artifact header contracts.
//!
//! Column names and order are the contract between stages. A consumer that
//! sees any other header rejects the artifact.

use crate::error::{Result, SchemaError};

/// Episode identity columns, always the first two columns of an artifact.
pub const KEY_COLUMNS: [&str; 2] = ["personal_id", "enroll_date"];

/// The store column owned by the synchronizer.
pub const PREDICTION_COLUMN: &str = "predicted_exit_destination";

/// Exact header of the prediction artifact.
pub const PREDICTION_HEADER: [&str; 3] = ["personal_id", "enroll_date", PREDICTION_COLUMN];

/// Check a prediction artifact header.
pub fn validate_prediction_header<S: AsRef<str>>(header: &[S]) -> Result<()> {
    let actual: Vec<&str> = header.iter().map(|h| h.as_ref().trim()).collect();
    if actual != PREDICTION_HEADER {
        return Err(SchemaError::mismatch(format!(
            "prediction artifact header must be {:?}, got {:?}",
            PREDICTION_HEADER, actual
        )));
    }
    Ok(())
}

/// Parsed header of a feature artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureHeader {
    /// Feature column names, in artifact order, keys and prediction column excluded
    pub features: Vec<String>,
    /// Artifact column positions of `features`
    pub positions: Vec<usize>,
}

impl FeatureHeader {
    /// Split a feature artifact header into keys and features.
    ///
    /// A stale prediction column from older artifacts is accepted and skipped.
    pub fn parse<S: AsRef<str>>(header: &[S]) -> Result<Self> {
        let names: Vec<&str> = header.iter().map(|h| h.as_ref().trim()).collect();
        if names.len() < KEY_COLUMNS.len() || names[..KEY_COLUMNS.len()] != KEY_COLUMNS {
            return Err(SchemaError::mismatch(format!(
                "feature artifact must start with {:?}, got {:?}",
                KEY_COLUMNS,
                names.iter().take(KEY_COLUMNS.len()).collect::<Vec<_>>()
            )));
        }

        let mut features = Vec::new();
        let mut positions = Vec::new();
        for (pos, name) in names.iter().enumerate().skip(KEY_COLUMNS.len()) {
            if *name == PREDICTION_COLUMN {
                continue;
            }
            if name.is_empty() {
                return Err(SchemaError::mismatch(format!(
                    "feature artifact column {} has no name",
                    pos
                )));
            }
            if KEY_COLUMNS.contains(name) || features.iter().any(|f: &String| f == name) {
                return Err(SchemaError::mismatch(format!(
                    "feature artifact repeats column '{}'",
                    name
                )));
            }
            features.push((*name).to_string());
            positions.push(pos);
        }
        Ok(Self {
            features,
            positions,
        })
    }

    /// Header to write for a feature batch.
    pub fn render(features: &[String]) -> Vec<String> {
        KEY_COLUMNS
            .iter()
            .map(|k| k.to_string())
            .chain(features.iter().cloned())
            .collect()
    }
}
