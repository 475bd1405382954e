//! Versioned feature schema specification.
//!
//! The drop lists and categorical expansion maps that turn a raw intake record
//! into a feature record live in a TOML document rather than in code. The
//! default document is compiled in; deployments may point at another file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{Result, SchemaError};

const DEFAULT_SPEC: &str = include_str!("../feature_schema.toml");

/// The complete rule set for the feature transformer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSchemaSpec {
    pub version: u32,
    /// Episode identity. Carried alongside the features, never encoded.
    pub key_columns: Vec<String>,
    /// Dropped when present; their absence is not an error.
    #[serde(default)]
    pub optional_drop: Vec<String>,
    pub sensitive: Vec<String>,
    pub reviewed: Vec<String>,
    pub questionable: Vec<String>,
    pub deferred: Vec<String>,
    pub constant: Vec<String>,
    /// Categorical columns without an agreed encoding, dropped after the row filter.
    #[serde(default)]
    pub unencoded: Vec<String>,
    pub min_non_null_ratio: f64,
    pub binary_flag: String,
    pub yes_no: BTreeMap<String, i64>,
    pub expansions: Vec<Expansion>,
}

/// One categorical source column and the indicators it becomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expansion {
    pub source: String,
    pub indicators: Vec<Indicator>,
}

/// A binary indicator column set to 1 when the source value is one of `values`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Indicator {
    pub name: String,
    pub values: Vec<String>,
}

impl FeatureSchemaSpec {
    /// The compiled-in schema.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(DEFAULT_SPEC)
    }

    /// Parse and validate a schema document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let spec: Self = toml::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a schema document from disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    /// Every column a raw batch must carry before transformation starts.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.key_columns
            .iter()
            .chain(self.removal_lists().into_iter().flat_map(|(_, cols)| cols.iter()))
            .chain(self.unencoded.iter())
            .map(String::as_str)
            .chain(self.expansions.iter().map(|e| e.source.as_str()))
            .chain(std::iter::once(self.binary_flag.as_str()))
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// The fixed removal lists, in application order.
    pub fn removal_lists(&self) -> [(&'static str, &[String]); 5] {
        [
            ("sensitive", &self.sensitive),
            ("reviewed", &self.reviewed),
            ("questionable", &self.questionable),
            ("deferred", &self.deferred),
            ("constant", &self.constant),
        ]
    }

    /// Names of every indicator column, in expansion order.
    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        self.expansions
            .iter()
            .flat_map(|e| e.indicators.iter().map(|i| i.name.as_str()))
    }

    /// Columns that can never appear in a feature artifact.
    pub fn forbidden_feature_columns(&self) -> impl Iterator<Item = &str> {
        self.removal_lists()
            .into_iter()
            .flat_map(|(_, cols)| cols.iter().map(String::as_str))
            .chain(self.unencoded.iter().map(String::as_str))
            .chain(self.expansions.iter().map(|e| e.source.as_str()))
    }

    fn validate(&self) -> Result<()> {
        if self.key_columns.len() != 2 {
            return Err(SchemaError::invalid(
                "key_columns must name exactly personal id and enroll date",
            ));
        }
        if !(self.min_non_null_ratio > 0.0 && self.min_non_null_ratio <= 1.0) {
            return Err(SchemaError::invalid(format!(
                "min_non_null_ratio must be in (0, 1], got {}",
                self.min_non_null_ratio
            )));
        }

        let mut dropped = HashSet::new();
        for (list, cols) in self
            .removal_lists()
            .into_iter()
            .chain(std::iter::once(("unencoded", self.unencoded.as_slice())))
            .chain(std::iter::once(("optional_drop", self.optional_drop.as_slice())))
        {
            for col in cols {
                if col != &col.to_lowercase() {
                    return Err(SchemaError::invalid(format!(
                        "column '{}' in {} must be lowercase",
                        col, list
                    )));
                }
                if self.key_columns.contains(col) {
                    return Err(SchemaError::invalid(format!(
                        "key column '{}' cannot appear in {}",
                        col, list
                    )));
                }
                if !dropped.insert(col.as_str()) {
                    return Err(SchemaError::invalid(format!(
                        "column '{}' listed more than once (seen again in {})",
                        col, list
                    )));
                }
            }
        }

        let mut indicators = HashSet::new();
        for expansion in &self.expansions {
            if dropped.contains(expansion.source.as_str()) {
                return Err(SchemaError::invalid(format!(
                    "expansion source '{}' is also dropped",
                    expansion.source
                )));
            }
            if expansion.indicators.is_empty() {
                return Err(SchemaError::invalid(format!(
                    "expansion '{}' has no indicators",
                    expansion.source
                )));
            }
            let mut values = HashSet::new();
            for indicator in &expansion.indicators {
                if self.key_columns.contains(&indicator.name)
                    || !indicators.insert(indicator.name.as_str())
                {
                    return Err(SchemaError::invalid(format!(
                        "indicator name '{}' collides with another column",
                        indicator.name
                    )));
                }
                // Indicators of one source must be mutually exclusive.
                for value in &indicator.values {
                    if !values.insert(value.as_str()) {
                        return Err(SchemaError::invalid(format!(
                            "value '{}' of '{}' maps to more than one indicator",
                            value, expansion.source
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
