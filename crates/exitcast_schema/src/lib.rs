//! Exitcast Schema
//!
//! The shapes every pipeline stage agrees on:
//! - the record model (raw intake rows, feature rows, predictions)
//! - the closed label set
//! - the versioned feature schema specification that drives the transformer
//! - the CSV artifact header contracts between stages
//!
//! A stage that receives data violating any of these fails the batch.
//! Nothing is coerced into shape.

pub mod contract;
pub mod error;
pub mod label;
pub mod record;
pub mod spec;

pub use contract::{
    validate_prediction_header, FeatureHeader, KEY_COLUMNS, PREDICTION_COLUMN,
    PREDICTION_HEADER,
};
pub use error::{Result, SchemaError};
pub use label::Label;
pub use record::{CellValue, EpisodeKey, FeatureBatch, PredictionRecord, RawBatch};
pub use spec::{Expansion, FeatureSchemaSpec, Indicator};
