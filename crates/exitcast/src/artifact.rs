//! Artifact channel between stages.
//!
//! Two interchange formats travel through it, both CSV with a header row:
//! the feature artifact (`personal_id,enroll_date,<features...>`) and the
//! prediction artifact (`personal_id,enroll_date,predicted_exit_destination`).
//! Objects are published whole or not at all.

use exitcast_schema::record::parse_date;
use exitcast_schema::{
    validate_prediction_header, EpisodeKey, FeatureBatch, FeatureHeader, Label, PredictionRecord,
    PREDICTION_HEADER,
};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Object storage for interchange artifacts.
pub trait ArtifactStore {
    fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Publish an object atomically, replacing any previous version.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Artifact store rooted at a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.starts_with('.');
        if !plain {
            return Err(PipelineError::config(format!(
                "artifact name '{}' must be a plain file name",
                name
            )));
        }
        Ok(self.root.join(name))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(object = name, bytes = bytes.len(), "Read artifact");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PipelineError::ArtifactMissing(name.to_string()))
            }
            Err(e) => Err(PipelineError::Io(e)),
        }
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(name)?;
        if !self.root.is_dir() {
            return Err(PipelineError::Connectivity(format!(
                "artifact directory {} is not reachable",
                self.root.display()
            )));
        }
        let mut staged = tempfile::NamedTempFile::new_in(&self.root)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| PipelineError::Io(e.error))?;
        debug!(object = name, bytes = bytes.len(), "Published artifact");
        Ok(())
    }
}

/// Render a feature batch as CSV.
pub fn write_features(batch: &FeatureBatch) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(FeatureHeader::render(batch.feature_columns()))?;
    for (key, row) in batch.keys().iter().zip(batch.rows()) {
        let mut record = Vec::with_capacity(row.len() + 2);
        record.push(key.personal_id.clone());
        record.push(key.enroll_date.format("%Y-%m-%d").to_string());
        record.extend(row.iter().map(|v| format_number(*v)));
        writer.write_record(&record)?;
    }
    finish(writer)
}

/// Parse a feature artifact, rejecting any header that breaks the contract.
pub fn read_features(bytes: &[u8]) -> Result<FeatureBatch> {
    let mut reader = csv::Reader::from_reader(bytes);
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let layout = FeatureHeader::parse(&header)?;

    let mut keys = Vec::new();
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        keys.push(parse_key(record.get(0), record.get(1), line)?);
        let row = layout
            .features
            .iter()
            .zip(&layout.positions)
            .map(|(name, pos)| {
                let raw = record.get(*pos).unwrap_or("").trim();
                raw.parse::<f64>().map_err(|_| {
                    PipelineError::invalid_value(format!(
                        "feature artifact row {} column '{}' holds '{}'",
                        line, name, raw
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(FeatureBatch::new(layout.features, keys, rows)?)
}

/// Render predictions as CSV.
pub fn write_predictions(predictions: &[PredictionRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(PREDICTION_HEADER)?;
    for p in predictions {
        let enroll_date = p.key.enroll_date.format("%Y-%m-%d").to_string();
        writer.write_record([
            p.key.personal_id.as_str(),
            enroll_date.as_str(),
            p.label.as_str(),
        ])?;
    }
    finish(writer)
}

/// Parse a prediction artifact.
pub fn read_predictions(bytes: &[u8]) -> Result<Vec<PredictionRecord>> {
    let mut reader = csv::Reader::from_reader(bytes);
    validate_prediction_header(&reader.headers()?.iter().collect::<Vec<_>>())?;

    let mut predictions = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let key = parse_key(record.get(0), record.get(1), line)?;
        let label: Label = record.get(2).unwrap_or("").parse()?;
        predictions.push(PredictionRecord::new(key, label));
    }
    Ok(predictions)
}

fn parse_key(personal_id: Option<&str>, enroll_date: Option<&str>, line: usize) -> Result<EpisodeKey> {
    let personal_id = personal_id.unwrap_or("");
    if personal_id.trim().is_empty() {
        return Err(PipelineError::invalid_value(format!(
            "artifact row {} has no personal_id",
            line
        )));
    }
    let enroll_date = enroll_date.and_then(parse_date).ok_or_else(|| {
        PipelineError::invalid_value(format!("artifact row {} has no valid enroll_date", line))
    })?;
    Ok(EpisodeKey::new(personal_id, enroll_date))
}

/// Integral values are written without a fractional part.
fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}
