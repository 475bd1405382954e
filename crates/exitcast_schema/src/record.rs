//! Record model shared by every stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::label::Label;

/// One cell of a raw intake record as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view of the cell. Booleans count as 0/1; text and dates have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Null | CellValue::Text(_) | CellValue::Date(_) => None,
        }
    }

    /// True for values that compare equal to numeric zero (`false` included).
    pub fn is_zero(&self) -> bool {
        match self {
            CellValue::Bool(b) => !*b,
            CellValue::Int(v) => *v == 0,
            CellValue::Float(v) => *v == 0.0,
            CellValue::Null | CellValue::Text(_) | CellValue::Date(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(v: NaiveDate) -> Self {
        CellValue::Date(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => CellValue::Null,
        }
    }
}

/// A batch of raw intake records, one row per enrollment episode.
///
/// Column-addressable; every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl RawBatch {
    /// Build a batch, rejecting rows whose width differs from the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(SchemaError::mismatch(format!(
                "row {} has {} cells but the batch has {} columns",
                idx,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<CellValue>>) {
        (self.columns, self.rows)
    }
}

/// Identity of an enrollment episode in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub personal_id: String,
    pub enroll_date: NaiveDate,
}

impl EpisodeKey {
    pub fn new(personal_id: impl Into<String>, enroll_date: NaiveDate) -> Self {
        Self {
            personal_id: personal_id.into(),
            enroll_date,
        }
    }

    /// Resolve a key from raw cells. `None` when either part is null or unparseable.
    ///
    /// Text ids are kept verbatim: the apply statement matches them exactly.
    pub fn from_cells(personal_id: &CellValue, enroll_date: &CellValue) -> Option<Self> {
        let personal_id = match personal_id {
            CellValue::Text(s) if !s.trim().is_empty() => s.clone(),
            CellValue::Int(v) => v.to_string(),
            CellValue::Float(v) if v.fract() == 0.0 && v.is_finite() => (*v as i64).to_string(),
            _ => return None,
        };
        let enroll_date = match enroll_date {
            CellValue::Date(d) => *d,
            CellValue::Text(s) => parse_date(s)?,
            _ => return None,
        };
        Some(Self {
            personal_id,
            enroll_date,
        })
    }
}

/// Parse an ISO date, tolerating a trailing time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Model-ready feature rows keyed by episode.
///
/// Keys travel alongside the matrix and are never fed to a classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
    feature_columns: Vec<String>,
    keys: Vec<EpisodeKey>,
    rows: Vec<Vec<f64>>,
}

impl FeatureBatch {
    pub fn new(
        feature_columns: Vec<String>,
        keys: Vec<EpisodeKey>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if keys.len() != rows.len() {
            return Err(SchemaError::mismatch(format!(
                "{} keys for {} feature rows",
                keys.len(),
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != feature_columns.len()) {
            return Err(SchemaError::mismatch(format!(
                "feature row has {} values but the schema has {} columns",
                row.len(),
                feature_columns.len()
            )));
        }
        Ok(Self {
            feature_columns,
            keys,
            rows,
        })
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn keys(&self) -> &[EpisodeKey] {
        &self.keys
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.feature_columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of a named feature for row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.feature_columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx)).copied()
    }

    /// Row index of an episode.
    pub fn row_of(&self, key: &EpisodeKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }
}

/// A label destined for exactly one open episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub key: EpisodeKey,
    pub label: Label,
}

impl PredictionRecord {
    pub fn new(key: EpisodeKey, label: Label) -> Self {
        Self { key, label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_raw_batch_rejects_ragged_rows() {
        let result = RawBatch::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![CellValue::Int(1)]],
        );
        assert!(matches!(result, Err(SchemaError::Mismatch(_))));
    }

    #[test]
    fn test_zero_semantics() {
        assert!(CellValue::Int(0).is_zero());
        assert!(CellValue::Float(0.0).is_zero());
        assert!(CellValue::Bool(false).is_zero());
        assert!(!CellValue::Null.is_zero());
        assert!(!CellValue::Text("0".into()).is_zero());
    }

    #[test]
    fn test_key_from_cells() {
        let key = EpisodeKey::from_cells(&"A1".into(), &"2023-01-01".into()).unwrap();
        assert_eq!(key, EpisodeKey::new("A1", date("2023-01-01")));

        let key = EpisodeKey::from_cells(&CellValue::Int(42), &"2023-01-01 00:00:00".into())
            .unwrap();
        assert_eq!(key.personal_id, "42");

        assert!(EpisodeKey::from_cells(&CellValue::Null, &"2023-01-01".into()).is_none());
        assert!(EpisodeKey::from_cells(&"A1".into(), &"not a date".into()).is_none());
        assert!(EpisodeKey::from_cells(&"   ".into(), &"2023-01-01".into()).is_none());
    }

    #[test]
    fn test_key_keeps_padded_text_id() {
        let key = EpisodeKey::from_cells(&" A1 ".into(), &"2023-01-01".into()).unwrap();
        assert_eq!(key.personal_id, " A1 ");
    }

    #[test]
    fn test_feature_batch_width_check() {
        let result = FeatureBatch::new(
            vec!["x".to_string()],
            vec![EpisodeKey::new("A1", date("2023-01-01"))],
            vec![vec![1.0, 2.0]],
        );
        assert!(result.is_err());
    }
}
