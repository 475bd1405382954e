//! Raw intake records to model-ready feature rows.
//!
//! Rules run in a fixed order because later rules assume the columns removed
//! by earlier ones are gone:
//!
//! 1. case-fold column names, then fail fast on missing required columns
//! 2. drop the optional, sensitive, reviewed, questionable, deferred and
//!    constant lists
//! 3. drop sparse columns, then all-zero columns
//! 4. drop rows with any remaining null (or an unusable key)
//! 5. drop categorical columns that have no encoding yet
//! 6. expand categoricals into indicators
//! 7. cast the restricted-record flag and replace `Yes`/`No` everywhere
//!
//! Whatever survives must be numeric. The transformer is pure: no I/O.

use exitcast_schema::{CellValue, EpisodeKey, FeatureBatch, FeatureSchemaSpec, RawBatch};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Counts and column lists describing one transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows dropped for a null in a surviving column or an unusable key
    pub rows_dropped: usize,
    pub sparse_columns: Vec<String>,
    pub zero_columns: Vec<String>,
    /// Expansion sources and flag casts not applied because a data filter
    /// removed their column
    pub skipped_rules: Vec<String>,
}

/// Applies a [`FeatureSchemaSpec`] to raw intake batches.
#[derive(Debug, Clone)]
pub struct FeatureTransformer {
    spec: FeatureSchemaSpec,
}

impl FeatureTransformer {
    pub fn new(spec: FeatureSchemaSpec) -> Self {
        Self { spec }
    }

    /// Transformer over the compiled-in schema.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(FeatureSchemaSpec::builtin()?))
    }

    pub fn spec(&self) -> &FeatureSchemaSpec {
        &self.spec
    }

    /// Transform a whole batch. Either every rule applies or nothing is returned.
    pub fn transform(&self, batch: RawBatch) -> Result<(FeatureBatch, TransformReport)> {
        let mut report = TransformReport {
            rows_in: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            info!("Intake batch is empty; nothing to transform");
            return Ok((FeatureBatch::default(), report));
        }

        let mut frame = Frame::from_batch(batch)?;
        self.check_required(&frame)?;

        frame.drop_columns(&self.spec.optional_drop);
        for (list, columns) in self.spec.removal_lists() {
            let removed = frame.drop_columns(columns);
            debug!(list, removed, "Applied removal list");
        }

        report.sparse_columns = self.drop_sparse(&mut frame);
        report.zero_columns = self.drop_all_zero(&mut frame);
        let keys = self.drop_incomplete_rows(&mut frame, &mut report)?;
        frame.drop_columns(&self.spec.unencoded);

        let indicators = self.expand_categoricals(&mut frame, &mut report);
        self.normalize_flag(&mut frame, &mut report)?;
        self.replace_yes_no(&mut frame);

        let mut feature_columns = Vec::with_capacity(frame.columns.len() + indicators.len());
        let mut numeric = Vec::with_capacity(frame.columns.len());
        for column in &frame.columns {
            numeric.push(numeric_values(column)?);
            feature_columns.push(column.name.clone());
        }
        feature_columns.extend(indicators.iter().map(|(name, _)| name.clone()));

        let rows: Vec<Vec<f64>> = (0..keys.len())
            .map(|r| {
                numeric
                    .iter()
                    .map(|values| values[r])
                    .chain(indicators.iter().map(|(_, values)| values[r]))
                    .collect()
            })
            .collect();

        report.rows_out = keys.len();
        let features = FeatureBatch::new(feature_columns, keys, rows)?;

        info!(
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            rows_dropped = report.rows_dropped,
            features = features.width(),
            "Transformed intake batch"
        );
        Ok((features, report))
    }

    fn is_key(&self, name: &str) -> bool {
        self.spec.key_columns.iter().any(|k| k == name)
    }

    fn check_required(&self, frame: &Frame) -> Result<()> {
        let present: HashSet<&str> = frame.columns.iter().map(|c| c.name.as_str()).collect();
        let missing: Vec<&str> = self
            .spec
            .required_columns()
            .into_iter()
            .filter(|c| !present.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::schema_mismatch(format!(
                "intake batch is missing required columns: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Keep a column only if enough of its values are present.
    fn drop_sparse(&self, frame: &mut Frame) -> Vec<String> {
        let threshold = (frame.rows as f64 * self.spec.min_non_null_ratio).floor() as usize;
        let sparse: Vec<String> = frame
            .columns
            .iter()
            .filter(|c| !self.is_key(&c.name))
            .filter(|c| {
                let non_null = c.cells.iter().filter(|v| !v.is_null()).count();
                non_null == 0 || non_null < threshold
            })
            .map(|c| c.name.clone())
            .collect();
        frame.drop_columns(&sparse);
        if !sparse.is_empty() {
            info!(columns = ?sparse, threshold, "Dropped sparse columns");
        }
        sparse
    }

    fn drop_all_zero(&self, frame: &mut Frame) -> Vec<String> {
        let zero: Vec<String> = frame
            .columns
            .iter()
            .filter(|c| !self.is_key(&c.name))
            .filter(|c| c.cells.iter().all(CellValue::is_zero))
            .map(|c| c.name.clone())
            .collect();
        frame.drop_columns(&zero);
        if !zero.is_empty() {
            info!(columns = ?zero, "Dropped all-zero columns");
        }
        zero
    }

    /// Drop rows holding any null, resolve episode keys, and take the key
    /// columns out of the frame.
    fn drop_incomplete_rows(
        &self,
        frame: &mut Frame,
        report: &mut TransformReport,
    ) -> Result<Vec<EpisodeKey>> {
        let pid = frame.remove(&self.spec.key_columns[0]).ok_or_else(|| {
            PipelineError::schema_mismatch(format!("missing key column {}", self.spec.key_columns[0]))
        })?;
        let enroll = frame.remove(&self.spec.key_columns[1]).ok_or_else(|| {
            PipelineError::schema_mismatch(format!("missing key column {}", self.spec.key_columns[1]))
        })?;

        let mut keep = Vec::with_capacity(frame.rows);
        let mut keys = Vec::with_capacity(frame.rows);
        for r in 0..frame.rows {
            let complete = frame.columns.iter().all(|c| !c.cells[r].is_null());
            let key = EpisodeKey::from_cells(&pid.cells[r], &enroll.cells[r]);
            match key {
                Some(key) if complete => {
                    keys.push(key);
                    keep.push(true);
                }
                _ => keep.push(false),
            }
        }
        frame.retain_rows(&keep);

        report.rows_dropped = report.rows_in - keys.len();
        if report.rows_dropped > 0 {
            info!(
                dropped = report.rows_dropped,
                kept = keys.len(),
                "Dropped incomplete intake rows"
            );
        }
        Ok(keys)
    }

    fn expand_categoricals(
        &self,
        frame: &mut Frame,
        report: &mut TransformReport,
    ) -> Vec<(String, Vec<f64>)> {
        let mut indicators = Vec::new();
        for expansion in &self.spec.expansions {
            let Some(source) = frame.remove(&expansion.source) else {
                warn!(
                    source = %expansion.source,
                    "Expansion source removed by a data filter; its indicators are not generated"
                );
                report.skipped_rules.push(expansion.source.clone());
                continue;
            };
            for indicator in &expansion.indicators {
                let values = source
                    .cells
                    .iter()
                    .map(|cell| match cell.as_text() {
                        Some(text) if indicator.values.iter().any(|v| v == text.trim()) => 1.0,
                        _ => 0.0,
                    })
                    .collect();
                indicators.push((indicator.name.clone(), values));
            }
        }
        indicators
    }

    fn normalize_flag(&self, frame: &mut Frame, report: &mut TransformReport) -> Result<()> {
        let name = &self.spec.binary_flag;
        let Some(column) = frame.get_mut(name) else {
            warn!(column = %name, "Flag column removed by a data filter; cast skipped");
            report.skipped_rules.push(name.clone());
            return Ok(());
        };
        for (r, cell) in column.cells.iter_mut().enumerate() {
            let flag = cast_flag(cell).ok_or_else(|| {
                PipelineError::invalid_value(format!(
                    "column '{}' row {}: cannot read {:?} as a flag",
                    name, r, cell
                ))
            })?;
            *cell = CellValue::Int(flag);
        }
        Ok(())
    }

    fn replace_yes_no(&self, frame: &mut Frame) {
        for column in &mut frame.columns {
            for cell in &mut column.cells {
                if let CellValue::Text(text) = cell {
                    if let Some(value) = self.spec.yes_no.get(text.trim()) {
                        *cell = CellValue::Int(*value);
                    }
                }
            }
        }
    }
}

fn cast_flag(cell: &CellValue) -> Option<i64> {
    match cell {
        CellValue::Bool(b) => Some(i64::from(*b)),
        CellValue::Int(v @ (0 | 1)) => Some(*v),
        CellValue::Float(v) if *v == 0.0 || *v == 1.0 => Some(*v as i64),
        CellValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Some(1),
            "false" | "f" | "no" | "0" => Some(0),
            _ => None,
        },
        _ => None,
    }
}

fn numeric_values(column: &Column) -> Result<Vec<f64>> {
    column
        .cells
        .iter()
        .enumerate()
        .map(|(r, cell)| match cell.as_f64() {
            Some(v) if v.is_finite() => Ok(v),
            Some(_) => Err(PipelineError::invalid_value(format!(
                "column '{}' row {} is not a finite number",
                column.name, r
            ))),
            None => Err(PipelineError::schema_mismatch(format!(
                "column '{}' is not numeric after transformation (row {} holds {})",
                column.name,
                r,
                kind(cell)
            ))),
        })
        .collect()
}

fn kind(cell: &CellValue) -> &'static str {
    match cell {
        CellValue::Null => "null",
        CellValue::Bool(_) => "a boolean",
        CellValue::Int(_) | CellValue::Float(_) => "a number",
        CellValue::Text(_) => "text",
        CellValue::Date(_) => "a date",
    }
}

struct Column {
    name: String,
    cells: Vec<CellValue>,
}

/// Column-major working copy of a batch.
struct Frame {
    columns: Vec<Column>,
    rows: usize,
}

impl Frame {
    fn from_batch(batch: RawBatch) -> Result<Self> {
        let (names, rows) = batch.into_parts();
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let folded = name.trim().to_lowercase();
            if !seen.insert(folded.clone()) {
                return Err(PipelineError::schema_mismatch(format!(
                    "column '{}' appears more than once after case folding",
                    folded
                )));
            }
            columns.push(Column {
                name: folded,
                cells: Vec::with_capacity(rows.len()),
            });
        }

        let row_count = rows.len();
        for row in rows {
            for (column, cell) in columns.iter_mut().zip(row) {
                column.cells.push(cell);
            }
        }
        Ok(Self {
            columns,
            rows: row_count,
        })
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    fn remove(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Drop the named columns that are present; returns how many were removed.
    fn drop_columns(&mut self, names: &[String]) -> usize {
        let before = self.columns.len();
        self.columns.retain(|c| !names.contains(&c.name));
        before - self.columns.len()
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.cells.retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.rows = keep.iter().filter(|k| **k).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exitcast_test_utils::IntakeBuilder;

    fn transform(batch: RawBatch) -> (FeatureBatch, TransformReport) {
        FeatureTransformer::builtin().unwrap().transform(batch).unwrap()
    }

    fn key(pid: &str, date: &str) -> EpisodeKey {
        EpisodeKey::new(pid, chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap())
    }

    #[test]
    fn test_female_white_client_indicators() {
        let batch = IntakeBuilder::new()
            .row(
                "A1",
                "2023-01-01",
                &[("gender", "Female".into()), ("race", "White".into())],
            )
            .row(
                "B2",
                "2023-02-01",
                &[
                    ("gender", "Male".into()),
                    ("race", "Black or African American".into()),
                ],
            )
            .build();
        let (features, report) = transform(batch);
        assert_eq!(report.rows_out, 2);

        let a1 = features.row_of(&key("A1", "2023-01-01")).unwrap();
        assert_eq!(features.value(a1, "is_female"), Some(1.0));
        assert_eq!(features.value(a1, "is_male"), Some(0.0));
        assert_eq!(features.value(a1, "is_white"), Some(1.0));
        assert_eq!(features.value(a1, "is_black"), Some(0.0));

        let b2 = features.row_of(&key("B2", "2023-02-01")).unwrap();
        assert_eq!(features.value(b2, "is_male"), Some(1.0));
        assert_eq!(features.value(b2, "is_black"), Some(1.0));
    }

    #[test]
    fn test_no_forbidden_column_survives() {
        let transformer = FeatureTransformer::builtin().unwrap();
        let (features, _) = transformer
            .transform(IntakeBuilder::new().rows(5).build())
            .unwrap();
        for forbidden in transformer.spec().forbidden_feature_columns() {
            assert!(
                !features.feature_columns().iter().any(|c| c == forbidden),
                "{} leaked into the feature schema",
                forbidden
            );
        }
        for key in ["personal_id", "enroll_date", "ssn", "exit_date"] {
            assert!(!features.feature_columns().iter().any(|c| c == key));
        }
    }

    #[test]
    fn test_column_order_is_survivors_then_indicators() {
        let transformer = FeatureTransformer::builtin().unwrap();
        let (features, report) = transformer
            .transform(IntakeBuilder::new().rows(3).build())
            .unwrap();
        let indicators: Vec<&str> = transformer.spec().indicator_names().collect();
        let columns: Vec<&str> = features.feature_columns().iter().map(String::as_str).collect();

        assert_eq!(&columns[..4], &["age", "household_size", "monthly_income", "has_income"]);
        assert_eq!(&columns[4..], indicators.as_slice());
        assert_eq!(report.zero_columns, vec!["client_record_restricted", "prior_returns"]);
        assert_eq!(report.skipped_rules, vec!["client_record_restricted"]);
    }

    #[test]
    fn test_indicators_are_mutually_exclusive() {
        let transformer = FeatureTransformer::builtin().unwrap();
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[("relationship_to_hoh", "Step Child".into())])
            .row("A2", "2023-01-01", &[("relationship_to_hoh", "Spouse".into())])
            .row("A3", "2023-01-01", &[("race", "Client refused".into())])
            .row("A4", "2023-01-01", &[("gender", "Trans Male (FTM or Female to Male)".into())])
            .build();
        let (features, _) = transformer.transform(batch).unwrap();

        for expansion in &transformer.spec().expansions {
            for row in 0..features.len() {
                let hot: f64 = expansion
                    .indicators
                    .iter()
                    .map(|i| features.value(row, &i.name).unwrap())
                    .sum();
                assert!(hot <= 1.0, "{} has {} hot indicators", expansion.source, hot);
            }
        }
        assert_eq!(features.value(0, "is_other_non_family"), Some(1.0));
        assert_eq!(features.value(2, "race_refused"), Some(1.0));
        assert_eq!(features.value(3, "is_trans"), Some(1.0));
    }

    #[test]
    fn test_unmatched_category_yields_all_zero_indicators() {
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[("gender", "Client doesn't know".into())])
            .build();
        let (features, _) = transform(batch);
        for name in ["is_female", "is_male", "is_trans"] {
            assert_eq!(features.value(0, name), Some(0.0));
        }
    }

    #[test]
    fn test_rows_with_nulls_are_dropped_and_counted() {
        let mut builder = IntakeBuilder::new().rows(9);
        builder = builder.row("GAP", "2023-03-01", &[("age", CellValue::Null)]);
        let (features, report) = transform(builder.build());

        assert_eq!(report.rows_in, 10);
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(features.len(), 9);
        assert!(features.row_of(&key("GAP", "2023-03-01")).is_none());
        assert!(features.rows().iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_sparse_column_is_dropped_not_its_rows() {
        let builder = IntakeBuilder::new()
            .rows(8)
            .row("N1", "2023-01-01", &[("monthly_income", CellValue::Null)])
            .row("N2", "2023-01-01", &[("monthly_income", CellValue::Null)]);
        let (features, report) = transform(builder.build());

        assert_eq!(report.sparse_columns, vec!["monthly_income"]);
        assert_eq!(report.rows_dropped, 0);
        assert_eq!(features.len(), 10);
        assert!(!features.feature_columns().iter().any(|c| c == "monthly_income"));
    }

    #[test]
    fn test_sparse_expansion_source_is_skipped() {
        let builder = IntakeBuilder::new()
            .rows(8)
            .row("N1", "2023-01-01", &[("gender", CellValue::Null)])
            .row("N2", "2023-01-01", &[("gender", CellValue::Null)]);
        let (features, report) = transform(builder.build());

        assert!(report.skipped_rules.contains(&"gender".to_string()));
        assert!(!features.feature_columns().iter().any(|c| c == "is_female"));
        assert!(features.feature_columns().iter().any(|c| c == "is_white"));
    }

    #[test]
    fn test_null_key_row_is_dropped() {
        let builder = IntakeBuilder::new()
            .rows(9)
            .row("X", "2023-01-01", &[("personal_id", CellValue::Null)]);
        let (features, report) = transform(builder.build());
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(features.len(), 9);
    }

    #[test]
    fn test_flag_cast_and_yes_no_replacement() {
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[("client_record_restricted", "Yes".into())])
            .row("A2", "2023-01-01", &[("client_record_restricted", "f".into())])
            .row("A3", "2023-01-01", &[("client_record_restricted", CellValue::Bool(true))])
            .row("A4", "2023-01-01", &[("has_income", "No".into())])
            .build();
        let (features, report) = transform(batch);

        assert!(report.skipped_rules.is_empty());
        assert_eq!(features.value(0, "client_record_restricted"), Some(1.0));
        assert_eq!(features.value(1, "client_record_restricted"), Some(0.0));
        assert_eq!(features.value(2, "client_record_restricted"), Some(1.0));
        assert_eq!(features.value(0, "has_income"), Some(1.0));
        assert_eq!(features.value(3, "has_income"), Some(0.0));
    }

    #[test]
    fn test_uninterpretable_flag_fails_batch() {
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[("client_record_restricted", "maybe".into())])
            .build();
        let err = FeatureTransformer::builtin().unwrap().transform(batch).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidValue(_)));
    }

    #[test]
    fn test_missing_required_columns_fail_fast() {
        let batch = IntakeBuilder::new()
            .rows(3)
            .without_column("gender")
            .without_column("race")
            .build();
        let err = FeatureTransformer::builtin().unwrap().transform(batch).unwrap_err();
        match err {
            PipelineError::SchemaMismatch(msg) => {
                assert!(msg.contains("gender"));
                assert!(msg.contains("race"));
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_headers_are_case_folded() {
        let (features, _) = transform(IntakeBuilder::new().rows(2).uppercase_headers().build());
        assert_eq!(features.len(), 2);
        assert!(features.feature_columns().iter().any(|c| c == "is_female"));
    }

    #[test]
    fn test_free_text_column_is_a_schema_mismatch() {
        let batch = IntakeBuilder::new()
            .with_column("case_notes", "called back".into())
            .rows(2)
            .build();
        let err = FeatureTransformer::builtin().unwrap().transform(batch).unwrap_err();
        match err {
            PipelineError::SchemaMismatch(msg) => assert!(msg.contains("case_notes")),
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_yields_empty_features() {
        let (features, report) = transform(RawBatch::default());
        assert!(features.is_empty());
        assert_eq!(features.width(), 0);
        assert_eq!(report.rows_in, 0);
    }
}
