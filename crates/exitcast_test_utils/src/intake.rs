//! Raw intake record builders.
//!
//! A batch built here carries every column the built-in feature schema
//! requires, plus a handful of numeric attributes that survive the drop lists.
//! Cells default to plausible values; tests override only what they assert on.

use chrono::NaiveDate;
use exitcast_schema::{CellValue, FeatureSchemaSpec, RawBatch};

/// Numeric attributes outside every drop list, with their defaults.
///
/// `prior_returns` defaults to zero on every row, so the all-zero filter
/// removes it unless a test sets a value.
pub const SURVIVING_COLUMNS: [&str; 5] = [
    "age",
    "household_size",
    "monthly_income",
    "has_income",
    "prior_returns",
];

/// Builder for a [`RawBatch`] of intake records.
#[derive(Debug, Clone)]
pub struct IntakeBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    uppercase_headers: bool,
}

impl Default for IntakeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeBuilder {
    /// Columns of the built-in schema plus [`SURVIVING_COLUMNS`].
    pub fn new() -> Self {
        let spec = FeatureSchemaSpec::builtin().expect("built-in feature schema is valid");
        let mut columns: Vec<String> = spec
            .required_columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        columns.extend(SURVIVING_COLUMNS.iter().map(|c| c.to_string()));
        Self {
            columns,
            rows: Vec::new(),
            uppercase_headers: false,
        }
    }

    /// Add an open episode. `overrides` replace the default cells by column name.
    pub fn row(mut self, personal_id: &str, enroll_date: &str, overrides: &[(&str, CellValue)]) -> Self {
        let enroll = NaiveDate::parse_from_str(enroll_date, "%Y-%m-%d")
            .expect("fixture enroll dates are YYYY-MM-DD");
        let mut cells: Vec<CellValue> = self
            .columns
            .iter()
            .map(|c| default_cell(c, personal_id, enroll))
            .collect();
        for (column, value) in overrides {
            let idx = self
                .columns
                .iter()
                .position(|c| c == column)
                .unwrap_or_else(|| panic!("fixture has no column '{}'", column));
            cells[idx] = value.clone();
        }
        self.rows.push(cells);
        self
    }

    /// Add `n` default episodes with ids `P0..Pn`.
    pub fn rows(mut self, n: usize) -> Self {
        for i in 0..n {
            self = self.row(&format!("P{}", i), "2023-01-01", &[]);
        }
        self
    }

    /// Add a column (with `default` on existing and future rows).
    pub fn with_column(mut self, name: &str, default: CellValue) -> Self {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.clone());
        }
        self
    }

    /// Remove a column from the batch entirely.
    pub fn without_column(mut self, name: &str) -> Self {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
        self
    }

    /// Emit headers in upper case, as some extracts do.
    pub fn uppercase_headers(mut self) -> Self {
        self.uppercase_headers = true;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn build(self) -> RawBatch {
        let columns = if self.uppercase_headers {
            self.columns.iter().map(|c| c.to_uppercase()).collect()
        } else {
            self.columns
        };
        RawBatch::new(columns, self.rows).expect("fixture rows match the header")
    }
}

fn default_cell(column: &str, personal_id: &str, enroll: NaiveDate) -> CellValue {
    match column {
        "personal_id" => CellValue::Text(personal_id.to_string()),
        "enroll_date" => CellValue::Date(enroll),
        "ssn" => "123-45-6789".into(),
        "dob" => CellValue::Date(NaiveDate::from_ymd_opt(1990, 4, 2).unwrap_or(enroll)),
        "relationship_to_hoh" => "Self".into(),
        "ssn_quality" => "Full SSN".into(),
        "dob_quality" => "Full DOB Reported".into(),
        "race" => "White".into(),
        "ethnicity" => "Non-Hispanic/Non-Latino".into(),
        "gender" => "Female".into(),
        "disabling_cond_at_entry" => "No".into(),
        "covered_by_health_insurance" => "Yes".into(),
        "household_type" => "Household without Children".into(),
        "client_record_restricted" => CellValue::Bool(false),
        "project_name" => "Night Shelter".into(),
        "util_track_method" => "Entry/Exit".into(),
        "age" => CellValue::Int(34),
        "household_size" => CellValue::Int(1),
        "monthly_income" => CellValue::Float(450.0),
        "has_income" => "Yes".into(),
        "prior_returns" => CellValue::Int(0),
        _ => "n/a".into(),
    }
}
