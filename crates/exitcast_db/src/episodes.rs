//! Open-episode extract.

use chrono::{NaiveDate, NaiveDateTime};
use exitcast_schema::{CellValue, RawBatch};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::info;

use crate::error::{DbError, Result};
use crate::{ClientStore, DbRow};

impl ClientStore {
    /// Fetch every open episode (no exit date, no exit destination) with all columns.
    pub async fn fetch_open_episodes(&self) -> Result<RawBatch> {
        let sql = format!(
            "SELECT * FROM {} WHERE exit_destination IS NULL AND exit_date IS NULL",
            self.table
        );
        // `SELECT *` must not be cached: the prediction column is added on
        // the same pool and a cached statement would keep the old shape.
        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut cells = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoded = (0..columns.len())
                .map(|idx| decode_cell(row, idx))
                .collect::<Result<Vec<_>>>()?;
            cells.push(decoded);
        }

        info!(
            table = %self.table,
            rows = cells.len(),
            columns = columns.len(),
            "Extracted open episodes"
        );

        Ok(RawBatch::new(columns, cells)?)
    }
}

/// Decode one cell into the raw record model.
///
/// Text is tried first so SQLite's dynamic typing keeps strings as strings.
fn decode_cell(row: &DbRow, idx: usize) -> Result<CellValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(CellValue::Text(v));
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(CellValue::Int(v));
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Ok(CellValue::Int(i64::from(v)));
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Ok(CellValue::Int(i64::from(v)));
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(CellValue::Float(v));
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return Ok(CellValue::Float(f64::from(v)));
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Ok(CellValue::Bool(v));
    }
    if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
        return Ok(CellValue::Date(v));
    }
    if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
        return Ok(CellValue::Date(v.date()));
    }

    Err(DbError::UnsupportedColumn {
        column: row.columns()[idx].name().to_string(),
        type_name,
    })
}
