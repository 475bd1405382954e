//! Seeded client stores.
//!
//! Builds an episode table whose columns mirror a [`RawBatch`] and loads the
//! batch into it, so extract/apply/retire tests run against real SQL.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use exitcast_db::{ClientStore, StoreConfig};
use exitcast_schema::{CellValue, RawBatch};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Table name used by every seeded store.
pub const TEST_TABLE: &str = "guests";

/// Open a single-connection in-memory store.
pub async fn memory_store() -> Result<ClientStore> {
    let config = StoreConfig::new("sqlite::memory:", TEST_TABLE)
        .with_max_connections(1)
        .with_acquire_timeout(Duration::from_secs(5));
    ClientStore::connect(config)
        .await
        .context("Failed to open in-memory store")
}

/// Open an in-memory store whose table holds `batch`, plus null
/// `exit_date`/`exit_destination` columns when the batch lacks them.
pub async fn seeded_store(batch: &RawBatch) -> Result<ClientStore> {
    let store = memory_store().await?;
    seed(&store, batch).await?;
    Ok(store)
}

/// Open (creating if needed) a single-connection store backed by a file.
///
/// Unlike the in-memory store, the data outlives the pool, so a test can
/// close one session and inspect the result through another.
pub async fn file_store(path: &Path) -> Result<ClientStore> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let config = StoreConfig::new(url, TEST_TABLE)
        .with_max_connections(1)
        .with_acquire_timeout(Duration::from_secs(5));
    ClientStore::connect(config)
        .await
        .with_context(|| format!("Failed to open store file {}", path.display()))
}

/// [`seeded_store`] on a file-backed store.
pub async fn seeded_file_store(path: &Path, batch: &RawBatch) -> Result<ClientStore> {
    let store = file_store(path).await?;
    seed(&store, batch).await?;
    Ok(store)
}

async fn seed(store: &ClientStore, batch: &RawBatch) -> Result<()> {
    let mut columns: Vec<(String, &'static str)> = batch
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.clone(), sql_type(batch, idx)))
        .collect();
    for lifecycle in ["exit_date", "exit_destination"] {
        if batch.column_index(lifecycle).is_none() {
            columns.push((lifecycle.to_string(), "TEXT"));
        }
    }

    let ddl = format!(
        "CREATE TABLE {} ({})",
        TEST_TABLE,
        columns
            .iter()
            .map(|(name, ty)| format!("\"{}\" {}", name, ty))
            .collect::<Vec<_>>()
            .join(", ")
    );
    sqlx::query(&ddl)
        .execute(store.pool())
        .await
        .context("Failed to create episode table")?;

    let names = batch
        .columns()
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=batch.columns().len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TEST_TABLE, names, placeholders
    );

    for row in batch.rows() {
        let mut query = sqlx::query(&insert);
        for cell in row {
            query = match cell {
                CellValue::Null => query.bind(Option::<String>::None),
                CellValue::Bool(v) => query.bind(*v),
                CellValue::Int(v) => query.bind(*v),
                CellValue::Float(v) => query.bind(*v),
                CellValue::Text(v) => query.bind(v.clone()),
                CellValue::Date(v) => query.bind(*v),
            };
        }
        query
            .execute(store.pool())
            .await
            .context("Failed to insert fixture row")?;
    }

    debug!(rows = batch.len(), columns = columns.len(), "Seeded test store");
    Ok(())
}

/// Record an exit for an episode.
pub async fn close_episode(
    store: &ClientStore,
    personal_id: &str,
    enroll_date: NaiveDate,
    exit_date: NaiveDate,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET exit_date = $1, exit_destination = 'Permanent' WHERE personal_id = $2 AND enroll_date = $3",
        store.table()
    );
    sqlx::query(&sql)
        .bind(exit_date)
        .bind(personal_id)
        .bind(enroll_date)
        .execute(store.pool())
        .await
        .context("Failed to close episode")?;
    Ok(())
}

/// Current stored SSN for a client.
pub async fn stored_ssn(store: &ClientStore, personal_id: &str) -> Result<Option<String>> {
    let sql = format!(
        "SELECT ssn FROM {} WHERE personal_id = $1",
        store.table()
    );
    let value: Option<Option<String>> = sqlx::query_scalar(&sql)
        .bind(personal_id)
        .fetch_optional(store.pool())
        .await
        .context("Failed to read ssn")?;
    Ok(value.flatten())
}

fn sql_type(batch: &RawBatch, idx: usize) -> &'static str {
    let first = batch
        .rows()
        .iter()
        .map(|row| &row[idx])
        .find(|cell| !cell.is_null());
    match first {
        Some(CellValue::Bool(_)) => "BOOLEAN",
        Some(CellValue::Int(_)) => "INTEGER",
        Some(CellValue::Float(_)) => "DOUBLE PRECISION",
        _ => "TEXT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeBuilder;

    #[tokio::test]
    async fn test_seeded_store_round_trips_open_episodes() {
        let batch = IntakeBuilder::new().rows(2).build();
        let store = seeded_store(&batch).await.unwrap();
        let extracted = store.fetch_open_episodes().await.unwrap();
        assert_eq!(extracted.len(), 2);
        assert_eq!(stored_ssn(&store, "P0").await.unwrap().as_deref(), Some("123-45-6789"));
        store.close().await;
    }
}
