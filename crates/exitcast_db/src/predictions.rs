//! Prediction column ownership: schema evolution, per-row apply, retirement.

use exitcast_schema::{Label, PredictionRecord, PREDICTION_COLUMN};
use tracing::{debug, info};

use crate::error::Result;
use crate::ClientStore;

/// What a single prediction write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionWrite {
    /// The open episode now carries the label
    Applied,
    /// The episode exists but has an exit date; its prediction was left alone
    EpisodeClosed,
    /// No episode with this key exists
    MissingEpisode,
}

#[cfg(feature = "postgres")]
const COLUMN_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.columns \
     WHERE table_schema = current_schema() \
     AND CAST(table_name AS TEXT) = $1 AND CAST(column_name AS TEXT) = $2";

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const COLUMN_EXISTS_SQL: &str = "SELECT COUNT(*) FROM pragma_table_info($1) WHERE name = $2";

#[cfg(feature = "postgres")]
const ADD_COLUMN_CLAUSE: &str = "ADD COLUMN IF NOT EXISTS";

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const ADD_COLUMN_CLAUSE: &str = "ADD COLUMN";

impl ClientStore {
    /// Create the prediction column if the table does not define it yet.
    ///
    /// Returns `true` when the column was created by this call.
    pub async fn ensure_prediction_column(&self) -> Result<bool> {
        let existing: i64 = sqlx::query_scalar(COLUMN_EXISTS_SQL)
            .bind(self.table.as_str())
            .bind(PREDICTION_COLUMN)
            .fetch_one(&self.pool)
            .await?;
        if existing > 0 {
            debug!(table = %self.table, "Prediction column already present");
            return Ok(false);
        }

        let sql = format!(
            "ALTER TABLE {} {} {} VARCHAR",
            self.table, ADD_COLUMN_CLAUSE, PREDICTION_COLUMN
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        info!(table = %self.table, column = PREDICTION_COLUMN, "Created prediction column");
        Ok(true)
    }

    /// Write one prediction in its own transaction.
    ///
    /// Only an open episode is updated: the exit check is part of the
    /// statement, so a prediction can never overwrite `exited`.
    pub async fn apply_prediction(&self, record: &PredictionRecord) -> Result<PredictionWrite> {
        let mut tx = self.pool.begin().await?;

        let update = format!(
            "UPDATE {} SET {} = $1 \
             WHERE CAST(personal_id AS TEXT) = $2 AND enroll_date = $3 AND exit_date IS NULL",
            self.table, PREDICTION_COLUMN
        );
        let updated = sqlx::query(&update)
            .bind(record.label.as_str())
            .bind(record.key.personal_id.as_str())
            .bind(record.key.enroll_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let outcome = if updated > 0 {
            PredictionWrite::Applied
        } else {
            let lookup = format!(
                "SELECT exit_date IS NOT NULL FROM {} \
                 WHERE CAST(personal_id AS TEXT) = $1 AND enroll_date = $2 LIMIT 1",
                self.table
            );
            let closed: Option<bool> = sqlx::query_scalar(&lookup)
                .bind(record.key.personal_id.as_str())
                .bind(record.key.enroll_date)
                .fetch_optional(&mut *tx)
                .await?;
            match closed {
                Some(true) => PredictionWrite::EpisodeClosed,
                _ => PredictionWrite::MissingEpisode,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Overwrite the prediction of every exited episode with the terminal marker.
    ///
    /// Returns the number of rows retired by this call; rows already marked are
    /// not touched again.
    pub async fn retire_exited(&self) -> Result<u64> {
        let sql = format!(
            "UPDATE {table} SET {col} = $1 \
             WHERE exit_date IS NOT NULL AND ({col} IS NULL OR {col} <> $1)",
            table = self.table,
            col = PREDICTION_COLUMN
        );
        let retired = sqlx::query(&sql)
            .bind(Label::Exited.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!(table = %self.table, retired, "Retired predictions of exited episodes");
        Ok(retired)
    }

    /// Current prediction of an episode, if the column holds one.
    pub async fn prediction_for(
        &self,
        personal_id: &str,
        enroll_date: chrono::NaiveDate,
    ) -> Result<Option<String>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE CAST(personal_id AS TEXT) = $1 AND enroll_date = $2 LIMIT 1",
            PREDICTION_COLUMN, self.table
        );
        let value: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(personal_id)
            .bind(enroll_date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.flatten())
    }
}
