//! Reconciles predictions with persisted episode state.
//!
//! Two passes share the store:
//!
//! - **apply** writes each prediction to its open episode, one transaction per
//!   row. The statement only matches episodes without an exit date, so a late
//!   apply can never overwrite the terminal marker.
//! - **retire** marks every exited episode `exited`. It is idempotent and runs
//!   after every apply pass in a `run` cycle.

use exitcast_db::{ClientStore, PredictionWrite};
use exitcast_schema::PredictionRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::outcome::{FailureKind, RowOutcome, SkipReason};

/// Outcome counts of one apply pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    /// Predictions whose key is absent from the store
    pub missing: usize,
    /// Predictions for episodes that exited after extraction
    pub closed: usize,
    /// Predictions carrying the terminal label
    pub refused: usize,
    pub failed: usize,
}

impl ApplyReport {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Applied => self.applied += 1,
            RowOutcome::Skipped(SkipReason::MissingEpisode) => self.missing += 1,
            RowOutcome::Skipped(SkipReason::EpisodeClosed) => self.closed += 1,
            RowOutcome::Skipped(_) => self.refused += 1,
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.missing + self.closed + self.refused + self.failed
    }
}

/// Outcome of one retire pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetireReport {
    pub retired: u64,
    /// Whether this pass created the prediction column
    pub column_created: bool,
}

/// Owns every write to the prediction column.
pub struct PredictionSynchronizer<'a> {
    store: &'a ClientStore,
}

impl<'a> PredictionSynchronizer<'a> {
    pub fn new(store: &'a ClientStore) -> Self {
        Self { store }
    }

    /// Make sure the prediction column exists. Safe to call repeatedly.
    pub async fn prepare(&self) -> Result<bool> {
        Ok(self.store.ensure_prediction_column().await?)
    }

    /// Apply one prediction.
    ///
    /// Store failures are per-row unless the store became unreachable, which
    /// aborts the batch.
    pub async fn apply_one(&self, record: &PredictionRecord) -> Result<RowOutcome> {
        if record.label.is_terminal() {
            warn!(
                personal_id = %record.key.personal_id,
                "Refusing to apply the terminal label; only the retire pass writes it"
            );
            return Ok(RowOutcome::Skipped(SkipReason::TerminalLabel));
        }

        match self.store.apply_prediction(record).await {
            Ok(PredictionWrite::Applied) => Ok(RowOutcome::Applied),
            Ok(PredictionWrite::MissingEpisode) => {
                warn!(
                    personal_id = %record.key.personal_id,
                    enroll_date = %record.key.enroll_date,
                    "Prediction targets an episode absent from the store"
                );
                Ok(RowOutcome::Skipped(SkipReason::MissingEpisode))
            }
            Ok(PredictionWrite::EpisodeClosed) => {
                debug!(
                    personal_id = %record.key.personal_id,
                    "Episode exited since extraction; prediction not applied"
                );
                Ok(RowOutcome::Skipped(SkipReason::EpisodeClosed))
            }
            Err(e) if e.is_connectivity() => Err(e.into()),
            Err(e) => {
                warn!(
                    personal_id = %record.key.personal_id,
                    error = %e,
                    "Failed to apply prediction"
                );
                Ok(RowOutcome::Failed(FailureKind::Store))
            }
        }
    }

    /// Apply a batch. Rows committed before a connectivity failure stay
    /// committed; re-running the batch converges.
    pub async fn apply(&self, predictions: &[PredictionRecord]) -> Result<ApplyReport> {
        self.prepare().await?;

        let mut report = ApplyReport::default();
        for record in predictions {
            match self.apply_one(record).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(
                        committed = report.applied,
                        remaining = predictions.len() - report.total(),
                        "Store became unreachable during apply"
                    );
                    return Err(e);
                }
            }
        }

        if report.missing > 0 {
            warn!(missing = report.missing, "Predictions without a matching episode");
        }
        info!(
            applied = report.applied,
            missing = report.missing,
            closed = report.closed,
            refused = report.refused,
            failed = report.failed,
            "Applied predictions"
        );
        Ok(report)
    }

    /// Overwrite the prediction of every exited episode with `exited`.
    pub async fn retire(&self) -> Result<RetireReport> {
        let column_created = self.prepare().await?;
        let retired = self
            .store
            .retire_exited()
            .await
            .map_err(PipelineError::from)?;
        Ok(RetireReport {
            retired,
            column_created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use exitcast_schema::{EpisodeKey, Label};
    use exitcast_test_utils::{
        close_episode, file_store, seeded_file_store, seeded_store, IntakeBuilder,
    };

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn prediction(pid: &str, enroll: &str, label: Label) -> PredictionRecord {
        PredictionRecord::new(EpisodeKey::new(pid, date(enroll)), label)
    }

    async fn store() -> ClientStore {
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[])
            .row("B2", "2023-02-01", &[])
            .build();
        seeded_store(&batch).await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let store = store().await;
        let sync = PredictionSynchronizer::new(&store);
        let batch = vec![
            prediction("A1", "2023-01-01", Label::Perm),
            prediction("B2", "2023-02-01", Label::Temp),
        ];

        let first = sync.apply(&batch).await.unwrap();
        let second = sync.apply(&batch).await.unwrap();
        assert_eq!(first.applied, 2);
        assert_eq!(first, second);
        assert_eq!(
            store.prediction_for("A1", date("2023-01-01")).await.unwrap().as_deref(),
            Some("perm")
        );
        assert_eq!(
            store.prediction_for("B2", date("2023-02-01")).await.unwrap().as_deref(),
            Some("temp")
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_newer_prediction_overwrites_while_open() {
        let store = store().await;
        let sync = PredictionSynchronizer::new(&store);
        sync.apply(&[prediction("A1", "2023-01-01", Label::Perm)]).await.unwrap();
        sync.apply(&[prediction("A1", "2023-01-01", Label::Es)]).await.unwrap();
        assert_eq!(
            store.prediction_for("A1", date("2023-01-01")).await.unwrap().as_deref(),
            Some("es")
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_missing_episode_is_counted_not_inserted() {
        let store = store().await;
        let sync = PredictionSynchronizer::new(&store);
        let report = sync
            .apply(&[
                prediction("ZZ", "2023-01-01", Label::Perm),
                prediction("A1", "2023-03-03", Label::Perm),
            ])
            .await
            .unwrap();
        assert_eq!(report.missing, 2);
        assert_eq!(report.applied, 0);
        assert_eq!(store.prediction_for("ZZ", date("2023-01-01")).await.unwrap(), None);
        store.close().await;
    }

    #[tokio::test]
    async fn test_terminal_label_is_refused() {
        let store = store().await;
        let sync = PredictionSynchronizer::new(&store);
        let report = sync
            .apply(&[prediction("A1", "2023-01-01", Label::Exited)])
            .await
            .unwrap();
        assert_eq!(report.refused, 1);
        assert_eq!(store.prediction_for("A1", date("2023-01-01")).await.unwrap(), None);
        store.close().await;
    }

    #[tokio::test]
    async fn test_retire_wins_over_later_apply() {
        let store = store().await;
        let sync = PredictionSynchronizer::new(&store);
        sync.apply(&[prediction("A1", "2023-01-01", Label::Perm)]).await.unwrap();

        close_episode(&store, "A1", date("2023-01-01"), date("2023-06-01"))
            .await
            .unwrap();
        let retired = sync.retire().await.unwrap();
        assert_eq!(retired.retired, 1);
        assert!(!retired.column_created);

        // A stale batch arriving after the exit cannot undo the marker.
        let late = sync
            .apply(&[prediction("A1", "2023-01-01", Label::Temp)])
            .await
            .unwrap();
        assert_eq!(late.closed, 1);
        assert_eq!(
            store.prediction_for("A1", date("2023-01-01")).await.unwrap().as_deref(),
            Some("exited")
        );

        assert_eq!(sync.retire().await.unwrap().retired, 0);
        store.close().await;
    }

    #[tokio::test]
    async fn test_retire_creates_column_on_first_run() {
        let store = store().await;
        let sync = PredictionSynchronizer::new(&store);
        close_episode(&store, "B2", date("2023-02-01"), date("2023-05-01"))
            .await
            .unwrap();

        let report = sync.retire().await.unwrap();
        assert!(report.column_created);
        assert_eq!(report.retired, 1);
        assert_eq!(
            store.prediction_for("B2", date("2023-02-01")).await.unwrap().as_deref(),
            Some("exited")
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_row_store_error_is_counted_and_batch_continues() {
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[])
            .row("B2", "2023-02-01", &[])
            .row("C3", "2023-03-01", &[])
            .build();
        let store = seeded_store(&batch).await.unwrap();
        let sync = PredictionSynchronizer::new(&store);
        sync.prepare().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_b2 BEFORE UPDATE ON guests \
             WHEN NEW.personal_id = 'B2' BEGIN SELECT RAISE(ABORT, 'row locked'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let report = sync
            .apply(&[
                prediction("A1", "2023-01-01", Label::Perm),
                prediction("B2", "2023-02-01", Label::Perm),
                prediction("C3", "2023-03-01", Label::Temp),
            ])
            .await
            .unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.prediction_for("B2", date("2023-02-01")).await.unwrap(), None);
        assert_eq!(
            store.prediction_for("C3", date("2023-03-01")).await.unwrap().as_deref(),
            Some("temp")
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_store_aborts_and_keeps_committed_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let batch = IntakeBuilder::new()
            .row("A1", "2023-01-01", &[])
            .row("B2", "2023-02-01", &[])
            .build();
        let store = seeded_file_store(&path, &batch).await.unwrap();
        let sync = PredictionSynchronizer::new(&store);

        sync.prepare().await.unwrap();
        let first = sync
            .apply_one(&prediction("A1", "2023-01-01", Label::Perm))
            .await
            .unwrap();
        assert_eq!(first, RowOutcome::Applied);

        store.pool().close().await;
        let err = sync
            .apply_one(&prediction("B2", "2023-02-01", Label::Perm))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Connectivity(_)));
        let err = sync
            .apply(&[prediction("B2", "2023-02-01", Label::Perm)])
            .await
            .unwrap_err();
        assert!(err.is_connectivity());

        let reopened = file_store(&path).await.unwrap();
        assert_eq!(
            reopened.prediction_for("A1", date("2023-01-01")).await.unwrap().as_deref(),
            Some("perm")
        );
        assert_eq!(reopened.prediction_for("B2", date("2023-02-01")).await.unwrap(), None);
        reopened.close().await;
    }
}
