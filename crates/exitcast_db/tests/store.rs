#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

use chrono::NaiveDate;
use std::time::Duration;
use exitcast_db::{ClientStore, DbError, PredictionWrite, SsnRewrite, SsnRow, StoreConfig};
use exitcast_schema::{CellValue, EpisodeKey, Label, PredictionRecord};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn seeded_store() -> ClientStore {
    let store = ClientStore::connect(StoreConfig::sqlite_memory("guests"))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE guests (
            personal_id TEXT NOT NULL,
            enroll_date TEXT NOT NULL,
            exit_date TEXT,
            exit_destination TEXT,
            ssn TEXT,
            gender TEXT,
            age INTEGER,
            income REAL,
            client_record_restricted BOOLEAN
        )",
    )
    .execute(store.pool())
    .await
    .unwrap();

    for (pid, enroll, exit, dest, ssn) in [
        ("A1", "2023-01-01", None, None, Some("123-45-6789")),
        ("B2", "2023-02-01", None, None, Some("987-65-4321")),
        ("C3", "2022-05-01", Some("2023-03-01"), Some("Permanent"), None),
    ] {
        sqlx::query(
            "INSERT INTO guests (personal_id, enroll_date, exit_date, exit_destination, ssn, gender, age, income, client_record_restricted)
             VALUES ($1, $2, $3, $4, $5, 'Female', 34, 120.5, 0)",
        )
        .bind(pid)
        .bind(enroll)
        .bind(exit)
        .bind(dest)
        .bind(ssn)
        .execute(store.pool())
        .await
        .unwrap();
    }
    store
}

fn prediction(pid: &str, enroll: &str, label: Label) -> PredictionRecord {
    PredictionRecord::new(EpisodeKey::new(pid, date(enroll)), label)
}

#[tokio::test]
async fn test_ensure_prediction_column_is_idempotent() {
    let store = seeded_store().await;
    assert!(store.ensure_prediction_column().await.unwrap());
    assert!(!store.ensure_prediction_column().await.unwrap());
    store.close().await;
}

#[tokio::test]
async fn test_fetch_open_episodes_only_returns_open_rows() {
    let store = seeded_store().await;
    let batch = store.fetch_open_episodes().await.unwrap();
    assert_eq!(batch.len(), 2);

    let pid = batch.column_index("personal_id").unwrap();
    let age = batch.column_index("age").unwrap();
    let income = batch.column_index("income").unwrap();
    let exit = batch.column_index("exit_date").unwrap();
    let ids: Vec<_> = batch.rows().iter().map(|r| r[pid].clone()).collect();
    assert!(ids.contains(&CellValue::Text("A1".into())));
    assert!(!ids.contains(&CellValue::Text("C3".into())));
    assert_eq!(batch.rows()[0][age], CellValue::Int(34));
    assert_eq!(batch.rows()[0][income], CellValue::Float(120.5));
    assert_eq!(batch.rows()[0][exit], CellValue::Null);
}

#[tokio::test]
async fn test_extract_sees_prediction_column_added_on_same_session() {
    let store = seeded_store().await;
    let before = store.fetch_open_episodes().await.unwrap();
    assert!(before.column_index("predicted_exit_destination").is_none());

    assert!(store.ensure_prediction_column().await.unwrap());
    let after = store.fetch_open_episodes().await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after.columns().len(), before.columns().len() + 1);
    let col = after.column_index("predicted_exit_destination").unwrap();
    assert!(after.rows().iter().all(|r| r[col] == CellValue::Null));

    // The session is still usable afterwards.
    assert_eq!(store.fetch_ssn_rows().await.unwrap().len(), 2);
    store.close().await;
}

#[tokio::test]
async fn test_apply_prediction_outcomes() {
    let store = seeded_store().await;
    store.ensure_prediction_column().await.unwrap();

    let applied = store
        .apply_prediction(&prediction("A1", "2023-01-01", Label::Perm))
        .await
        .unwrap();
    assert_eq!(applied, PredictionWrite::Applied);
    assert_eq!(
        store.prediction_for("A1", date("2023-01-01")).await.unwrap(),
        Some("perm".to_string())
    );

    let missing = store
        .apply_prediction(&prediction("ZZ", "2023-01-01", Label::Temp))
        .await
        .unwrap();
    assert_eq!(missing, PredictionWrite::MissingEpisode);

    let closed = store
        .apply_prediction(&prediction("C3", "2022-05-01", Label::Es))
        .await
        .unwrap();
    assert_eq!(closed, PredictionWrite::EpisodeClosed);
    assert_eq!(store.prediction_for("C3", date("2022-05-01")).await.unwrap(), None);
}

#[tokio::test]
async fn test_retire_marks_exited_once() {
    let store = seeded_store().await;
    store.ensure_prediction_column().await.unwrap();
    store
        .apply_prediction(&prediction("A1", "2023-01-01", Label::Perm))
        .await
        .unwrap();

    assert_eq!(store.retire_exited().await.unwrap(), 1);
    assert_eq!(store.retire_exited().await.unwrap(), 0);
    assert_eq!(
        store.prediction_for("C3", date("2022-05-01")).await.unwrap(),
        Some("exited".to_string())
    );
    // Open rows keep their prediction.
    assert_eq!(
        store.prediction_for("A1", date("2023-01-01")).await.unwrap(),
        Some("perm".to_string())
    );
}

#[tokio::test]
async fn test_ssn_round_trip_through_store() {
    let store = seeded_store().await;
    let rows = store.fetch_ssn_rows().await.unwrap();
    assert_eq!(rows.len(), 2);

    let written = store
        .write_ssn_tokens(&[SsnRewrite {
            personal_id: "A1".into(),
            stored: "123-45-6789".into(),
            token: "token-a1".into(),
        }])
        .await
        .unwrap();
    assert_eq!(written, 1);

    let rows = store.fetch_ssn_rows().await.unwrap();
    assert!(rows.contains(&SsnRow {
        ssn: "token-a1".into(),
        personal_id: "A1".into()
    }));
    assert!(rows.contains(&SsnRow {
        ssn: "987-65-4321".into(),
        personal_id: "B2".into()
    }));
}

#[tokio::test]
async fn test_ssn_rewrite_only_replaces_matching_value() {
    let store = seeded_store().await;
    sqlx::query(
        "INSERT INTO guests (personal_id, enroll_date, ssn) VALUES ('A1', '2024-01-01', 'token-old')",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let written = store
        .write_ssn_tokens(&[SsnRewrite {
            personal_id: "A1".into(),
            stored: "123-45-6789".into(),
            token: "token-new".into(),
        }])
        .await
        .unwrap();
    assert_eq!(written, 1);

    let mut a1: Vec<String> = store
        .fetch_ssn_rows()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.personal_id == "A1")
        .map(|r| r.ssn)
        .collect();
    a1.sort();
    assert_eq!(a1, ["token-new", "token-old"]);
    store.close().await;
}

#[tokio::test]
async fn test_invalid_table_name_rejected_before_connecting() {
    let result = ClientStore::connect(StoreConfig::sqlite_memory("guests; DROP TABLE x")).await;
    assert!(matches!(result, Err(DbError::InvalidIdentifier(_))));
}

#[tokio::test]
async fn test_unreachable_store_is_connectivity() {
    let config = StoreConfig::new("sqlite:/nonexistent-dir/for/sure/db.sqlite", "guests")
        .with_acquire_timeout(Duration::from_secs(2));
    let err = ClientStore::connect(config).await.err().unwrap();
    assert!(err.is_connectivity());
}
