/// Integration tests for the database module
///
/// Covers creation with WAL mode, the migrated schema, and that memory
/// records and compiled plans survive a close and reopen.
use chrono::{NaiveDate, NaiveTime};
use sdk::memory::{MemoryRecord, MemoryStore};
use sdk::types::{DaySchedule, Pace, TripPlan, UserConstraints};
use std::collections::BTreeSet;
use tempfile::TempDir;
use waypoint_engine::db::Database;

fn plan(destination: &str) -> TripPlan {
    let constraints = UserConstraints {
        destination: destination.to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 4, 11).unwrap(),
        day_start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        day_end: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        excluded_categories: BTreeSet::new(),
        excluded_candidates: BTreeSet::new(),
        required: vec![],
        pace: Pace::Balanced,
    };
    let days = constraints
        .dates()
        .map(|d| DaySchedule::empty(d, constraints.active_slot(d)))
        .collect();
    TripPlan::new(&constraints, days, vec![], vec![])
}

#[tokio::test]
async fn test_database_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("waypoint.db");

    let db = Database::new(&db_path).await.unwrap();
    assert!(db_path.exists());
    assert!(temp_dir.path().join("waypoint.db-wal").exists());

    let result = sqlx::query("SELECT COUNT(*) AS count FROM trip_plans")
        .fetch_one(db.pool())
        .await;
    assert!(result.is_ok());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_database_schema_complete() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("waypoint.db"))
        .await
        .unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();

    for table in ["memory_records", "memory_fts", "trip_plans"] {
        assert!(tables.contains(&table.to_string()), "{} table missing", table);
    }

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("waypoint.db");

    let db = Database::new(&db_path).await.unwrap();
    db.plans().save("first", &plan("Lisbon")).await.unwrap();
    db.close().await.unwrap();

    let reopened = Database::new(&db_path).await.unwrap();
    let listed = reopened.plans().list(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].destination, "Lisbon");

    let stored = reopened.plans().get("first").await.unwrap().unwrap();
    assert_eq!(stored.plan, plan("Lisbon"));
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_memory_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("waypoint.db");

    let db = Database::new(&db_path).await.unwrap();
    db.memory()
        .store(
            "pref:food",
            MemoryRecord::preference("prefers seafood and tapas bars").with_tags(["meal"]),
        )
        .await
        .unwrap();
    db.close().await.unwrap();

    let reopened = Database::new(&db_path).await.unwrap();
    let found = reopened.memory().retrieve("seafood", 5).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "pref:food");
    assert_eq!(found[0].record.tags, vec!["meal".to_string()]);

    let none = reopened.memory().retrieve("opera", 5).await.unwrap();
    assert!(none.is_empty());
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_saving_the_same_plan_id_twice_fails() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("waypoint.db"))
        .await
        .unwrap();

    db.plans().save("dup", &plan("Porto")).await.unwrap();
    assert!(db.plans().save("dup", &plan("Porto")).await.is_err());

    db.close().await.unwrap();
}
