/// Trip plan persistence
///
/// Compiled plans are stored as JSON alongside a few columns for listing.
/// All queries are parameterized.
use anyhow::{Context, Result};
use sdk::types::TripPlan;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

/// Listing row for a stored plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: String,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub created_at: i64,
}

/// A stored plan with its body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
    pub summary: PlanSummary,
    pub plan: TripPlan,
}

pub struct PlanRepository {
    pool: SqlitePool,
}

impl PlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a compiled plan under `id`
    pub async fn save(&self, id: &str, plan: &TripPlan) -> Result<PlanSummary> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
        let body = serde_json::to_string(plan).context("Failed to serialize plan")?;

        let summary = PlanSummary {
            id: id.to_string(),
            destination: plan.destination().to_string(),
            start_date: plan.start_date().to_string(),
            end_date: plan.end_date().to_string(),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO trip_plans (id, destination, start_date, end_date, body, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&summary.id)
        .bind(&summary.destination)
        .bind(&summary.start_date)
        .bind(&summary.end_date)
        .bind(body)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save plan")?;

        Ok(summary)
    }

    /// Most recent plans first
    pub async fn list(&self, limit: usize) -> Result<Vec<PlanSummary>> {
        let rows = sqlx::query(
            "SELECT id, destination, start_date, end_date, created_at FROM trip_plans ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list plans")?;

        Ok(rows.into_iter().map(|r| summary_from_row(&r)).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredPlan>> {
        let row = sqlx::query(
            "SELECT id, destination, start_date, end_date, created_at, body FROM trip_plans WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch plan")?;

        match row {
            Some(r) => {
                let body: String = r.get("body");
                let plan: TripPlan =
                    serde_json::from_str(&body).context("Stored plan is not valid JSON")?;
                Ok(Some(StoredPlan {
                    summary: summary_from_row(&r),
                    plan,
                }))
            }
            None => Ok(None),
        }
    }
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> PlanSummary {
    PlanSummary {
        id: row.get("id"),
        destination: row.get("destination"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::{NaiveDate, NaiveTime};
    use sdk::types::{DaySchedule, Pace, UserConstraints};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn plan(destination: &str) -> TripPlan {
        let constraints = UserConstraints {
            destination: destination.to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            excluded_categories: BTreeSet::new(),
            excluded_candidates: BTreeSet::new(),
            required: vec![],
            pace: Pace::Relaxed,
        };
        let days = constraints
            .dates()
            .map(|d| DaySchedule::empty(d, constraints.active_slot(d)))
            .collect();
        TripPlan::new(&constraints, days, vec![], vec![])
    }

    #[tokio::test]
    async fn test_save_list_get() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("plans.db")).await.unwrap();
        let repo = db.plans();

        repo.save("plan-1", &plan("Kyoto")).await.unwrap();
        repo.save("plan-2", &plan("Osaka")).await.unwrap();

        let listed = repo.list(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "plan-2");

        let stored = repo.get("plan-1").await.unwrap().unwrap();
        assert_eq!(stored.plan, plan("Kyoto"));
        assert_eq!(stored.summary.start_date, "2025-09-01");

        assert!(repo.get("missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
