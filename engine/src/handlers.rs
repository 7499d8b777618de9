//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - plan: Run one planning session end to end
//! - validate: Check a catalog against the candidate rules
//! - history: Show the last N stored plans
//! - show: Print a stored plan
//! - config show/path: Inspect configuration

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, MemoryBackend};
use crate::db::Database;
use crate::memory::InMemoryStore;
use crate::orchestrator::{Orchestrator, Stages, TurnOutcome};
use crate::pool::{AddOutcome, CandidatePool};
use crate::stages::{Catalog, CatalogLogisticsStage, CatalogResearchStage, RulePreferenceStage};
use crate::travel::HaversineWalkingProvider;
use sdk::errors::WaypointErrorExt;
use sdk::memory::MemoryStore;
use sdk::types::TripPlan;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Plan a trip from a single utterance
///
/// Builds the rule-based stages over `catalog_path`, runs one session turn
/// and prints the plan, the clarification question or the failure. Compiled
/// plans are stored unless `save` is false.
pub async fn handle_plan(
    utterance: String,
    catalog_path: &Path,
    save: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let catalog = Arc::new(Catalog::load(catalog_path)?);

    let database = if save || config.memory.backend == MemoryBackend::Sqlite {
        Some(
            Database::new(&config.database_path())
                .await
                .context("Failed to open database")?,
        )
    } else {
        None
    };

    let memory: Arc<dyn MemoryStore> = match (&database, config.memory.backend) {
        (Some(db), MemoryBackend::Sqlite) => Arc::new(db.memory()),
        _ => Arc::new(InMemoryStore::new()),
    };

    let stages = Stages {
        preferences: Arc::new(RulePreferenceStage::new()?.with_memory(Arc::clone(&memory))),
        research: Arc::new(
            CatalogResearchStage::new(Arc::clone(&catalog))
                .with_memory(memory, config.memory.retrieve_limit),
        ),
        logistics: Arc::new(CatalogLogisticsStage::new(catalog)),
    };
    let travel = Arc::new(HaversineWalkingProvider::new(
        config.travel.walking_speed_kmh,
        config.travel.detour_factor,
    ));
    let orchestrator = Orchestrator::builder(stages, travel)
        .with_config(config)
        .build();

    let mut session = orchestrator.start_session(None).await;
    let outcome = orchestrator
        .submit(&mut session, &utterance)
        .await
        .map_err(|e| {
            let hint = e.user_hint().to_string();
            anyhow::Error::new(e).context(hint)
        })?;

    let result = match outcome {
        TurnOutcome::NeedsClarification(request) => {
            match format {
                OutputFormat::Text => println!("{}", request.question),
                OutputFormat::Json => {
                    let output = json!({
                        "status": "needs-clarification",
                        "question": request.question,
                        "missing": request.missing,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(())
        }

        TurnOutcome::Compiled(plan) => {
            let plan_id = session.id().to_string();
            let saved = match (&database, save) {
                (Some(db), true) => {
                    db.plans()
                        .save(&plan_id, &plan)
                        .await
                        .context("Failed to store plan")?;
                    Some(plan_id)
                }
                _ => None,
            };

            match format {
                OutputFormat::Text => {
                    print!("{}", render_plan(&plan));
                    if let Some(id) = &saved {
                        println!();
                        println!("Saved as {}", id);
                    }
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "compiled",
                        "plan_id": saved,
                        "plan": plan.as_ref(),
                        "itinerary": plan.itinerary(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(())
        }

        TurnOutcome::Failed(reason) => {
            if let OutputFormat::Json = format {
                let output = json!({
                    "status": "failed",
                    "reason": reason.code(),
                    "message": reason.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(anyhow::anyhow!("Planning failed: {}", reason))
        }
    };

    if let Some(db) = database {
        db.close().await?;
    }
    result
}

/// Validation results for one catalog destination
#[derive(Debug, Clone, Default, Serialize)]
pub struct DestinationReport {
    pub destination: String,
    pub accepted: usize,
    /// (merged id, surviving id)
    pub merged: Vec<(String, String)>,
    pub errors: Vec<String>,
}

/// Load every catalog candidate into a fresh pool per destination
pub fn validate_catalog(catalog: &Catalog, duplicate_radius_meters: f64) -> Vec<DestinationReport> {
    let mut reports = Vec::new();
    for name in catalog.destinations() {
        let Some(entry) = catalog.destination(name) else {
            continue;
        };
        let mut pool = CandidatePool::with_duplicate_radius(duplicate_radius_meters);
        let mut report = DestinationReport {
            destination: name.to_string(),
            ..Default::default()
        };

        for candidate in entry.research.iter().chain(&entry.logistics) {
            let id = candidate.id.to_string();
            match pool.add(candidate.clone()) {
                Ok(AddOutcome::Inserted) => report.accepted += 1,
                Ok(AddOutcome::Merged { into }) => report.merged.push((id, into.to_string())),
                Err(e) => report.errors.push(format!("{}: {}", id, e)),
            }
        }
        for revision in &entry.revisions {
            if let Err(e) = pool.apply_revision(revision) {
                report
                    .errors
                    .push(format!("revision for {}: {}", revision.candidate_id, e));
            }
        }
        reports.push(report);
    }
    reports
}

/// Validate a catalog file
pub async fn handle_validate(catalog_path: &Path, config: &Config, format: OutputFormat) -> Result<()> {
    let catalog = Catalog::load(catalog_path)?;
    let reports = validate_catalog(&catalog, config.pool.duplicate_radius_meters);
    let error_count: usize = reports.iter().map(|r| r.errors.len()).sum();

    match format {
        OutputFormat::Text => {
            if reports.is_empty() {
                println!("Catalog has no destinations");
            }
            for report in &reports {
                println!("{}:", report.destination);
                println!("  Accepted: {}", report.accepted);
                for (from, into) in &report.merged {
                    println!("  Merged:   {} -> {}", from, into);
                }
                for error in &report.errors {
                    println!("  Error:    {}", error);
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "destinations": reports,
                "error_count": error_count,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if error_count > 0 {
        anyhow::bail!("Catalog has {} invalid entries", error_count);
    }
    Ok(())
}

/// Show stored plans, newest first
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let plans = database
        .plans()
        .list(limit)
        .await
        .context("Failed to fetch plan history")?;

    match format {
        OutputFormat::Text => {
            if plans.is_empty() {
                println!("No plans in history");
            } else {
                println!("Plan History (last {} plans):", limit);
                println!();

                for plan in &plans {
                    println!("Plan ID: {}", plan.id);
                    println!("  Destination: {}", plan.destination);
                    println!("  Dates: {} to {}", plan.start_date, plan.end_date);

                    let created = chrono::DateTime::from_timestamp(plan.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    println!("  Created: {}", created);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "plans": plans,
                "count": plans.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Print one stored plan
pub async fn handle_show(plan_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let stored = database
        .plans()
        .get(&plan_id)
        .await
        .context("Failed to fetch plan")?
        .ok_or_else(|| anyhow::anyhow!("Plan not found: {}", plan_id))?;

    match format {
        OutputFormat::Text => {
            println!("Plan {}", stored.summary.id);
            println!();
            print!("{}", render_plan(&stored.plan));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
    }

    database.close().await
}

pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let body = toml::to_string_pretty(config).context("Failed to serialize config")?;
            print!("{}", body);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

pub fn handle_config_path(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path()?,
    };
    match format {
        OutputFormat::Text => println!("{}", path.display()),
        OutputFormat::Json => println!("{}", json!({ "path": path })),
    }
    Ok(())
}

/// Human-readable itinerary with dropped candidates and warnings
pub fn render_plan(plan: &TripPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({} to {}, {} pace)",
        plan.destination(),
        plan.start_date(),
        plan.end_date(),
        plan.pace()
    );

    for day in plan.itinerary() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", day.date.format("%A %Y-%m-%d"));
        if day.entries.is_empty() {
            let _ = writeln!(out, "  (free day)");
        }
        for entry in day.entries {
            let _ = write!(
                out,
                "  {}-{}  {} [{}]",
                entry.start.format("%H:%M"),
                entry.end.format("%H:%M"),
                entry.name,
                entry.category
            );
            if !entry.description.is_empty() {
                let _ = write!(out, "  {}", entry.description);
            }
            let _ = writeln!(out);
        }
    }

    if !plan.dropped().is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Not scheduled:");
        for dropped in plan.dropped() {
            let _ = writeln!(out, "  {} ({})", dropped.name, dropped.reason.code());
        }
    }

    if !plan.warnings().is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Warnings:");
        for warning in plan.warnings() {
            let _ = writeln!(out, "  {}", warning.message);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use sdk::types::{
        Candidate, CandidateId, Category, DaySchedule, DropReason, DroppedCandidate, GeoPoint,
        PlanWarning, ScheduledVisit, TimeSlot, UserConstraints, VisitDuration, WarningKind,
    };

    fn constraints() -> UserConstraints {
        UserConstraints {
            destination: "Lisbon".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            excluded_categories: Default::default(),
            excluded_candidates: Default::default(),
            required: vec![],
            pace: Default::default(),
        }
    }

    #[test]
    fn test_render_plan_lists_days_drops_and_warnings() {
        let c = constraints();
        let candidate = Candidate {
            id: CandidateId::new("tiles"),
            name: "Tile Museum".to_string(),
            category: Category::Attraction,
            location: GeoPoint::new(38.72, -9.11),
            windows: vec![],
            duration: VisitDuration::exactly(90),
            priority: 0.5,
            fixed_time: None,
            description: "Azulejo collection".to_string(),
        };
        let first = c.start_date;
        let slot = TimeSlot::new(
            first.and_hms_opt(10, 0, 0).unwrap(),
            first.and_hms_opt(11, 30, 0).unwrap(),
        )
        .unwrap();
        let mut day = DaySchedule::empty(first, c.active_slot(first));
        day.visits.push(ScheduledVisit::confirmed(&candidate, slot));
        let days = vec![day, DaySchedule::empty(c.end_date, c.active_slot(c.end_date))];

        let plan = TripPlan::new(
            &c,
            days,
            vec![DroppedCandidate {
                candidate_id: CandidateId::new("castle"),
                name: "Castle".to_string(),
                reason: DropReason::CapacityExhausted,
            }],
            vec![PlanWarning::new(WarningKind::TravelFallback, "2 lookups failed")],
        );

        let text = render_plan(&plan);
        assert!(text.starts_with("Lisbon (2025-06-01 to 2025-06-02, balanced pace)"));
        assert!(text.contains("10:00-11:30  Tile Museum [attraction]  Azulejo collection"));
        assert!(text.contains("(free day)"));
        assert!(text.contains("Castle (capacity-exhausted)"));
        assert!(text.contains("2 lookups failed"));
    }

    #[test]
    fn test_validate_catalog_reports_merges_and_errors() {
        let catalog = Catalog::from_json(
            r#"{
                "Porto": {
                    "research": [
                        {"id": "tower", "name": "Clerigos Tower", "category": "attraction",
                         "location": {"lat": 41.1456, "lon": -8.6145},
                         "duration": {"min": 30, "typical": 45, "max": 60}, "priority": 0.7},
                        {"id": "tower-2", "name": "Clerigos Tower", "category": "attraction",
                         "location": {"lat": 41.1456, "lon": -8.6146},
                         "duration": {"min": 30, "typical": 45, "max": 60}, "priority": 0.6},
                        {"id": "broken", "name": "Broken", "category": "meal",
                         "location": {"lat": 41.14, "lon": -8.61},
                         "duration": {"min": 30, "typical": 45, "max": 60}, "priority": 1.5}
                    ],
                    "revisions": [
                        {"candidate_id": "ghost", "windows": [
                            {"day": "daily", "open": "10:00:00", "close": "18:00:00"}]}
                    ]
                }
            }"#,
        )
        .unwrap();

        let reports = validate_catalog(&catalog, 50.0);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.destination, "porto");
        assert_eq!(report.accepted, 1);
        assert_eq!(
            report.merged,
            vec![("tower-2".to_string(), "tower".to_string())]
        );
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("broken"));
        assert!(report.errors[1].contains("ghost"));
    }
}
