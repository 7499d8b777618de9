//! Conflict Resolver
//!
//! Checks a draft plan against the day invariants and repairs what it can:
//! no overlapping visits, enough transit time between consecutive visits,
//! and fixed-time candidates exactly at their slot.
//!
//! Repairs remove the losing visit from its day and report it as displaced.
//! The orchestrator decides whether a displaced visit gets another
//! optimization pass or is dropped.

mod compiler;

pub use compiler::Compiler;

use crate::optimizer::DraftPlan;
use crate::pool::CandidatePool;
use crate::travel::TravelTimes;
use chrono::NaiveDate;
use sdk::errors::{EngineError, FailureReason};
use sdk::types::{CandidateId, DaySchedule, ScheduledVisit, TransitGap, UserConstraints, VisitStatus};
use std::fmt;
use tracing::debug;

/// A broken day invariant
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Overlap {
        date: NaiveDate,
        first: CandidateId,
        second: CandidateId,
    },
    InsufficientTransit {
        date: NaiveDate,
        from: CandidateId,
        to: CandidateId,
        required_minutes: i64,
        available_minutes: i64,
    },
    FixedTimeMismatch {
        date: NaiveDate,
        candidate: CandidateId,
    },
    UnknownCandidate {
        date: NaiveDate,
        candidate: CandidateId,
    },
}

impl Violation {
    /// Violations the resolver cannot repair by displacing a visit
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Violation::FixedTimeMismatch { .. } | Violation::UnknownCandidate { .. }
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Overlap {
                date,
                first,
                second,
            } => write!(f, "{} overlaps {} on {}", first, second, date),
            Violation::InsufficientTransit {
                date,
                from,
                to,
                required_minutes,
                available_minutes,
            } => write!(
                f,
                "{} -> {} on {} leaves {} min for a {} min trip",
                from, to, date, available_minutes, required_minutes
            ),
            Violation::FixedTimeMismatch { date, candidate } => {
                write!(f, "{} is not at its fixed time on {}", candidate, date)
            }
            Violation::UnknownCandidate { date, candidate } => {
                write!(f, "{} on {} is not in the candidate pool", candidate, date)
            }
        }
    }
}

/// A visit removed from its day to clear a conflict
#[derive(Debug, Clone, PartialEq)]
pub struct Displacement {
    /// The removed visit, with status soft-conflict
    pub visit: ScheduledVisit,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub plan: DraftPlan,
    pub displaced: Vec<Displacement>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.displaced.is_empty()
    }
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// All invariant violations in `plan`, in day order
    pub fn validate(
        plan: &DraftPlan,
        pool: &CandidatePool,
        travel: &dyn TravelTimes,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for day in &plan.days {
            for visit in &day.visits {
                match pool.get(&visit.candidate_id) {
                    None => violations.push(Violation::UnknownCandidate {
                        date: day.date,
                        candidate: visit.candidate_id.clone(),
                    }),
                    Some(c) if c.fixed_time.is_some_and(|fixed| fixed != visit.slot) => {
                        violations.push(Violation::FixedTimeMismatch {
                            date: day.date,
                            candidate: visit.candidate_id.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }

            let mut ordered: Vec<&ScheduledVisit> = day.visits.iter().collect();
            ordered.sort_by_key(|v| v.slot.start);
            for pair in ordered.windows(2) {
                if let Some(v) = pair_violation(day.date, pair[0], pair[1], pool, travel) {
                    violations.push(v);
                }
            }
        }
        violations
    }

    /// Repair overlaps and short transits by displacing the losing visit.
    ///
    /// Fails with a session failure when a structural invariant is broken.
    pub fn resolve(
        &self,
        mut draft: DraftPlan,
        pool: &CandidatePool,
        constraints: &UserConstraints,
        travel: &dyn TravelTimes,
    ) -> Result<Resolution, EngineError> {
        if let Some(structural) = Self::validate(&draft, pool, travel)
            .into_iter()
            .find(Violation::is_structural)
        {
            return Err(EngineError::SessionFailure(
                FailureReason::StructuralInvariant(structural.to_string()),
            ));
        }

        let mut displaced = Vec::new();
        for day in &mut draft.days {
            day.visits.sort_by_key(|v| v.slot.start);
            while let Some(pos) = first_conflict(day, pool, travel) {
                let loser = pick_loser(pool, &day.visits[pos], &day.visits[pos + 1]);
                let mut visit = day.visits.remove(pos + loser);
                debug!(
                    "Displacing '{}' from {} to clear a conflict",
                    visit.candidate_id, day.date
                );
                visit.status = VisitStatus::SoftConflict;
                let required = constraints
                    .required
                    .iter()
                    .any(|id| pool.canonical_id(id) == &visit.candidate_id);
                displaced.push(Displacement { visit, required });
            }
            rebuild_transits(day, pool, travel);
        }

        Ok(Resolution {
            plan: draft,
            displaced,
        })
    }
}

fn pair_violation(
    date: NaiveDate,
    a: &ScheduledVisit,
    b: &ScheduledVisit,
    pool: &CandidatePool,
    travel: &dyn TravelTimes,
) -> Option<Violation> {
    if a.slot.overlaps(&b.slot) {
        return Some(Violation::Overlap {
            date,
            first: a.candidate_id.clone(),
            second: b.candidate_id.clone(),
        });
    }
    let (from, to) = (pool.get(&a.candidate_id)?, pool.get(&b.candidate_id)?);
    let required = travel.between(from, to).num_minutes();
    let available = (b.slot.start - a.slot.end).num_minutes();
    (available < required).then(|| Violation::InsufficientTransit {
        date,
        from: a.candidate_id.clone(),
        to: b.candidate_id.clone(),
        required_minutes: required,
        available_minutes: available,
    })
}

/// Index of the first visit that conflicts with its successor
fn first_conflict(
    day: &DaySchedule,
    pool: &CandidatePool,
    travel: &dyn TravelTimes,
) -> Option<usize> {
    day.visits
        .windows(2)
        .position(|pair| pair_violation(day.date, &pair[0], &pair[1], pool, travel).is_some())
}

/// 0 to displace `a`, 1 to displace `b`.
///
/// Fixed-time visits never move. Otherwise the lower priority loses, then
/// the later pool entry.
fn pick_loser(pool: &CandidatePool, a: &ScheduledVisit, b: &ScheduledVisit) -> usize {
    match (a.fixed, b.fixed) {
        (true, false) => return 1,
        (false, true) => return 0,
        _ => {}
    }
    match a.priority.total_cmp(&b.priority) {
        std::cmp::Ordering::Less => 0,
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Equal => {
            let position = |id: &CandidateId| pool.all().iter().position(|c| &c.id == id);
            if position(&a.candidate_id) > position(&b.candidate_id) {
                0
            } else {
                1
            }
        }
    }
}

pub(crate) fn rebuild_transits(day: &mut DaySchedule, pool: &CandidatePool, travel: &dyn TravelTimes) {
    day.transits = day
        .visits
        .windows(2)
        .filter_map(|pair| {
            let from = pool.get(&pair[0].candidate_id)?;
            let to = pool.get(&pair[1].candidate_id)?;
            Some(TransitGap {
                from: from.id.clone(),
                to: to.id.clone(),
                start: pair[0].slot.end,
                minutes: travel.between(from, to).num_minutes(),
            })
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::travel::TravelMatrix;
    use chrono::NaiveTime;
    use sdk::types::{Candidate, Category, GeoPoint, Pace, TimeSlot, VisitDuration};
    use std::collections::BTreeSet;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn slot(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeSlot {
        TimeSlot::on(
            day(),
            NaiveTime::from_hms_opt(h1, m1, 0).unwrap(),
            NaiveTime::from_hms_opt(h2, m2, 0).unwrap(),
        )
        .unwrap()
    }

    fn candidate(id: &str, priority: f64, fixed: Option<TimeSlot>) -> Candidate {
        Candidate {
            id: CandidateId::new(id),
            name: id.to_string(),
            category: Category::Attraction,
            location: GeoPoint::new(0.0, 0.0),
            windows: vec![],
            duration: VisitDuration::exactly(60),
            priority,
            fixed_time: fixed,
            description: String::new(),
        }
    }

    fn constraints(required: &[&str]) -> UserConstraints {
        UserConstraints {
            destination: "Porto".to_string(),
            start_date: day(),
            end_date: day(),
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            excluded_categories: BTreeSet::new(),
            excluded_candidates: BTreeSet::new(),
            required: required.iter().map(|id| CandidateId::new(*id)).collect(),
            pace: Pace::Packed,
        }
    }

    fn draft(visits: Vec<ScheduledVisit>) -> DraftPlan {
        DraftPlan {
            days: vec![DaySchedule {
                date: day(),
                active: slot(9, 0, 22, 0),
                visits,
                transits: vec![],
            }],
            dropped: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_clean_plan_has_no_violations() {
        let mut pool = CandidatePool::new();
        let a = candidate("a", 0.5, None);
        let b = candidate("b", 0.5, None);
        pool.add(a.clone()).unwrap();
        pool.add(b.clone()).unwrap();
        let plan = draft(vec![
            ScheduledVisit::confirmed(&a, slot(9, 0, 10, 0)),
            ScheduledVisit::confirmed(&b, slot(10, 30, 11, 30)),
        ]);

        let travel = TravelMatrix::uniform(30);
        assert!(ConflictResolver::validate(&plan, &pool, &travel).is_empty());

        let tight = TravelMatrix::uniform(45);
        let violations = ConflictResolver::validate(&plan, &pool, &tight);
        assert!(matches!(
            violations[0],
            Violation::InsufficientTransit {
                required_minutes: 45,
                available_minutes: 30,
                ..
            }
        ));
    }

    #[test]
    fn test_overlap_displaces_lower_priority() {
        let mut pool = CandidatePool::new();
        let high = candidate("high", 0.9, None);
        let low = candidate("low", 0.3, None);
        pool.add(high.clone()).unwrap();
        pool.add(low.clone()).unwrap();
        let plan = draft(vec![
            ScheduledVisit::confirmed(&low, slot(9, 0, 10, 0)),
            ScheduledVisit::confirmed(&high, slot(9, 30, 10, 30)),
        ]);

        let travel = TravelMatrix::uniform(0);
        let resolution = ConflictResolver
            .resolve(plan, &pool, &constraints(&[]), &travel)
            .unwrap();

        assert_eq!(resolution.displaced.len(), 1);
        let displaced = &resolution.displaced[0];
        assert_eq!(displaced.visit.candidate_id.as_str(), "low");
        assert_eq!(displaced.visit.status, VisitStatus::SoftConflict);
        assert_eq!(resolution.plan.days[0].visits.len(), 1);
        assert!(ConflictResolver::validate(&resolution.plan, &pool, &travel).is_empty());
    }

    #[test]
    fn test_fixed_time_visit_is_never_displaced() {
        let mut pool = CandidatePool::new();
        let show = candidate("show", 0.1, Some(slot(19, 0, 21, 0)));
        let museum = candidate("museum", 0.9, None);
        pool.add(show.clone()).unwrap();
        pool.add(museum.clone()).unwrap();
        let plan = draft(vec![
            ScheduledVisit::confirmed(&museum, slot(18, 30, 19, 30)),
            ScheduledVisit::confirmed(&show, slot(19, 0, 21, 0)),
        ]);

        let resolution = ConflictResolver
            .resolve(plan, &pool, &constraints(&["museum"]), &TravelMatrix::uniform(10))
            .unwrap();

        assert_eq!(resolution.displaced[0].visit.candidate_id.as_str(), "museum");
        assert!(resolution.displaced[0].required);
        assert_eq!(resolution.plan.days[0].visits[0].candidate_id.as_str(), "show");
    }

    #[test]
    fn test_fixed_time_mismatch_is_structural() {
        let mut pool = CandidatePool::new();
        let show = candidate("show", 0.5, Some(slot(19, 0, 21, 0)));
        pool.add(show.clone()).unwrap();
        let plan = draft(vec![ScheduledVisit::confirmed(&show, slot(18, 0, 20, 0))]);

        let err = ConflictResolver
            .resolve(plan, &pool, &constraints(&[]), &TravelMatrix::uniform(0))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::SessionFailure(FailureReason::StructuralInvariant(_))
        ));
    }
}
