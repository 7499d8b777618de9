//! Itinerary Optimization Engine
//!
//! Day-by-day greedy construction with local gap repair. The engine is
//! synchronous and total: infeasible requests degrade to partial schedules
//! plus a dropped-candidate list, never an error.
//!
//! Placement order:
//! 1. required inclusions: fixed-time ones at their exact slot first, then
//!    the rest in listed order at the earliest day that fits around them
//! 2. optional fixed-time candidates, at their slot when it is free
//! 3. optional flexible candidates, day by day, best ranked first
//!
//! Identical pool, constraints, travel matrix and hints always produce an
//! identical plan.

mod day_builder;
mod ranking;

use crate::pool::CandidatePool;
use crate::travel::TravelTimes;
use chrono::NaiveDate;
use day_builder::DayBuilder;
use ranking::{ranked, RankKey};
use sdk::types::{
    Candidate, CandidateId, DaySchedule, DropReason, DroppedCandidate, Pace, PlanWarning,
    TimeSlot, UserConstraints, WarningKind,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Pace buffers and ranking knobs
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub relaxed_buffer: f64,
    pub balanced_buffer: f64,
    pub packed_buffer: f64,
    /// A day already holding this many of a category is penalized for it
    pub category_repeat_limit: usize,
}

impl OptimizerSettings {
    pub fn buffer_fraction(&self, pace: Pace) -> f64 {
        match pace {
            Pace::Relaxed => self.relaxed_buffer,
            Pace::Balanced => self.balanced_buffer,
            Pace::Packed => self.packed_buffer,
        }
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            relaxed_buffer: 0.20,
            balanced_buffer: 0.10,
            packed_buffer: 0.0,
            category_repeat_limit: 2,
        }
    }
}

/// Restrictions carried into a re-optimization pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReoptimizationHints {
    /// Never placed again
    pub excluded: BTreeSet<CandidateId>,
    /// Only placed on days after the given date
    pub not_until_after: BTreeMap<CandidateId, NaiveDate>,
}

impl ReoptimizationHints {
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty() && self.not_until_after.is_empty()
    }

    fn allows(&self, id: &CandidateId, date: NaiveDate) -> bool {
        self.not_until_after
            .get(id)
            .map_or(true, |barred_through| date > *barred_through)
    }
}

/// Optimizer output, before resolution and compilation
#[derive(Debug, Clone, PartialEq)]
pub struct DraftPlan {
    pub days: Vec<DaySchedule>,
    pub dropped: Vec<DroppedCandidate>,
    pub warnings: Vec<PlanWarning>,
}

pub struct Optimizer {
    settings: OptimizerSettings,
}

impl Optimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Build a draft plan from an immutable pool snapshot.
    pub fn optimize(
        &self,
        pool: &CandidatePool,
        constraints: &UserConstraints,
        travel: &dyn TravelTimes,
        hints: &ReoptimizationHints,
    ) -> DraftPlan {
        let candidates = pool.all();
        let fraction = self.settings.buffer_fraction(constraints.pace);
        let mut days: Vec<DayBuilder<'_>> = constraints
            .dates()
            .map(|date| {
                DayBuilder::new(
                    date,
                    constraints.active_slot(date),
                    candidates,
                    travel,
                    fraction,
                )
            })
            .collect();

        let mut pass = Pass::new(candidates);
        let required = self.resolve_required(pool, constraints, &mut pass);

        for (idx, candidate) in candidates.iter().enumerate() {
            if constraints.excludes(candidate) {
                let reason = if required.contains(&idx) {
                    pass.warn(
                        WarningKind::InfeasibleConstraint,
                        format!("'{}' is both required and excluded", candidate.name),
                    );
                    DropReason::NoFittingWindow
                } else {
                    DropReason::ExcludedByConstraint
                };
                pass.drop(idx, reason);
            } else if hints.excluded.contains(&candidate.id) {
                let reason = if required.contains(&idx) {
                    pass.warn(
                        WarningKind::InfeasibleConstraint,
                        format!("'{}' clashes with another fixed-time booking", candidate.name),
                    );
                    DropReason::NoFittingWindow
                } else {
                    DropReason::CapacityExhausted
                };
                pass.drop(idx, reason);
            }
        }

        self.seed_required(&mut days, &required, hints, &mut pass);
        self.place_optional_fixed(&mut days, hints, &mut pass);
        self.fill_days(&mut days, constraints.pace, hints, &mut pass);
        self.classify_leftovers(&days, &required, constraints.pace, hints, &mut pass);

        let days: Vec<DaySchedule> = days.into_iter().map(DayBuilder::into_schedule).collect();
        debug!(
            "Optimizer placed {} visits over {} days, dropped {}",
            days.iter().map(|d| d.visits.len()).sum::<usize>(),
            days.len(),
            pass.dropped.len()
        );

        DraftPlan {
            days,
            dropped: pass.dropped_list(),
            warnings: pass.warnings,
        }
    }

    /// Pool positions of required inclusions, in listed order
    fn resolve_required(
        &self,
        pool: &CandidatePool,
        constraints: &UserConstraints,
        pass: &mut Pass<'_>,
    ) -> Vec<usize> {
        let positions: HashMap<&CandidateId, usize> = pool
            .all()
            .iter()
            .enumerate()
            .map(|(idx, c)| (&c.id, idx))
            .collect();

        let mut required = Vec::new();
        for id in &constraints.required {
            match positions.get(pool.canonical_id(id)) {
                Some(&idx) if !required.contains(&idx) => required.push(idx),
                Some(_) => {}
                None => pass.warn(
                    WarningKind::InfeasibleConstraint,
                    format!("required place '{}' was not found by research", id),
                ),
            }
        }
        required
    }

    fn seed_required(
        &self,
        days: &mut [DayBuilder<'_>],
        required: &[usize],
        hints: &ReoptimizationHints,
        pass: &mut Pass<'_>,
    ) {
        let candidates = pass.candidates;
        let (fixed, flexible): (Vec<usize>, Vec<usize>) = required
            .iter()
            .copied()
            .partition(|&idx| candidates[idx].is_fixed());

        for idx in fixed.into_iter().chain(flexible) {
            if pass.is_settled(idx) {
                continue;
            }
            let candidate = &candidates[idx];

            let placement = match candidate.fixed_time {
                Some(fixed) => days
                    .iter()
                    .position(|day| {
                        day.date == fixed.start.date()
                            && day.active.contains(&fixed)
                            && hints.allows(&candidate.id, day.date)
                    })
                    .map(|d| (d, fixed)),
                None => {
                    let d = &candidate.duration;
                    [d.typical, d.min].into_iter().find_map(|minutes| {
                        days.iter().enumerate().find_map(|(i, day)| {
                            if !hints.allows(&candidate.id, day.date) {
                                return None;
                            }
                            day.earliest_fit(idx, minutes).map(|slot| (i, slot))
                        })
                    })
                }
            };

            if let Some((day, slot)) = placement {
                debug!("Seeded required '{}' at {}", candidate.id, slot.start);
                days[day].place(idx, slot);
                pass.schedule(idx);
            }
        }
    }

    fn place_optional_fixed(
        &self,
        days: &mut [DayBuilder<'_>],
        hints: &ReoptimizationHints,
        pass: &mut Pass<'_>,
    ) {
        let candidates = pass.candidates;
        let order = ranked(candidates, |i| !pass.is_settled(i) && candidates[i].is_fixed());
        for idx in order {
            let candidate = &candidates[idx];
            let Some(day) = days.iter_mut().find(|day| {
                candidate
                    .fixed_time
                    .is_some_and(|slot| slot.start.date() == day.date)
            }) else {
                continue;
            };
            if !hints.allows(&candidate.id, day.date) {
                continue;
            }
            if let Some(slot) = day.fixed_fit(idx) {
                if day.respects_buffer(idx, slot) {
                    day.place(idx, slot);
                    pass.schedule(idx);
                }
            }
        }
    }

    fn fill_days(
        &self,
        days: &mut [DayBuilder<'_>],
        pace: Pace,
        hints: &ReoptimizationHints,
        pass: &mut Pass<'_>,
    ) {
        let candidates = pass.candidates;
        for day in days.iter_mut() {
            loop {
                let mut best: Option<(RankKey, usize, TimeSlot)> = None;

                for (idx, candidate) in candidates.iter().enumerate() {
                    if pass.is_settled(idx)
                        || candidate.is_fixed()
                        || !hints.allows(&candidate.id, day.date)
                    {
                        continue;
                    }
                    let Some(slot) = self.fit_flexible(day, candidate, idx, pace) else {
                        continue;
                    };
                    let penalized =
                        day.category_count(candidate.category) >= self.settings.category_repeat_limit;
                    let key = RankKey::new(candidate, idx, penalized);
                    if best
                        .as_ref()
                        .map_or(true, |(current, _, _)| key.compare(current).is_lt())
                    {
                        best = Some((key, idx, slot));
                    }
                }

                let Some((_, idx, slot)) = best else {
                    break;
                };
                day.place(idx, slot);
                pass.schedule(idx);
            }
        }
    }

    /// Typical duration, or the minimum under a packed pace
    fn fit_flexible(
        &self,
        day: &DayBuilder<'_>,
        candidate: &Candidate,
        idx: usize,
        pace: Pace,
    ) -> Option<TimeSlot> {
        acceptable_lengths(candidate, pace).into_iter().find_map(|minutes| {
            day.earliest_fit(idx, minutes)
                .filter(|slot| day.respects_buffer(idx, *slot))
        })
    }

    fn classify_leftovers(
        &self,
        days: &[DayBuilder<'_>],
        required: &[usize],
        pace: Pace,
        hints: &ReoptimizationHints,
        pass: &mut Pass<'_>,
    ) {
        let candidates = pass.candidates;
        for (idx, candidate) in candidates.iter().enumerate() {
            if pass.is_settled(idx) {
                continue;
            }
            let reason = if required.contains(&idx) {
                pass.warn(
                    WarningKind::InfeasibleConstraint,
                    format!("required place '{}' could not be scheduled", candidate.name),
                );
                DropReason::NoFittingWindow
            } else if fits_some_empty_day(candidate, days, pace, hints) {
                DropReason::CapacityExhausted
            } else {
                DropReason::NoFittingWindow
            };
            pass.drop(idx, reason);
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerSettings::default())
    }
}

/// Visit lengths tried for a flexible candidate, longest first
fn acceptable_lengths(candidate: &Candidate, pace: Pace) -> Vec<u32> {
    let duration = candidate.duration;
    let mut lengths = vec![duration.typical];
    if pace == Pace::Packed && duration.min < duration.typical {
        lengths.push(duration.min);
    }
    lengths
}

/// Whether the candidate could be visited on some allowed day if it were
/// empty, under the same length and buffer rules as the fill pass
fn fits_some_empty_day(
    candidate: &Candidate,
    days: &[DayBuilder<'_>],
    pace: Pace,
    hints: &ReoptimizationHints,
) -> bool {
    let shortest = acceptable_lengths(candidate, pace)
        .into_iter()
        .min()
        .map_or(0, i64::from);
    days.iter()
        .filter(|day| hints.allows(&candidate.id, day.date))
        .any(|day| {
            candidate.availability(&day.active).iter().any(|slot| {
                let needed = if candidate.is_fixed() {
                    slot.minutes()
                } else {
                    shortest
                };
                slot.minutes() >= needed && needed <= day.capacity_minutes()
            })
        })
}

/// Bookkeeping of one optimization pass
struct Pass<'a> {
    candidates: &'a [Candidate],
    scheduled: BTreeSet<usize>,
    dropped: BTreeMap<usize, DropReason>,
    warnings: Vec<PlanWarning>,
}

impl<'a> Pass<'a> {
    fn new(candidates: &'a [Candidate]) -> Self {
        Self {
            candidates,
            scheduled: BTreeSet::new(),
            dropped: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn is_settled(&self, idx: usize) -> bool {
        self.scheduled.contains(&idx) || self.dropped.contains_key(&idx)
    }

    fn schedule(&mut self, idx: usize) {
        self.scheduled.insert(idx);
    }

    fn drop(&mut self, idx: usize, reason: DropReason) {
        self.dropped.entry(idx).or_insert(reason);
    }

    fn warn(&mut self, kind: WarningKind, message: String) {
        self.warnings.push(PlanWarning::new(kind, message));
    }

    fn dropped_list(&self) -> Vec<DroppedCandidate> {
        self.dropped
            .iter()
            .map(|(&idx, &reason)| DroppedCandidate {
                candidate_id: self.candidates[idx].id.clone(),
                name: self.candidates[idx].name.clone(),
                reason,
            })
            .collect()
    }
}
