//! Per-day timeline construction

use crate::travel::TravelTimes;
use chrono::{Duration, NaiveDate};
use sdk::types::{Candidate, Category, DaySchedule, ScheduledVisit, TimeSlot, TransitGap};

/// Timeline of one date while the optimizer fills it.
///
/// Visits are kept ordered by start. Every non-forced placement leaves at
/// least the travel time between neighbours.
pub(crate) struct DayBuilder<'a> {
    pub date: NaiveDate,
    pub active: TimeSlot,
    candidates: &'a [Candidate],
    travel: &'a dyn TravelTimes,
    placed: Vec<(usize, TimeSlot)>,
    capacity_minutes: i64,
}

impl<'a> DayBuilder<'a> {
    pub fn new(
        date: NaiveDate,
        active: TimeSlot,
        candidates: &'a [Candidate],
        travel: &'a dyn TravelTimes,
        buffer_fraction: f64,
    ) -> Self {
        let active_minutes = active.minutes();
        let idle_floor = (active_minutes as f64 * buffer_fraction).ceil() as i64;
        Self {
            date,
            active,
            candidates,
            travel,
            placed: Vec::new(),
            capacity_minutes: active_minutes - idle_floor,
        }
    }

    /// Earliest slot of `minutes` length that fits a free gap and the
    /// candidate's availability on this date.
    pub fn earliest_fit(&self, idx: usize, minutes: u32) -> Option<TimeSlot> {
        let candidate = &self.candidates[idx];
        let length = Duration::minutes(i64::from(minutes));
        let availability = candidate.availability(&self.active);

        for gap in 0..=self.placed.len() {
            let lower = match gap.checked_sub(1).map(|i| self.placed[i]) {
                Some((prev, slot)) => slot.end + self.travel.between(&self.candidates[prev], candidate),
                None => self.active.start,
            };
            let upper = match self.placed.get(gap) {
                Some(&(next, slot)) => slot.start - self.travel.between(candidate, &self.candidates[next]),
                None => self.active.end,
            };

            for window in &availability {
                let start = lower.max(window.start);
                let end = start + length;
                if end <= upper && end <= window.end {
                    return Some(TimeSlot { start, end });
                }
            }
        }
        None
    }

    /// The candidate's fixed slot, if it lies inside active hours and
    /// leaves room to travel from and to its neighbours.
    pub fn fixed_fit(&self, idx: usize) -> Option<TimeSlot> {
        let candidate = &self.candidates[idx];
        let slot = candidate.fixed_time?;
        if slot.start.date() != self.date || !self.active.contains(&slot) {
            return None;
        }
        let clear = self.placed.iter().all(|&(other, placed)| {
            let neighbour = &self.candidates[other];
            if placed.start <= slot.start {
                placed.end + self.travel.between(neighbour, candidate) <= slot.start
            } else {
                slot.end + self.travel.between(candidate, neighbour) <= placed.start
            }
        });
        clear.then_some(slot)
    }

    /// Busy minutes allowed before the idle-buffer floor is reached
    pub fn capacity_minutes(&self) -> i64 {
        self.capacity_minutes
    }

    /// Whether placing `slot` keeps the idle-buffer floor
    pub fn respects_buffer(&self, idx: usize, slot: TimeSlot) -> bool {
        let mut timeline = self.placed.clone();
        insert_sorted(&mut timeline, idx, slot);
        self.busy_minutes(&timeline) <= self.capacity_minutes
    }

    /// Insert a visit. Callers check fit first, except for required
    /// fixed-time items, which are placed unconditionally.
    pub fn place(&mut self, idx: usize, slot: TimeSlot) {
        insert_sorted(&mut self.placed, idx, slot);
    }

    pub fn category_count(&self, category: Category) -> usize {
        self.placed
            .iter()
            .filter(|(idx, _)| self.candidates[*idx].category == category)
            .count()
    }

    pub fn into_schedule(self) -> DaySchedule {
        let visits: Vec<ScheduledVisit> = self
            .placed
            .iter()
            .map(|&(idx, slot)| ScheduledVisit::confirmed(&self.candidates[idx], slot))
            .collect();
        let transits = self
            .placed
            .windows(2)
            .map(|pair| {
                let (from, slot) = pair[0];
                let (to, _) = pair[1];
                TransitGap {
                    from: self.candidates[from].id.clone(),
                    to: self.candidates[to].id.clone(),
                    start: slot.end,
                    minutes: self
                        .travel
                        .between(&self.candidates[from], &self.candidates[to])
                        .num_minutes(),
                }
            })
            .collect();

        DaySchedule {
            date: self.date,
            active: self.active,
            visits,
            transits,
        }
    }

    fn busy_minutes(&self, timeline: &[(usize, TimeSlot)]) -> i64 {
        let visiting: i64 = timeline.iter().map(|(_, slot)| slot.minutes()).sum();
        let travelling: i64 = timeline
            .windows(2)
            .map(|pair| {
                self.travel
                    .between(&self.candidates[pair[0].0], &self.candidates[pair[1].0])
                    .num_minutes()
            })
            .sum();
        visiting + travelling
    }
}

fn insert_sorted(timeline: &mut Vec<(usize, TimeSlot)>, idx: usize, slot: TimeSlot) {
    let pos = timeline.partition_point(|(_, placed)| placed.start <= slot.start);
    timeline.insert(pos, (idx, slot));
}
