//! Planner domain types
//!
//! These are the records exchanged between stages, the engine and renderers.
//! All times are destination-local; durations are whole minutes.

use crate::errors::EngineError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Identifier of a candidate, unique within a pool
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great-circle distance in meters
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Kind of visitable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Attraction,
    Meal,
    Event,
    TransitAnchor,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Attraction => "attraction",
            Category::Meal => "meal",
            Category::Event => "event",
            Category::TransitAnchor => "transit-anchor",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attraction" | "attractions" | "sight" | "sights" => Ok(Category::Attraction),
            "meal" | "meals" | "restaurant" | "restaurants" | "food" => Ok(Category::Meal),
            "event" | "events" | "show" | "shows" => Ok(Category::Event),
            "transit-anchor" | "transit" | "station" | "stations" => Ok(Category::TransitAnchor),
            other => Err(EngineError::Validation(format!("unknown category '{}'", other))),
        }
    }
}

/// A (start, end) pair with end strictly after start
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, EngineError> {
        let slot = Self { start, end };
        slot.validate()?;
        Ok(slot)
    }

    /// Slot on `date` between two clock times
    pub fn on(date: NaiveDate, open: NaiveTime, close: NaiveTime) -> Result<Self, EngineError> {
        Self::new(date.and_time(open), date.and_time(close))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.end <= self.start {
            return Err(EngineError::Validation(format!(
                "time slot ends at {} which is not after its start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeSlot) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersect(&self, other: &TimeSlot) -> Option<TimeSlot> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end > start).then_some(TimeSlot { start, end })
    }
}

/// Which days an operating window applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowDay {
    Daily,
    Weekday(Weekday),
    Date(NaiveDate),
}

/// Opening hours on the days selected by `day`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatingWindow {
    pub day: WindowDay,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl OperatingWindow {
    pub fn daily(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            day: WindowDay::Daily,
            open,
            close,
        }
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self.day {
            WindowDay::Daily => true,
            WindowDay::Weekday(weekday) => date.weekday() == weekday,
            WindowDay::Date(d) => d == date,
        }
    }

    pub fn slot_on(&self, date: NaiveDate) -> Option<TimeSlot> {
        if !self.applies_to(date) {
            return None;
        }
        TimeSlot::on(date, self.open, self.close).ok()
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.close <= self.open {
            return Err(EngineError::Validation(format!(
                "operating window closes at {} before it opens at {}",
                self.close, self.open
            )));
        }
        Ok(())
    }
}

/// Estimated visit length in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDuration {
    pub min: u32,
    pub typical: u32,
    pub max: u32,
}

impl VisitDuration {
    pub fn new(min: u32, typical: u32, max: u32) -> Self {
        Self { min, typical, max }
    }

    /// Same length for all three estimates
    pub fn exactly(minutes: u32) -> Self {
        Self::new(minutes, minutes, minutes)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min == 0 || self.min > self.typical || self.typical > self.max {
            return Err(EngineError::Validation(format!(
                "visit duration must satisfy 0 < min <= typical <= max, got {}/{}/{}",
                self.min, self.typical, self.max
            )));
        }
        Ok(())
    }
}

/// A visitable item produced by research or logistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub category: Category,
    pub location: GeoPoint,
    /// Empty means always open
    #[serde(default)]
    pub windows: Vec<OperatingWindow>,
    pub duration: VisitDuration,
    pub priority: f64,
    #[serde(default)]
    pub fixed_time: Option<TimeSlot>,
    #[serde(default)]
    pub description: String,
}

impl Candidate {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.as_str().trim().is_empty() {
            return Err(EngineError::Validation(
                "candidate identifier is empty".to_string(),
            ));
        }
        if !self.location.is_finite() {
            return Err(EngineError::Validation(format!(
                "candidate '{}' has a non-finite geolocation",
                self.id
            )));
        }
        if !self.priority.is_finite() || !(0.0..=1.0).contains(&self.priority) {
            return Err(EngineError::Validation(format!(
                "candidate '{}' priority {} is outside 0..=1",
                self.id, self.priority
            )));
        }
        for window in &self.windows {
            window
                .validate()
                .map_err(|e| EngineError::Validation(format!("candidate '{}': {}", self.id, e)))?;
        }
        self.duration
            .validate()
            .map_err(|e| EngineError::Validation(format!("candidate '{}': {}", self.id, e)))?;
        if let Some(slot) = &self.fixed_time {
            slot.validate()
                .map_err(|e| EngineError::Validation(format!("candidate '{}': {}", self.id, e)))?;
        }
        Ok(())
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_time.is_some()
    }

    pub fn is_always_open(&self) -> bool {
        self.windows.is_empty()
    }

    /// Portions of `bounds` during which this candidate can be visited.
    ///
    /// Fixed-time candidates are available only at their fixed slot.
    pub fn availability(&self, bounds: &TimeSlot) -> Vec<TimeSlot> {
        if let Some(fixed) = &self.fixed_time {
            return if bounds.contains(fixed) {
                vec![*fixed]
            } else {
                Vec::new()
            };
        }
        if self.is_always_open() {
            return vec![*bounds];
        }

        let date = bounds.start.date();
        let mut slots: Vec<TimeSlot> = self
            .windows
            .iter()
            .filter_map(|w| w.slot_on(date))
            .filter_map(|slot| slot.intersect(bounds))
            .collect();
        slots.sort();
        slots.dedup();
        slots
    }
}

/// How densely days are packed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pace {
    Relaxed,
    #[default]
    Balanced,
    Packed,
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pace::Relaxed => "relaxed",
            Pace::Balanced => "balanced",
            Pace::Packed => "packed",
        })
    }
}

/// Structured traveler constraints for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConstraints {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    #[serde(default)]
    pub excluded_categories: BTreeSet<Category>,
    #[serde(default)]
    pub excluded_candidates: BTreeSet<CandidateId>,
    /// Seeded in this order
    #[serde(default)]
    pub required: Vec<CandidateId>,
    #[serde(default)]
    pub pace: Pace,
}

impl UserConstraints {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.destination.trim().is_empty() {
            return Err(EngineError::Validation("destination is missing".to_string()));
        }
        if self.end_date < self.start_date {
            return Err(EngineError::Validation(format!(
                "trip ends on {} before it starts on {}",
                self.end_date, self.start_date
            )));
        }
        if self.day_end <= self.day_start {
            return Err(EngineError::Validation(format!(
                "daily active hours {}-{} are empty",
                self.day_start.format("%H:%M"),
                self.day_end.format("%H:%M")
            )));
        }
        Ok(())
    }

    /// Every date of the trip, inclusive
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |d| *d <= self.end_date)
    }

    pub fn day_count(&self) -> usize {
        self.dates().count()
    }

    /// Active-hours window on `date`
    pub fn active_slot(&self, date: NaiveDate) -> TimeSlot {
        TimeSlot {
            start: date.and_time(self.day_start),
            end: date.and_time(self.day_end),
        }
    }

    pub fn excludes(&self, candidate: &Candidate) -> bool {
        self.excluded_categories.contains(&candidate.category)
            || self.excluded_candidates.contains(&candidate.id)
    }

    pub fn is_required(&self, id: &CandidateId) -> bool {
        self.required.contains(id)
    }
}

/// Status of a scheduled visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisitStatus {
    Confirmed,
    SoftConflict,
    Dropped,
}

/// A candidate placed on a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledVisit {
    pub candidate_id: CandidateId,
    pub name: String,
    pub category: Category,
    pub description: String,
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub status: VisitStatus,
    pub priority: f64,
    pub fixed: bool,
}

impl ScheduledVisit {
    pub fn confirmed(candidate: &Candidate, slot: TimeSlot) -> Self {
        Self {
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            category: candidate.category,
            description: candidate.description.clone(),
            date: slot.start.date(),
            slot,
            status: VisitStatus::Confirmed,
            priority: candidate.priority,
            fixed: candidate.is_fixed(),
        }
    }
}

/// Reserved travel time between two consecutive visits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitGap {
    pub from: CandidateId,
    pub to: CandidateId,
    pub start: NaiveDateTime,
    pub minutes: i64,
}

/// One date of the trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub active: TimeSlot,
    /// Ordered by start time
    pub visits: Vec<ScheduledVisit>,
    /// `transits[i]` follows `visits[i]`
    pub transits: Vec<TransitGap>,
}

impl DaySchedule {
    pub fn empty(date: NaiveDate, active: TimeSlot) -> Self {
        Self {
            date,
            active,
            visits: Vec::new(),
            transits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Minutes spent visiting or travelling
    pub fn busy_minutes(&self) -> i64 {
        let visiting: i64 = self.visits.iter().map(|v| v.slot.minutes()).sum();
        let travelling: i64 = self.transits.iter().map(|t| t.minutes).sum();
        visiting + travelling
    }

    pub fn idle_minutes(&self) -> i64 {
        self.active.minutes() - self.busy_minutes()
    }

    pub fn contains(&self, id: &CandidateId) -> bool {
        self.visits.iter().any(|v| &v.candidate_id == id)
    }
}

/// Why a candidate is absent from every day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    NoFittingWindow,
    ExcludedByConstraint,
    CapacityExhausted,
}

impl DropReason {
    pub fn code(&self) -> &'static str {
        match self {
            DropReason::NoFittingWindow => "no-fitting-window",
            DropReason::ExcludedByConstraint => "excluded-by-constraint",
            DropReason::CapacityExhausted => "capacity-exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub candidate_id: CandidateId,
    pub name: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    StageDegraded,
    InfeasibleConstraint,
    UnresolvedConflict,
    TravelFallback,
    InvalidCandidate,
}

/// Non-fatal issue attached to a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl PlanWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One rendered row of the itinerary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryEntry {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub name: String,
    pub category: Category,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub date: NaiveDate,
    pub entries: Vec<ItineraryEntry>,
}

/// Compiled trip plan
///
/// Read-only once built; the engine hands it out behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    destination: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    pace: Pace,
    days: Vec<DaySchedule>,
    dropped: Vec<DroppedCandidate>,
    warnings: Vec<PlanWarning>,
}

impl TripPlan {
    pub fn new(
        constraints: &UserConstraints,
        days: Vec<DaySchedule>,
        dropped: Vec<DroppedCandidate>,
        warnings: Vec<PlanWarning>,
    ) -> Self {
        Self {
            destination: constraints.destination.clone(),
            start_date: constraints.start_date,
            end_date: constraints.end_date,
            pace: constraints.pace,
            days,
            dropped,
            warnings,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn pace(&self) -> Pace {
        self.pace
    }

    pub fn days(&self) -> &[DaySchedule] {
        &self.days
    }

    pub fn dropped(&self) -> &[DroppedCandidate] {
        &self.dropped
    }

    pub fn warnings(&self) -> &[PlanWarning] {
        &self.warnings
    }

    pub fn visits(&self) -> impl Iterator<Item = &ScheduledVisit> {
        self.days.iter().flat_map(|d| d.visits.iter())
    }

    pub fn find_visit(&self, id: &CandidateId) -> Option<&ScheduledVisit> {
        self.visits().find(|v| &v.candidate_id == id)
    }

    pub fn dropped_reason(&self, id: &CandidateId) -> Option<DropReason> {
        self.dropped
            .iter()
            .find(|d| &d.candidate_id == id)
            .map(|d| d.reason)
    }

    /// Ordered days of (time range, name, category, description) rows
    pub fn itinerary(&self) -> Vec<ItineraryDay> {
        self.days
            .iter()
            .map(|day| ItineraryDay {
                date: day.date,
                entries: day
                    .visits
                    .iter()
                    .map(|v| ItineraryEntry {
                        start: v.slot.start.time(),
                        end: v.slot.end.time(),
                        name: v.name.clone(),
                        category: v.category,
                        description: v.description.clone(),
                    })
                    .collect(),
            })
            .collect()
    }
}
