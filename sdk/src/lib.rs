//! Waypoint SDK
//!
//! Shared contracts for the itinerary planner: domain types, errors and the
//! traits implemented by stages, memory stores and travel-time providers.
//! Stage implementations depend on this crate instead of the engine.

/// Error types and handling
pub mod errors;

/// Candidate, schedule and plan types
pub mod types;

/// Specialist stage contracts
pub mod stage;

/// Memory store contract
pub mod memory;

/// Travel-time provider contract
pub mod travel;

// Re-export commonly used types
pub use errors::{EngineError, FailureReason, WaypointErrorExt};
pub use memory::{MemoryRecord, MemoryStore, RecordKind, ScoredRecord};
pub use stage::{
    ClarificationRequest, LogisticsReport, LogisticsRequest, LogisticsStage, PreferenceOutcome,
    PreferenceRequest, PreferenceStage, ResearchRequest, ResearchStage, Stage, WindowRevision,
};
pub use travel::TravelTimeProvider;
pub use types::{
    Candidate, CandidateId, Category, DaySchedule, DropReason, DroppedCandidate, GeoPoint,
    ItineraryDay, ItineraryEntry, OperatingWindow, Pace, PlanWarning, ScheduledVisit, TimeSlot,
    TransitGap, TripPlan, UserConstraints, VisitDuration, VisitStatus, WarningKind, WindowDay,
};
