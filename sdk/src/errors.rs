//! Error types and handling
//!
//! This module provides the error types used throughout the waypoint planner.
//! All errors implement the `WaypointErrorExt` trait which provides user-friendly
//! hints and indicates whether the planning session can continue.
//!
//! # Error Categories
//!
//! - **Validation**: malformed constraints or candidates. The session stays open.
//! - **Stage**: an external stage timed out or failed. Retried, then degraded.
//! - **Infeasible constraint**: required inclusions that could not be placed.
//!   Normally attached to the plan as a warning rather than returned.
//! - **Session failure**: terminal; a new session is required.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Trait for waypoint error extensions
///
/// Provides a user-safe hint and recoverability information for every error.
pub trait WaypointErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains raw stage output or file paths.
    fn user_hint(&self) -> &str;

    /// Returns whether the session that produced the error can continue
    fn is_recoverable(&self) -> bool;
}

/// Reason a planning session ended in the terminal failed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "kebab-case")]
pub enum FailureReason {
    /// Both gathering stages exhausted their retries.
    GatheringExhausted,
    /// The preference stage exhausted its retries and no prior constraints exist.
    PreferenceStageExhausted,
    /// A plan or state invariant was violated after resolution.
    StructuralInvariant(String),
    /// The session was cancelled at a state boundary.
    Cancelled,
}

impl FailureReason {
    /// Stable reason code suitable for machine consumption
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::GatheringExhausted => "gathering-exhausted",
            FailureReason::PreferenceStageExhausted => "preference-stage-exhausted",
            FailureReason::StructuralInvariant(_) => "structural-invariant",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StructuralInvariant(detail) => write!(f, "{}: {}", self.code(), detail),
            _ => f.write_str(self.code()),
        }
    }
}

/// Main planner error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, FailureReason, WaypointErrorExt};
///
/// let error = EngineError::Validation("date range is empty".to_string());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::SessionFailure(FailureReason::GatheringExhausted);
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Stage errors
    #[error("Stage '{stage}' timed out after {timeout_secs}s")]
    StageTimeout { stage: String, timeout_secs: u64 },

    #[error("Stage '{stage}' failed: {reason}")]
    StageFailure { stage: String, reason: String },

    // Scheduling errors
    #[error("Infeasible constraint: {0}")]
    InfeasibleConstraint(String),

    // Session errors
    #[error("Session failed: {0}")]
    SessionFailure(FailureReason),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session cancelled")]
    Cancelled,

    // Collaborator errors
    #[error("Travel time lookup failed: {0}")]
    TravelLookup(String),

    #[error("Memory store error: {0}")]
    Memory(String),

    #[error("Database error: {0}")]
    Database(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WaypointErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Validation(_) => "Check the trip dates, daily hours and places you entered",
            Self::StageTimeout { .. } => "A planning step took too long to respond. Try again",
            Self::StageFailure { .. } => "A planning step failed. Try again shortly",
            Self::InfeasibleConstraint(_) => {
                "Some must-see places could not fit. Consider a longer trip or fewer inclusions"
            }
            Self::SessionFailure(FailureReason::Cancelled) | Self::Cancelled => {
                "Planning was cancelled"
            }
            Self::SessionFailure(_) => "Planning could not complete. Start a new session",
            Self::InvalidTransition { .. } => "Planning reached an invalid state. Start a new session",
            Self::TravelLookup(_) => "Travel times are estimated for some legs",
            Self::Memory(_) => "Saved preferences are unavailable right now",
            Self::Database(_) => "Local storage failed. Check the data directory",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Serialization(_) => "Input data is not in the expected format",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::SessionFailure(_) | Self::InvalidTransition { .. } | Self::Cancelled
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::GatheringExhausted.code(), "gathering-exhausted");
        assert_eq!(FailureReason::Cancelled.to_string(), "cancelled");
        assert_eq!(
            FailureReason::StructuralInvariant("overlap".to_string()).to_string(),
            "structural-invariant: overlap"
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(EngineError::Validation("x".into()).is_recoverable());
        assert!(EngineError::StageTimeout {
            stage: "research".into(),
            timeout_secs: 30
        }
        .is_recoverable());
        assert!(!EngineError::SessionFailure(FailureReason::GatheringExhausted).is_recoverable());
        assert!(!EngineError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_failure_reason_serializes_with_code() {
        let json = serde_json::to_string(&FailureReason::GatheringExhausted).unwrap();
        assert_eq!(json, r#"{"code":"gathering-exhausted"}"#);
    }
}
