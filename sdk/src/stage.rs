//! Specialist stage contracts
//!
//! A stage is an external reasoning step with typed input and output. The
//! orchestrator only depends on this trait, so rule-based, hard-coded and
//! model-backed implementations are interchangeable.

use crate::errors::EngineError;
use crate::types::{Candidate, CandidateId, OperatingWindow, UserConstraints};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Uniform `run(input) -> output | failure` capability
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    /// Stage name used in logs, warnings and events
    fn name(&self) -> &str;

    /// Run the stage once. The caller owns timeouts and retries.
    async fn run(&self, input: &Self::Input) -> Result<Self::Output, EngineError>;
}

/// Input of the preference-extraction stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceRequest {
    pub utterance: String,
    /// Earlier utterances of the current collecting phase, oldest first
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub prior: Option<UserConstraints>,
}

/// Question sent back to the user when constraints are incomplete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub question: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PreferenceOutcome {
    Constraints(UserConstraints),
    Clarification(ClarificationRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub destination: String,
    pub constraints: UserConstraints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticsRequest {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Replacement operating windows for a candidate already in the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRevision {
    pub candidate_id: CandidateId,
    pub windows: Vec<OperatingWindow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticsReport {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub revisions: Vec<WindowRevision>,
}

pub type PreferenceStage = dyn Stage<Input = PreferenceRequest, Output = PreferenceOutcome>;
pub type ResearchStage = dyn Stage<Input = ResearchRequest, Output = Vec<Candidate>>;
pub type LogisticsStage = dyn Stage<Input = LogisticsRequest, Output = LogisticsReport>;
