//! Session state and lifecycle

use crate::pool::CandidatePool;
use crate::travel::TravelMatrix;
use sdk::errors::{EngineError, FailureReason};
use sdk::types::{PlanWarning, TripPlan, UserConstraints};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Where a session is in the planning pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStage {
    CollectingPreferences,
    Gathering,
    Optimizing,
    Resolving,
    Compiled,
    Failed,
}

impl SessionStage {
    /// Legal transitions of the session state machine.
    ///
    /// `Compiled -> Optimizing` is an explicit user revision. `Failed` is
    /// terminal.
    pub fn can_transition_to(&self, next: SessionStage) -> bool {
        use SessionStage::*;
        matches!(
            (self, next),
            (CollectingPreferences, CollectingPreferences)
                | (CollectingPreferences, Gathering)
                | (Gathering, Optimizing)
                | (Optimizing, Resolving)
                | (Resolving, Optimizing)
                | (Resolving, Compiled)
                | (Compiled, Optimizing)
                | (CollectingPreferences | Gathering | Optimizing | Resolving, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::CollectingPreferences => "COLLECTING_PREFERENCES",
            SessionStage::Gathering => "GATHERING",
            SessionStage::Optimizing => "OPTIMIZING",
            SessionStage::Resolving => "RESOLVING",
            SessionStage::Compiled => "COMPILED",
            SessionStage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session state, advanced only by the orchestrator
#[derive(Debug)]
pub struct SessionState {
    stage: SessionStage,
    pub(crate) prior: Option<UserConstraints>,
    pub(crate) constraints: Option<UserConstraints>,
    pub(crate) pool: CandidatePool,
    pub(crate) travel: Option<Arc<TravelMatrix>>,
    pub(crate) plan: Option<Arc<TripPlan>>,
    /// Stage-level warnings carried into the compiled plan
    pub(crate) warnings: Vec<PlanWarning>,
    /// Utterances of the current collecting phase, oldest first
    pub(crate) history: Vec<String>,
    pub(crate) failure: Option<FailureReason>,
}

impl SessionState {
    pub(crate) fn new(prior: Option<UserConstraints>, pool: CandidatePool) -> Self {
        Self {
            stage: SessionStage::CollectingPreferences,
            prior,
            constraints: None,
            pool,
            travel: None,
            plan: None,
            warnings: Vec::new(),
            history: Vec::new(),
            failure: None,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// Current constraints, falling back to the ones the session started with
    pub fn constraints(&self) -> Option<&UserConstraints> {
        self.constraints.as_ref().or(self.prior.as_ref())
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    /// The compiled plan; `None` unless the session is compiled
    pub fn plan(&self) -> Option<Arc<TripPlan>> {
        match self.stage {
            SessionStage::Compiled => self.plan.clone(),
            _ => None,
        }
    }

    pub fn warnings(&self) -> &[PlanWarning] {
        &self.warnings
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub(crate) fn advance(&mut self, next: SessionStage) -> Result<SessionStage, EngineError> {
        if !self.stage.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        let from = self.stage;
        self.stage = next;
        Ok(from)
    }
}

/// Cancels a session at its next state boundary
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// One trip-planning session
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    pub(crate) state: SessionState,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Session {
    pub(crate) fn new(state: SessionState) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            state,
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// A receiver that resolves once the session is cancelled
    pub(crate) fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }
}

/// Resolves when `rx` observes a cancellation; pends forever otherwise
pub(crate) async fn cancelled(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}
