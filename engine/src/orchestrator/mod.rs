//! Orchestrator
//!
//! Drives a planning session through its state machine:
//!
//! ```text
//! COLLECTING_PREFERENCES -> GATHERING -> OPTIMIZING -> RESOLVING -> COMPILED
//!                                            ^             |
//!                                            +-------------+  (bounded)
//! ```
//!
//! `FAILED` is reachable from every non-terminal state.
//!
//! Every stage call runs under a timeout and is retried a bounded number of
//! times. Research and logistics run concurrently and are joined before
//! optimization; a stage that exhausts its retries contributes nothing and
//! leaves a warning. Only when both gathering stages are exhausted does the
//! session fail.
//!
//! Sessions can be cancelled through their [`CancelHandle`]. Cancellation is
//! observed at each state boundary and abandons in-flight stage calls.

mod state;

pub use state::{CancelHandle, Session, SessionStage, SessionState};

use crate::config::Config;
use crate::message_bus::{Event, MessageBus};
use crate::optimizer::{Optimizer, OptimizerSettings, ReoptimizationHints};
use crate::pool::{AddOutcome, CandidatePool, DEFAULT_DUPLICATE_RADIUS_METERS};
use crate::resolver::{Compiler, ConflictResolver};
use crate::travel::{TravelMatrix, TravelSettings};
use sdk::errors::{EngineError, FailureReason};
use sdk::stage::{
    ClarificationRequest, LogisticsRequest, LogisticsStage, PreferenceOutcome, PreferenceRequest,
    PreferenceStage, ResearchRequest, ResearchStage, Stage,
};
use sdk::travel::TravelTimeProvider;
use sdk::types::{PlanWarning, TripPlan, UserConstraints, WarningKind};
use state::cancelled;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timeouts and bounds applied to every session
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub stage_timeout: Duration,
    /// Retries after the first attempt
    pub max_stage_retries: u32,
    pub max_reoptimizations: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            max_stage_retries: 2,
            max_reoptimizations: 1,
        }
    }
}

/// The three specialist stages a session calls
#[derive(Clone)]
pub struct Stages {
    pub preferences: Arc<PreferenceStage>,
    pub research: Arc<ResearchStage>,
    pub logistics: Arc<LogisticsStage>,
}

/// Result of one user turn
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Constraints are incomplete; the session stays in collecting
    NeedsClarification(ClarificationRequest),
    Compiled(Arc<TripPlan>),
    Failed(FailureReason),
}

/// Outcome of a stage call after retries
enum Attempt<T> {
    Completed(T),
    Exhausted(EngineError),
    Cancelled,
}

pub struct OrchestratorBuilder {
    stages: Stages,
    travel: Arc<dyn TravelTimeProvider>,
    settings: OrchestratorSettings,
    optimizer: OptimizerSettings,
    travel_settings: TravelSettings,
    duplicate_radius_meters: f64,
    bus: Option<Arc<MessageBus>>,
}

impl OrchestratorBuilder {
    /// Take every knob from a loaded configuration
    pub fn with_config(mut self, config: &Config) -> Self {
        self.settings = config.orchestrator_settings();
        self.optimizer = config.optimizer_settings();
        self.travel_settings = config.travel_settings();
        self.duplicate_radius_meters = config.pool.duplicate_radius_meters;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_optimizer_settings(mut self, settings: OptimizerSettings) -> Self {
        self.optimizer = settings;
        self
    }

    pub fn with_travel_settings(mut self, settings: TravelSettings) -> Self {
        self.travel_settings = settings;
        self
    }

    /// Publish session events on `bus`
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            stages: self.stages,
            travel: self.travel,
            settings: self.settings,
            optimizer: Optimizer::new(self.optimizer),
            travel_settings: self.travel_settings,
            duplicate_radius_meters: self.duplicate_radius_meters,
            bus: self.bus,
        }
    }
}

/// Coordinates sessions. Holds no per-session state and can be shared.
pub struct Orchestrator {
    stages: Stages,
    travel: Arc<dyn TravelTimeProvider>,
    settings: OrchestratorSettings,
    optimizer: Optimizer,
    travel_settings: TravelSettings,
    duplicate_radius_meters: f64,
    bus: Option<Arc<MessageBus>>,
}

impl Orchestrator {
    pub fn builder(stages: Stages, travel: Arc<dyn TravelTimeProvider>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            stages,
            travel,
            settings: OrchestratorSettings::default(),
            optimizer: OptimizerSettings::default(),
            travel_settings: TravelSettings::default(),
            duplicate_radius_meters: DEFAULT_DUPLICATE_RADIUS_METERS,
            bus: None,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Start a session in COLLECTING_PREFERENCES.
    ///
    /// `prior` constraints are layered under whatever the user says and serve
    /// as the fallback if preference extraction is unavailable.
    pub async fn start_session(&self, prior: Option<UserConstraints>) -> Session {
        let pool = CandidatePool::with_duplicate_radius(self.duplicate_radius_meters);
        let session = Session::new(SessionState::new(prior, pool));
        info!("Session {} started", session.id());
        self.publish(Event::SessionStarted {
            session_id: session.id(),
        })
        .await;
        session
    }

    /// Handle one user utterance.
    ///
    /// Returns a clarification request, a compiled plan or a terminal failure.
    /// Invalid constraints are surfaced as a `Validation` error and the session
    /// keeps collecting preferences.
    pub async fn submit(
        &self,
        session: &mut Session,
        utterance: &str,
    ) -> Result<TurnOutcome, EngineError> {
        Self::expect_stage(
            session,
            SessionStage::CollectingPreferences,
            SessionStage::CollectingPreferences,
        )?;
        if session.is_cancelled() {
            return Ok(self.fail(session, FailureReason::Cancelled).await);
        }

        let request = PreferenceRequest {
            utterance: utterance.to_string(),
            history: session.state.history.clone(),
            prior: session.state.constraints().cloned(),
        };
        session.state.history.push(utterance.to_string());

        let stage = self.stages.preferences.as_ref();
        let constraints = match self.run_with_retry(session, stage, &request).await {
            Attempt::Completed(PreferenceOutcome::Constraints(constraints)) => constraints,
            Attempt::Completed(PreferenceOutcome::Clarification(clarification)) => {
                info!(
                    "Session {} needs clarification: {}",
                    session.id(),
                    clarification.missing.join(", ")
                );
                if let Err(reason) = self
                    .transition(session, SessionStage::CollectingPreferences)
                    .await
                {
                    return Ok(self.fail(session, reason).await);
                }
                return Ok(TurnOutcome::NeedsClarification(clarification));
            }
            Attempt::Cancelled => return Ok(self.fail(session, FailureReason::Cancelled).await),
            Attempt::Exhausted(e) => {
                let fallback = session
                    .state
                    .constraints()
                    .filter(|c| c.validate().is_ok())
                    .cloned();
                match fallback {
                    Some(prior) => {
                        self.degrade(session, stage.name(), &e).await;
                        prior
                    }
                    None => {
                        warn!(
                            "Session {}: preference extraction exhausted with no prior constraints",
                            session.id()
                        );
                        return Err(EngineError::StageFailure {
                            stage: stage.name().to_string(),
                            reason: format!("{}: {}", FailureReason::PreferenceStageExhausted, e),
                        });
                    }
                }
            }
        };

        constraints.validate()?;
        let result = self.gather_and_plan(session, constraints).await;
        Ok(self.conclude(session, result).await)
    }

    /// Skip extraction and plan directly from structured constraints
    pub async fn submit_constraints(
        &self,
        session: &mut Session,
        constraints: UserConstraints,
    ) -> Result<TurnOutcome, EngineError> {
        Self::expect_stage(
            session,
            SessionStage::CollectingPreferences,
            SessionStage::Gathering,
        )?;
        constraints.validate()?;
        if session.is_cancelled() {
            return Ok(self.fail(session, FailureReason::Cancelled).await);
        }

        let result = self.gather_and_plan(session, constraints).await;
        Ok(self.conclude(session, result).await)
    }

    /// Replace the constraints of a compiled session and re-plan over its pool.
    ///
    /// The previous plan is invalidated first. Gathering is not repeated.
    pub async fn revise(
        &self,
        session: &mut Session,
        constraints: UserConstraints,
    ) -> Result<TurnOutcome, EngineError> {
        Self::expect_stage(session, SessionStage::Compiled, SessionStage::Optimizing)?;
        constraints.validate()?;
        if session.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        info!("Session {}: constraints revised", session.id());
        session.state.constraints = Some(constraints);
        session.state.plan = None;

        let result = match self.transition(session, SessionStage::Optimizing).await {
            Ok(()) => self.optimize_and_compile(session).await,
            Err(reason) => Err(reason),
        };
        Ok(self.conclude(session, result).await)
    }

    fn expect_stage(
        session: &Session,
        expected: SessionStage,
        next: SessionStage,
    ) -> Result<(), EngineError> {
        let stage = session.state.stage();
        if stage == SessionStage::Failed {
            let reason = session
                .state
                .failure()
                .cloned()
                .unwrap_or_else(|| FailureReason::StructuralInvariant("session failed".into()));
            return Err(EngineError::SessionFailure(reason));
        }
        if stage != expected {
            return Err(EngineError::InvalidTransition {
                from: stage.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    /// GATHERING through COMPILED
    async fn gather_and_plan(
        &self,
        session: &mut Session,
        constraints: UserConstraints,
    ) -> Result<Arc<TripPlan>, FailureReason> {
        session.state.constraints = Some(constraints.clone());
        session.state.history.clear();
        Self::checkpoint(session)?;
        self.transition(session, SessionStage::Gathering).await?;

        let research_request = ResearchRequest {
            destination: constraints.destination.clone(),
            constraints: constraints.clone(),
        };
        let logistics_request = LogisticsRequest {
            destination: constraints.destination.clone(),
            start_date: constraints.start_date,
            end_date: constraints.end_date,
        };

        let shared: &Session = session;
        let (research, logistics) = tokio::join!(
            self.run_with_retry(shared, self.stages.research.as_ref(), &research_request),
            self.run_with_retry(shared, self.stages.logistics.as_ref(), &logistics_request),
        );

        let research_name = self.stages.research.name();
        let logistics_name = self.stages.logistics.name();
        let (research, logistics) = match (research, logistics) {
            (Attempt::Cancelled, _) | (_, Attempt::Cancelled) => {
                return Err(FailureReason::Cancelled)
            }
            (Attempt::Exhausted(r), Attempt::Exhausted(l)) => {
                error!(
                    "Session {}: both gathering stages exhausted ({}: {}; {}: {})",
                    session.id(),
                    research_name,
                    r,
                    logistics_name,
                    l
                );
                return Err(FailureReason::GatheringExhausted);
            }
            (research, logistics) => (
                self.settle(session, research_name, research).await,
                self.settle(session, logistics_name, logistics).await,
            ),
        };

        // Merge order is fixed: research, logistics, then window revisions
        let mut pool = CandidatePool::with_duplicate_radius(self.duplicate_radius_meters);
        let mut warnings = Vec::new();
        for candidate in research.into_iter().chain(logistics.candidates) {
            let id = candidate.id.clone();
            match pool.add(candidate) {
                Ok(AddOutcome::Inserted) => {}
                Ok(AddOutcome::Merged { into }) => debug!("Merged candidate '{}' into '{}'", id, into),
                Err(e) => {
                    warn!("Skipping candidate '{}': {}", id, e);
                    warnings.push(PlanWarning::new(
                        WarningKind::InvalidCandidate,
                        format!("skipped candidate '{}': {}", id, e),
                    ));
                }
            }
        }
        for revision in &logistics.revisions {
            if let Err(e) = pool.apply_revision(revision) {
                warn!("Ignoring window revision: {}", e);
                warnings.push(PlanWarning::new(
                    WarningKind::InvalidCandidate,
                    format!("ignored window revision for '{}': {}", revision.candidate_id, e),
                ));
            }
        }
        info!(
            "Session {}: pool holds {} candidates",
            session.id(),
            pool.len()
        );

        let build = tokio::select! {
            build = TravelMatrix::build(self.travel.as_ref(), pool.all(), &self.travel_settings) => build,
            _ = cancelled(session.cancellation()) => return Err(FailureReason::Cancelled),
        };
        if build.fallbacks > 0 {
            warnings.push(PlanWarning::new(
                WarningKind::TravelFallback,
                format!(
                    "{} travel-time lookups failed; assumed {} minutes for those legs",
                    build.fallbacks,
                    self.travel_settings.default_buffer.num_minutes()
                ),
            ));
        }

        session.state.warnings.extend(warnings);
        session.state.pool = pool;
        session.state.travel = Some(Arc::new(build.matrix));

        Self::checkpoint(session)?;
        self.transition(session, SessionStage::Optimizing).await?;
        self.optimize_and_compile(session).await
    }

    /// OPTIMIZING through COMPILED, looping back at most
    /// `max_reoptimizations` times
    async fn optimize_and_compile(
        &self,
        session: &mut Session,
    ) -> Result<Arc<TripPlan>, FailureReason> {
        let constraints = session.state.constraints.clone().ok_or_else(|| {
            FailureReason::StructuralInvariant("no constraints to optimize".to_string())
        })?;
        let travel = session.state.travel.clone().ok_or_else(|| {
            FailureReason::StructuralInvariant("no travel matrix to optimize with".to_string())
        })?;

        let mut hints = ReoptimizationHints::default();
        let mut passes = 0;
        loop {
            let draft =
                self.optimizer
                    .optimize(&session.state.pool, &constraints, travel.as_ref(), &hints);

            Self::checkpoint(session)?;
            self.transition(session, SessionStage::Resolving).await?;

            let resolution = ConflictResolver
                .resolve(draft, &session.state.pool, &constraints, travel.as_ref())
                .map_err(structural)?;

            if resolution.is_clean() || passes >= self.settings.max_reoptimizations {
                if !resolution.is_clean() {
                    warn!(
                        "Session {}: {} conflicts remain after {} re-optimizations",
                        session.id(),
                        resolution.displaced.len(),
                        passes
                    );
                }
                let plan = Compiler::compile(
                    &constraints,
                    resolution.plan,
                    resolution.displaced,
                    session.state.warnings.clone(),
                    &session.state.pool,
                    travel.as_ref(),
                )
                .map_err(structural)?;

                Self::checkpoint(session)?;
                self.transition(session, SessionStage::Compiled).await?;
                session.state.plan = Some(Arc::clone(&plan));
                self.publish(Event::PlanCompiled {
                    session_id: session.id(),
                    days: plan.days().len(),
                    dropped: plan.dropped().len(),
                    warnings: plan.warnings().len(),
                })
                .await;
                return Ok(plan);
            }

            passes += 1;
            for displaced in &resolution.displaced {
                let visit = &displaced.visit;
                if visit.fixed {
                    hints.excluded.insert(visit.candidate_id.clone());
                } else {
                    hints
                        .not_until_after
                        .insert(visit.candidate_id.clone(), visit.date);
                }
            }
            debug!(
                "Session {}: re-optimizing after displacing {} visits",
                session.id(),
                resolution.displaced.len()
            );

            Self::checkpoint(session)?;
            self.transition(session, SessionStage::Optimizing).await?;
        }
    }

    /// Run `stage` with a timeout per attempt and bounded retries
    async fn run_with_retry<I, O>(
        &self,
        session: &Session,
        stage: &dyn Stage<Input = I, Output = O>,
        input: &I,
    ) -> Attempt<O>
    where
        I: Send + Sync,
        O: Send,
    {
        let attempts = self.settings.max_stage_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if session.is_cancelled() {
                return Attempt::Cancelled;
            }
            debug!(
                "Running stage {} (attempt {}/{}, timeout: {:?})",
                stage.name(),
                attempt,
                attempts,
                self.settings.stage_timeout
            );

            let call = tokio::time::timeout(self.settings.stage_timeout, stage.run(input));
            let result = tokio::select! {
                result = call => result,
                _ = cancelled(session.cancellation()) => return Attempt::Cancelled,
            };

            let error = match result {
                Ok(Ok(output)) => return Attempt::Completed(output),
                Ok(Err(e)) => {
                    warn!(
                        "Stage {} failed (attempt {}/{}): {}",
                        stage.name(),
                        attempt,
                        attempts,
                        e
                    );
                    e
                }
                Err(_) => {
                    warn!(
                        "Stage {} timed out after {:?} (attempt {}/{})",
                        stage.name(),
                        self.settings.stage_timeout,
                        attempt,
                        attempts
                    );
                    EngineError::StageTimeout {
                        stage: stage.name().to_string(),
                        timeout_secs: self.settings.stage_timeout.as_secs(),
                    }
                }
            };

            self.publish(Event::StageAttemptFailed {
                session_id: session.id(),
                stage: stage.name().to_string(),
                attempt,
                error: error.to_string(),
            })
            .await;
            last_error = Some(error);
        }

        Attempt::Exhausted(last_error.unwrap_or_else(|| EngineError::StageFailure {
            stage: stage.name().to_string(),
            reason: "no attempts were made".to_string(),
        }))
    }

    /// Output of a gathering stage, or its empty default once degraded
    async fn settle<T: Default>(&self, session: &mut Session, stage: &str, attempt: Attempt<T>) -> T {
        match attempt {
            Attempt::Completed(output) => output,
            Attempt::Exhausted(e) => {
                self.degrade(session, stage, &e).await;
                T::default()
            }
            Attempt::Cancelled => T::default(),
        }
    }

    async fn degrade(&self, session: &mut Session, stage: &str, error: &EngineError) {
        warn!(
            "Session {}: stage {} exhausted its retries, continuing without it: {}",
            session.id(),
            stage,
            error
        );
        session.state.warnings.push(PlanWarning::new(
            WarningKind::StageDegraded,
            format!("{} stage was unavailable; planned without its results", stage),
        ));
        self.publish(Event::StageDegraded {
            session_id: session.id(),
            stage: stage.to_string(),
        })
        .await;
    }

    fn checkpoint(session: &Session) -> Result<(), FailureReason> {
        if session.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }
        Ok(())
    }

    async fn transition(
        &self,
        session: &mut Session,
        next: SessionStage,
    ) -> Result<(), FailureReason> {
        let from = session.state.advance(next).map_err(|e| {
            error!("Session {}: {}", session.id(), e);
            FailureReason::StructuralInvariant(e.to_string())
        })?;
        info!("Session {}: {} -> {}", session.id(), from, next);
        self.publish(Event::StateChanged {
            session_id: session.id(),
            from,
            to: next,
        })
        .await;
        Ok(())
    }

    async fn conclude(
        &self,
        session: &mut Session,
        result: Result<Arc<TripPlan>, FailureReason>,
    ) -> TurnOutcome {
        match result {
            Ok(plan) => TurnOutcome::Compiled(plan),
            Err(reason) => self.fail(session, reason).await,
        }
    }

    /// Move the session to FAILED; no plan is exposed afterwards
    async fn fail(&self, session: &mut Session, reason: FailureReason) -> TurnOutcome {
        error!("Session {} failed: {}", session.id(), reason);
        if let Err(e) = session.state.advance(SessionStage::Failed) {
            error!("Session {}: {}", session.id(), e);
        }
        session.state.plan = None;
        session.state.failure = Some(reason.clone());
        self.publish(Event::SessionFailed {
            session_id: session.id(),
            reason: reason.clone(),
        })
        .await;
        TurnOutcome::Failed(reason)
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}

fn structural(error: EngineError) -> FailureReason {
    match error {
        EngineError::SessionFailure(reason) => reason,
        other => FailureReason::StructuralInvariant(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use sdk::stage::LogisticsReport;
    use sdk::types::{Candidate, GeoPoint};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixed(PreferenceOutcome);

    #[async_trait]
    impl Stage for Fixed {
        type Input = PreferenceRequest;
        type Output = PreferenceOutcome;

        fn name(&self) -> &str {
            "preferences"
        }

        async fn run(&self, _: &PreferenceRequest) -> Result<PreferenceOutcome, EngineError> {
            Ok(self.0.clone())
        }
    }

    /// Fails `failures` times, then returns nothing
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Stage for Flaky {
        type Input = ResearchRequest;
        type Output = Vec<Candidate>;

        fn name(&self) -> &str {
            "research"
        }

        async fn run(&self, _: &ResearchRequest) -> Result<Vec<Candidate>, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(EngineError::StageFailure {
                    stage: "research".to_string(),
                    reason: "flaky".to_string(),
                });
            }
            Ok(vec![])
        }
    }

    struct Empty;

    #[async_trait]
    impl Stage for Empty {
        type Input = LogisticsRequest;
        type Output = LogisticsReport;

        fn name(&self) -> &str {
            "logistics"
        }

        async fn run(&self, _: &LogisticsRequest) -> Result<LogisticsReport, EngineError> {
            Ok(LogisticsReport::default())
        }
    }

    struct Zero;

    #[async_trait]
    impl TravelTimeProvider for Zero {
        fn name(&self) -> &str {
            "zero"
        }

        async fn duration(&self, _: GeoPoint, _: GeoPoint) -> Result<chrono::Duration, EngineError> {
            Ok(chrono::Duration::zero())
        }
    }

    fn constraints() -> UserConstraints {
        UserConstraints {
            destination: "Ghent".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            excluded_categories: Default::default(),
            excluded_candidates: Default::default(),
            required: vec![],
            pace: Default::default(),
        }
    }

    fn orchestrator(research_failures: u32) -> (Orchestrator, Arc<Flaky>) {
        let research = Arc::new(Flaky {
            failures: research_failures,
            calls: AtomicU32::new(0),
        });
        let stages = Stages {
            preferences: Arc::new(Fixed(PreferenceOutcome::Constraints(constraints()))),
            research: research.clone(),
            logistics: Arc::new(Empty),
        };
        let orchestrator = Orchestrator::builder(stages, Arc::new(Zero))
            .with_settings(OrchestratorSettings {
                stage_timeout: Duration::from_millis(200),
                max_stage_retries: 2,
                max_reoptimizations: 1,
            })
            .build();
        (orchestrator, research)
    }

    #[tokio::test]
    async fn test_retry_recovers_within_bound() {
        let (orchestrator, research) = orchestrator(2);
        let mut session = orchestrator.start_session(None).await;

        let outcome = orchestrator.submit(&mut session, "go").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Compiled(_)));
        assert_eq!(research.calls.load(Ordering::SeqCst), 3);
        assert!(session.state().warnings().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_stage_degrades() {
        let (orchestrator, research) = orchestrator(10);
        let mut session = orchestrator.start_session(None).await;

        let outcome = orchestrator.submit(&mut session, "go").await.unwrap();
        let TurnOutcome::Compiled(plan) = outcome else {
            panic!("expected a compiled plan");
        };
        assert_eq!(research.calls.load(Ordering::SeqCst), 3);
        assert_eq!(plan.warnings()[0].kind, WarningKind::StageDegraded);
        assert_eq!(plan.days().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_compile_is_rejected() {
        let (orchestrator, _) = orchestrator(0);
        let mut session = orchestrator.start_session(None).await;
        orchestrator.submit(&mut session, "go").await.unwrap();

        let err = orchestrator.submit(&mut session, "again").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert!(session.state().plan().is_some());
    }

    #[tokio::test]
    async fn test_invalid_constraints_keep_collecting() {
        let (orchestrator, _) = orchestrator(0);
        let mut session = orchestrator.start_session(None).await;
        let mut bad = constraints();
        bad.day_end = bad.day_start;

        let err = orchestrator
            .submit_constraints(&mut session, bad)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(session.state().stage(), SessionStage::CollectingPreferences);
    }

    #[test]
    fn test_structural_mapping() {
        assert_eq!(
            structural(EngineError::SessionFailure(FailureReason::GatheringExhausted)),
            FailureReason::GatheringExhausted
        );
        assert!(matches!(
            structural(EngineError::Validation("x".into())),
            FailureReason::StructuralInvariant(_)
        ));
    }
}
