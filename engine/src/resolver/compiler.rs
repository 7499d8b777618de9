//! Final plan assembly

use super::{ConflictResolver, Displacement};
use crate::optimizer::DraftPlan;
use crate::pool::CandidatePool;
use crate::travel::TravelTimes;
use sdk::errors::{EngineError, FailureReason};
use sdk::types::{
    DropReason, DroppedCandidate, PlanWarning, TripPlan, UserConstraints, WarningKind,
};
use std::sync::Arc;
use tracing::info;

pub struct Compiler;

impl Compiler {
    /// Assemble the immutable trip plan.
    ///
    /// `unresolved` visits are moved to the dropped list. Stage warnings come
    /// first, then the optimizer's. The result is re-validated and any
    /// remaining violation is a structural failure.
    pub fn compile(
        constraints: &UserConstraints,
        draft: DraftPlan,
        unresolved: Vec<Displacement>,
        stage_warnings: Vec<PlanWarning>,
        pool: &CandidatePool,
        travel: &dyn TravelTimes,
    ) -> Result<Arc<TripPlan>, EngineError> {
        let expected: Vec<_> = constraints.dates().collect();
        let actual: Vec<_> = draft.days.iter().map(|d| d.date).collect();
        if expected != actual {
            return Err(EngineError::SessionFailure(
                FailureReason::StructuralInvariant(format!(
                    "plan covers {} days, trip has {}",
                    actual.len(),
                    expected.len()
                )),
            ));
        }

        if let Some(violation) = ConflictResolver::validate(&draft, pool, travel).first() {
            return Err(EngineError::SessionFailure(
                FailureReason::StructuralInvariant(violation.to_string()),
            ));
        }

        let DraftPlan {
            days,
            mut dropped,
            warnings,
        } = draft;

        let mut all_warnings = stage_warnings;
        all_warnings.extend(warnings);

        for displaced in unresolved {
            let visit = displaced.visit;
            let reason = if displaced.required {
                DropReason::NoFittingWindow
            } else {
                DropReason::CapacityExhausted
            };
            all_warnings.push(PlanWarning::new(
                WarningKind::UnresolvedConflict,
                format!(
                    "'{}' on {} conflicted with another visit and was removed",
                    visit.name, visit.date
                ),
            ));
            if !dropped.iter().any(|d| d.candidate_id == visit.candidate_id) {
                dropped.push(DroppedCandidate {
                    candidate_id: visit.candidate_id,
                    name: visit.name,
                    reason,
                });
            }
        }

        let plan = TripPlan::new(constraints, days, dropped, all_warnings);
        info!(
            "Compiled plan for {}: {} days, {} visits, {} dropped, {} warnings",
            plan.destination(),
            plan.days().len(),
            plan.visits().count(),
            plan.dropped().len(),
            plan.warnings().len()
        );
        Ok(Arc::new(plan))
    }
}
