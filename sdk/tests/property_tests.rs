use chrono::{Duration, NaiveDate, NaiveTime};
use proptest::prelude::*;
use sdk::errors::{EngineError, FailureReason, WaypointErrorExt};
use sdk::types::{Candidate, CandidateId, Category, GeoPoint, TimeSlot, VisitDuration};

fn base() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 5, 1)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap())
}

fn candidate(priority: f64, duration: VisitDuration) -> Candidate {
    Candidate {
        id: CandidateId::new("sagrada-familia"),
        name: "Sagrada Familia".to_string(),
        category: Category::Attraction,
        location: GeoPoint::new(41.4036, 2.1744),
        windows: vec![],
        duration,
        priority,
        fixed_time: None,
        description: String::new(),
    }
}

proptest! {
    #[test]
    fn test_time_slot_requires_end_after_start(start in 0i64..10_000, length in -600i64..600) {
        let start = base() + Duration::minutes(start);
        let end = start + Duration::minutes(length);

        let slot = TimeSlot::new(start, end);
        prop_assert_eq!(slot.is_ok(), length > 0);
        if let Ok(slot) = slot {
            prop_assert_eq!(slot.minutes(), length);
        }
    }

    #[test]
    fn test_overlap_is_symmetric(
        a in 0i64..1_000, a_len in 1i64..300,
        b in 0i64..1_000, b_len in 1i64..300,
    ) {
        let first = TimeSlot::new(base() + Duration::minutes(a), base() + Duration::minutes(a + a_len)).unwrap();
        let second = TimeSlot::new(base() + Duration::minutes(b), base() + Duration::minutes(b + b_len)).unwrap();

        prop_assert_eq!(first.overlaps(&second), second.overlaps(&first));
        prop_assert!(first.overlaps(&first));
        // Touching slots do not overlap
        let next = TimeSlot::new(first.end, first.end + Duration::minutes(b_len)).unwrap();
        prop_assert!(!first.overlaps(&next));
    }

    #[test]
    fn test_candidate_priority_must_be_a_unit_fraction(priority in prop_oneof![
        -10.0f64..10.0,
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]) {
        let result = candidate(priority, VisitDuration::exactly(60)).validate();
        let valid = priority.is_finite() && (0.0..=1.0).contains(&priority);
        prop_assert_eq!(result.is_ok(), valid);
        if let Err(err) = result {
            let is_validation = matches!(err, EngineError::Validation(_));
            prop_assert!(is_validation);
        }
    }

    #[test]
    fn test_candidate_duration_must_be_ordered(min in 0u32..200, typical in 0u32..200, max in 0u32..200) {
        let result = candidate(0.5, VisitDuration::new(min, typical, max)).validate();
        prop_assert_eq!(result.is_ok(), min > 0 && min <= typical && typical <= max);
    }

    #[test]
    fn test_error_user_hints_are_present_and_safe(detail in "\\PC*") {
        let errors = vec![
            EngineError::Validation(detail.clone()),
            EngineError::StageTimeout { stage: detail.clone(), timeout_secs: 30 },
            EngineError::StageFailure { stage: "research".to_string(), reason: detail.clone() },
            EngineError::InfeasibleConstraint(detail.clone()),
            EngineError::SessionFailure(FailureReason::StructuralInvariant(detail.clone())),
            EngineError::SessionFailure(FailureReason::GatheringExhausted),
            EngineError::TravelLookup(detail.clone()),
            EngineError::Memory(detail.clone()),
            EngineError::Database(detail.clone()),
            EngineError::Config(detail.clone()),
            EngineError::Serialization(detail.clone()),
        ];

        for err in errors {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            // Hints are static text; raw detail never leaks into them
            if detail.len() > 12 {
                prop_assert!(!hint.contains(detail.as_str()));
            }
        }
    }
}

#[test]
fn test_terminal_failures_are_not_recoverable() {
    assert!(!EngineError::SessionFailure(FailureReason::GatheringExhausted).is_recoverable());
    assert!(!EngineError::Cancelled.is_recoverable());
    assert!(EngineError::Validation("bad dates".to_string()).is_recoverable());
    assert!(EngineError::StageTimeout {
        stage: "logistics".to_string(),
        timeout_secs: 30
    }
    .is_recoverable());
}
