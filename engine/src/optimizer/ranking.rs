//! Ordering of optional candidates

use sdk::types::Candidate;
use std::cmp::Ordering;

/// Sort key: priority descending, typical duration ascending, diversity
/// penalty, then pool insertion order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RankKey {
    pub priority: f64,
    pub typical: u32,
    pub penalized: bool,
    pub position: usize,
}

impl RankKey {
    pub fn new(candidate: &Candidate, position: usize, penalized: bool) -> Self {
        Self {
            priority: candidate.priority,
            typical: candidate.duration.typical,
            penalized,
            position,
        }
    }

    pub fn compare(&self, other: &RankKey) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then(self.typical.cmp(&other.typical))
            .then(self.penalized.cmp(&other.penalized))
            .then(self.position.cmp(&other.position))
    }
}

/// Indices of `candidates` selected by `keep`, best first, ignoring diversity
pub(crate) fn ranked(candidates: &[Candidate], keep: impl Fn(usize) -> bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).filter(|&i| keep(i)).collect();
    order.sort_by(|&a, &b| {
        RankKey::new(&candidates[a], a, false).compare(&RankKey::new(&candidates[b], b, false))
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{CandidateId, Category, GeoPoint, VisitDuration};

    fn candidate(id: &str, priority: f64, typical: u32) -> Candidate {
        Candidate {
            id: CandidateId::new(id),
            name: id.to_string(),
            category: Category::Attraction,
            location: GeoPoint::new(0.0, 0.0),
            windows: vec![],
            duration: VisitDuration::new(typical, typical, typical),
            priority,
            fixed_time: None,
            description: String::new(),
        }
    }

    #[test]
    fn test_priority_then_duration_then_insertion() {
        let candidates = vec![
            candidate("slow", 0.8, 120),
            candidate("low", 0.3, 30),
            candidate("quick", 0.8, 45),
            candidate("quick-twin", 0.8, 45),
        ];
        let order = ranked(&candidates, |_| true);
        let ids: Vec<_> = order.iter().map(|&i| candidates[i].id.as_str()).collect();
        assert_eq!(ids, vec!["quick", "quick-twin", "slow", "low"]);
    }

    #[test]
    fn test_diversity_penalty_breaks_ties_only() {
        let a = candidate("a", 0.8, 60);
        let b = candidate("b", 0.8, 60);
        let penalized_first = RankKey::new(&a, 0, true);
        let fresh_second = RankKey::new(&b, 1, false);
        assert_eq!(penalized_first.compare(&fresh_second), Ordering::Greater);

        let higher = candidate("c", 0.9, 60);
        let penalized_higher = RankKey::new(&higher, 2, true);
        assert_eq!(penalized_higher.compare(&fresh_second), Ordering::Less);
    }
}
