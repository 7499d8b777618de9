//! Travel times
//!
//! The provider lookup is the only suspending step after gathering, so the
//! orchestrator resolves every pair up front into a [`TravelMatrix`]. The
//! optimizer and resolver then read that snapshot synchronously.

use async_trait::async_trait;
use chrono::Duration;
use futures::stream::{self, StreamExt};
use sdk::errors::EngineError;
use sdk::travel::TravelTimeProvider;
use sdk::types::{Candidate, CandidateId, GeoPoint};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Synchronous travel-time lookup between two candidates
pub trait TravelTimes {
    fn between(&self, from: &Candidate, to: &Candidate) -> Duration;
}

/// Walking estimate from great-circle distance
pub struct HaversineWalkingProvider {
    walking_speed_kmh: f64,
    detour_factor: f64,
}

impl HaversineWalkingProvider {
    pub fn new(walking_speed_kmh: f64, detour_factor: f64) -> Self {
        Self {
            walking_speed_kmh,
            detour_factor,
        }
    }
}

impl Default for HaversineWalkingProvider {
    fn default() -> Self {
        Self::new(4.8, 1.3)
    }
}

#[async_trait]
impl TravelTimeProvider for HaversineWalkingProvider {
    fn name(&self) -> &str {
        "haversine-walking"
    }

    async fn duration(&self, from: GeoPoint, to: GeoPoint) -> Result<Duration, EngineError> {
        if !from.is_finite() || !to.is_finite() {
            return Err(EngineError::TravelLookup(
                "coordinates must be finite".to_string(),
            ));
        }
        let meters = from.distance_meters(&to) * self.detour_factor;
        let meters_per_minute = self.walking_speed_kmh * 1000.0 / 60.0;
        let minutes = (meters / meters_per_minute).ceil() as i64;
        Ok(Duration::minutes(minutes))
    }
}

/// Knobs for building a matrix
#[derive(Debug, Clone)]
pub struct TravelSettings {
    /// Used when a lookup fails or times out
    pub default_buffer: Duration,
    pub call_timeout: std::time::Duration,
    pub max_concurrent_lookups: usize,
}

impl Default for TravelSettings {
    fn default() -> Self {
        Self {
            default_buffer: Duration::minutes(20),
            call_timeout: std::time::Duration::from_secs(5),
            max_concurrent_lookups: 8,
        }
    }
}

/// Immutable snapshot of pairwise travel minutes
#[derive(Debug, Clone, PartialEq)]
pub struct TravelMatrix {
    minutes: HashMap<(CandidateId, CandidateId), i64>,
    default_minutes: i64,
}

/// A built matrix and how many pairs fell back to the default buffer
#[derive(Debug, Clone)]
pub struct MatrixBuild {
    pub matrix: TravelMatrix,
    pub fallbacks: usize,
}

impl TravelMatrix {
    /// Every pair costs `minutes`
    pub fn uniform(minutes: i64) -> Self {
        Self {
            minutes: HashMap::new(),
            default_minutes: minutes,
        }
    }

    pub fn insert(&mut self, from: CandidateId, to: CandidateId, minutes: i64) {
        self.minutes.insert((from, to), minutes);
    }

    /// Look up every ordered pair of `candidates` through `provider`.
    pub async fn build(
        provider: &dyn TravelTimeProvider,
        candidates: &[Candidate],
        settings: &TravelSettings,
    ) -> MatrixBuild {
        let default_minutes = settings.default_buffer.num_minutes();
        let pairs: Vec<(&Candidate, &Candidate)> = candidates
            .iter()
            .flat_map(|a| {
                candidates
                    .iter()
                    .filter(move |b| b.id != a.id)
                    .map(move |b| (a, b))
            })
            .collect();

        debug!(
            "Resolving {} travel legs via {}",
            pairs.len(),
            provider.name()
        );

        let lookups: Vec<((CandidateId, CandidateId), Option<i64>)> = stream::iter(pairs)
            .map(|(a, b)| async move {
                let lookup =
                    tokio::time::timeout(settings.call_timeout, provider.duration(a.location, b.location))
                        .await;
                let minutes = match lookup {
                    Ok(Ok(d)) if d >= Duration::zero() => Some((d.num_seconds() + 59) / 60),
                    Ok(Ok(d)) => {
                        debug!("Negative travel time {} for {} -> {}", d, a.id, b.id);
                        None
                    }
                    Ok(Err(e)) => {
                        debug!("Travel lookup {} -> {} failed: {}", a.id, b.id, e);
                        None
                    }
                    Err(_) => {
                        debug!("Travel lookup {} -> {} timed out", a.id, b.id);
                        None
                    }
                };
                ((a.id.clone(), b.id.clone()), minutes)
            })
            .buffer_unordered(settings.max_concurrent_lookups.max(1))
            .collect()
            .await;

        let mut matrix = Self::uniform(default_minutes);
        let mut fallbacks = 0;
        for ((from, to), minutes) in lookups {
            match minutes {
                Some(m) => matrix.insert(from, to, m),
                None => fallbacks += 1,
            }
        }

        if fallbacks > 0 {
            warn!(
                "{} travel lookups failed; using {} minute buffer for those legs",
                fallbacks, default_minutes
            );
        }

        MatrixBuild { matrix, fallbacks }
    }
}

impl TravelTimes for TravelMatrix {
    fn between(&self, from: &Candidate, to: &Candidate) -> Duration {
        if from.id == to.id {
            return Duration::zero();
        }
        let minutes = self
            .minutes
            .get(&(from.id.clone(), to.id.clone()))
            .copied()
            .unwrap_or(self.default_minutes);
        Duration::minutes(minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{Category, VisitDuration};

    fn at(id: &str, lat: f64, lon: f64) -> Candidate {
        Candidate {
            id: CandidateId::new(id),
            name: id.to_string(),
            category: Category::Attraction,
            location: GeoPoint::new(lat, lon),
            windows: vec![],
            duration: VisitDuration::exactly(60),
            priority: 0.5,
            fixed_time: None,
            description: String::new(),
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TravelTimeProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn duration(&self, _: GeoPoint, _: GeoPoint) -> Result<Duration, EngineError> {
            Err(EngineError::TravelLookup("service unavailable".to_string()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl TravelTimeProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn duration(&self, _: GeoPoint, _: GeoPoint) -> Result<Duration, EngineError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(Duration::minutes(1))
        }
    }

    #[tokio::test]
    async fn test_haversine_walking_estimate() {
        let provider = HaversineWalkingProvider::new(6.0, 1.0);
        // roughly 1.1 km north
        let d = provider
            .duration(GeoPoint::new(38.70, -9.14), GeoPoint::new(38.71, -9.14))
            .await
            .unwrap();
        assert_eq!(d.num_minutes(), 12);

        let same = provider
            .duration(GeoPoint::new(38.70, -9.14), GeoPoint::new(38.70, -9.14))
            .await
            .unwrap();
        assert_eq!(same, Duration::zero());
    }

    #[tokio::test]
    async fn test_matrix_build_uses_provider() {
        let candidates = vec![at("a", 38.70, -9.14), at("b", 38.71, -9.14)];
        let provider = HaversineWalkingProvider::new(6.0, 1.0);
        let build = TravelMatrix::build(&provider, &candidates, &TravelSettings::default()).await;

        assert_eq!(build.fallbacks, 0);
        assert_eq!(
            build.matrix.between(&candidates[0], &candidates[1]).num_minutes(),
            12
        );
        assert_eq!(
            build.matrix.between(&candidates[0], &candidates[0]),
            Duration::zero()
        );
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_default_buffer() {
        let candidates = vec![at("a", 38.70, -9.14), at("b", 38.71, -9.14)];
        let build =
            TravelMatrix::build(&FailingProvider, &candidates, &TravelSettings::default()).await;

        assert_eq!(build.fallbacks, 2);
        assert_eq!(
            build.matrix.between(&candidates[1], &candidates[0]).num_minutes(),
            20
        );
    }

    #[tokio::test]
    async fn test_timeouts_fall_back_to_default_buffer() {
        let candidates = vec![at("a", 38.70, -9.14), at("b", 38.71, -9.14)];
        let settings = TravelSettings {
            default_buffer: Duration::minutes(15),
            call_timeout: std::time::Duration::from_millis(20),
            max_concurrent_lookups: 4,
        };
        let build = TravelMatrix::build(&SlowProvider, &candidates, &settings).await;

        assert_eq!(build.fallbacks, 2);
        assert_eq!(
            build.matrix.between(&candidates[0], &candidates[1]).num_minutes(),
            15
        );
    }
}
