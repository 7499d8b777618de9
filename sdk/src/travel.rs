//! Travel-time provider contract

use crate::errors::EngineError;
use crate::types::GeoPoint;
use async_trait::async_trait;
use chrono::Duration;

/// Point-to-point travel duration lookup
///
/// Must accept arbitrary coordinate pairs. Callers treat errors and slow
/// answers as "unknown" and fall back to a conservative buffer.
#[async_trait]
pub trait TravelTimeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn duration(&self, from: GeoPoint, to: GeoPoint) -> Result<Duration, EngineError>;
}
