//! Travel-time provider abstraction
//!
//! Uses the planner backend's distance-matrix endpoint in production and a
//! Haversine heuristic for tests and offline runs.

mod backend;
mod resolver;

pub use backend::{BackendTravelProvider, BackendTravelConfig};
pub use resolver::TravelTimeResolver;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::services::geo;
use crate::types::Coordinates;

/// Distance and duration of one directed leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTime {
    pub duration_minutes: f64,
    pub distance_km: f64,
    /// Which backend produced the figures (e.g. "heuristic", "osrm")
    pub provider: String,
}

/// Longest leg accepted from a provider.
pub const MAX_LEG_MINUTES: f64 = 24.0 * 60.0;

impl TravelTime {
    pub fn zero(provider: impl Into<String>) -> Self {
        Self {
            duration_minutes: 0.0,
            distance_km: 0.0,
            provider: provider.into(),
        }
    }

    /// Reject figures no road leg can have: non-finite, negative, or a
    /// duration over [`MAX_LEG_MINUTES`].
    pub fn check(&self) -> Result<(), String> {
        let (minutes, km) = (self.duration_minutes, self.distance_km);
        if !minutes.is_finite() || !km.is_finite() || minutes < 0.0 || km < 0.0 || minutes > MAX_LEG_MINUTES {
            return Err(format!(
                "{} returned an implausible leg: {} min / {} km",
                self.provider, minutes, km
            ));
        }
        Ok(())
    }
}

/// Source of point-to-point travel estimates
#[async_trait]
pub trait TravelTimeProvider: Send + Sync {
    async fn travel_time(&self, origin: Coordinates, destination: Coordinates) -> Result<TravelTime>;

    /// Get service name for logging
    fn name(&self) -> &str;
}

/// Haversine × road coefficient at a fixed average speed
pub struct HeuristicTravelProvider {
    /// Coefficient for converting straight-line to road distance (default: 1.3)
    road_coefficient: f64,
    /// Average speed in km/h for time estimation (default: 40)
    average_speed_kmh: f64,
}

impl Default for HeuristicTravelProvider {
    fn default() -> Self {
        Self {
            road_coefficient: geo::ROAD_COEFFICIENT,
            average_speed_kmh: geo::AVERAGE_SPEED_KMH,
        }
    }
}

impl HeuristicTravelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(road_coefficient: f64, average_speed_kmh: f64) -> Self {
        Self {
            road_coefficient,
            average_speed_kmh,
        }
    }
}

#[async_trait]
impl TravelTimeProvider for HeuristicTravelProvider {
    async fn travel_time(&self, origin: Coordinates, destination: Coordinates) -> Result<TravelTime> {
        let road_km = geo::road_distance(&origin, &destination, self.road_coefficient);
        Ok(TravelTime {
            duration_minutes: geo::travel_minutes(road_km, self.average_speed_kmh),
            distance_km: road_km,
            provider: self.name().to_string(),
        })
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Pick the backend provider when a planner URL is configured.
pub fn create_travel_provider(backend: Option<BackendTravelConfig>) -> Box<dyn TravelTimeProvider> {
    match backend {
        Some(cfg) => Box::new(BackendTravelProvider::new(cfg)),
        None => Box::new(HeuristicTravelProvider::new()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use tokio::sync::Semaphore;

    use super::*;

    /// Heuristic provider that counts calls, can be gated and made to fail.
    #[derive(Default)]
    pub struct CountingProvider {
        inner: HeuristicTravelProvider,
        pub calls: AtomicU32,
        pub fail: std::sync::atomic::AtomicBool,
        gate: Option<Arc<Semaphore>>,
    }

    impl CountingProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call waits for one permit on `gate`.
        pub fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TravelTimeProvider for CountingProvider {
        async fn travel_time(&self, origin: Coordinates, destination: Coordinates) -> Result<TravelTime> {
            if let Some(gate) = &self.gate {
                gate.acquire().await?.forget();
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated provider outage");
            }
            self.inner.travel_time(origin, destination).await
        }

        fn name(&self) -> &str {
            "counting"
        }
    }
}
