//! Cache → governor → provider lookup path for one directed leg.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{TravelTime, TravelTimeProvider};
use crate::error::{PlannerError, PlannerResult};
use crate::services::cost_governor::{CostGovernor, LimitType, RequestKind};
use crate::services::travel_cache::{CacheKey, TravelTimeCache};
use crate::types::Coordinates;

pub struct TravelTimeResolver {
    provider: Arc<dyn TravelTimeProvider>,
    cache: Arc<TravelTimeCache>,
    governor: Arc<CostGovernor>,
    timeout: Duration,
}

impl TravelTimeResolver {
    pub fn new(
        provider: Arc<dyn TravelTimeProvider>,
        cache: Arc<TravelTimeCache>,
        governor: Arc<CostGovernor>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            governor,
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<TravelTimeCache> {
        &self.cache
    }

    pub fn governor(&self) -> &Arc<CostGovernor> {
        &self.governor
    }

    /// Travel estimate for `origin → destination`.
    ///
    /// Points that round to the same cache key cost nothing and skip the
    /// counters entirely. A cache hit is logged as `cache`; a miss must pass
    /// admission before the provider is called under `timeout`.
    pub async fn resolve(&self, origin: Coordinates, destination: Coordinates) -> PlannerResult<TravelTime> {
        let key = CacheKey::new(&origin, &destination);
        if key.is_same_point() {
            return Ok(TravelTime::zero("same-point"));
        }

        if let Some(hit) = self.cache.get(&origin, &destination) {
            self.governor.log_request(RequestKind::Cache);
            return Ok(hit);
        }

        let decision = self.governor.try_admit();
        if !decision.allowed {
            return Err(PlannerError::AdmissionRejected {
                limit: decision.limit_type.unwrap_or(LimitType::Rate),
                retry_after_secs: decision.retry_after_secs,
            });
        }

        let outcome = tokio::time::timeout(self.timeout, self.provider.travel_time(origin, destination)).await;
        match outcome {
            Ok(Ok(travel)) => match travel.check() {
                Ok(()) => {
                    debug!(
                        "{} via {}: {:.1} min / {:.1} km",
                        key,
                        self.provider.name(),
                        travel.duration_minutes,
                        travel.distance_km
                    );
                    self.cache.put(&origin, &destination, &travel);
                    Ok(travel)
                }
                Err(reason) => {
                    self.governor.log_request(RequestKind::Failed);
                    warn!("Travel-time lookup {} rejected: {}", key, reason);
                    Err(PlannerError::Provider(reason))
                }
            },
            Ok(Err(e)) => {
                self.governor.log_request(RequestKind::Failed);
                warn!("Travel-time lookup {} failed: {:#}", key, e);
                Err(PlannerError::Provider(format!("{:#}", e)))
            }
            Err(_) => {
                self.governor.log_request(RequestKind::Failed);
                warn!("Travel-time lookup {} timed out after {:?}", key, self.timeout);
                Err(PlannerError::Provider(format!(
                    "{} timed out after {}s",
                    self.provider.name(),
                    self.timeout.as_secs()
                )))
            }
        }
    }
}
