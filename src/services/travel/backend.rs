//! Planner backend distance-matrix client
//!
//! `POST /distance-matrix/calculate` hides the actual routing engine
//! (heuristic, OSRM or a paid API) behind one endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{TravelTime, TravelTimeProvider};
use crate::types::{Coordinates, DistanceRequest, DistanceResponse};

/// Backend distance client configuration
#[derive(Debug, Clone)]
pub struct BackendTravelConfig {
    /// Base URL of the planner API (e.g., "http://localhost:8080/api")
    pub base_url: String,
    /// Transport-level timeout; the resolver enforces its own, shorter one.
    pub timeout_seconds: u64,
}

impl BackendTravelConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_seconds: 30,
        }
    }
}

pub struct BackendTravelProvider {
    client: Client,
    config: BackendTravelConfig,
}

impl BackendTravelProvider {
    pub fn new(config: BackendTravelConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();

        Self { client, config }
    }
}

#[async_trait]
impl TravelTimeProvider for BackendTravelProvider {
    async fn travel_time(&self, origin: Coordinates, destination: Coordinates) -> Result<TravelTime> {
        let url = format!("{}/distance-matrix/calculate", self.config.base_url.trim_end_matches('/'));
        let request = DistanceRequest { origin, destination };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send distance request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Distance endpoint returned error {}: {}", status, body);
        }

        let parsed: DistanceResponse = response
            .json()
            .await
            .context("Failed to parse distance response")?;

        let result = match (parsed.success, parsed.result) {
            (true, Some(result)) => result,
            (_, _) => anyhow::bail!(
                "Distance calculation unsuccessful: {}",
                parsed.error.unwrap_or_else(|| "no result".to_string())
            ),
        };

        debug!(
            "Distance {:.4},{:.4} -> {:.4},{:.4}: {:.1} km / {:.1} min via {:?}",
            origin.lat, origin.lng, destination.lat, destination.lng,
            result.distance.km, result.duration.minutes, result.provider
        );

        Ok(TravelTime {
            duration_minutes: result.duration.minutes,
            distance_km: result.distance.km,
            provider: result.provider.unwrap_or_else(|| self.name().to_string()),
        })
    }

    fn name(&self) -> &str {
        "backend"
    }
}
