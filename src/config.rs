//! Configuration management

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{self, Context, Result};

use crate::defaults;
use crate::services::cost_governor::CostLimits;

/// Where cost alerts go
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTarget {
    /// Only logged
    Log,
    /// Delivered by email through the Resend API
    Email { to: String, from: String, api_key: String },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Planner REST API base URL (orders, save-plan, calendar, distance matrix)
    pub backend_url: String,

    /// Per-call travel-time provider timeout
    pub provider_timeout_secs: u64,

    /// Quiet period before a technician-day is recomputed
    pub debounce_ms: u64,

    pub cost_limits: CostLimits,

    /// Durable travel-cache snapshot (optional)
    pub travel_cache_path: Option<PathBuf>,

    pub alert_target: AlertTarget,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let backend_url = std::env::var("PLANNER_BACKEND_URL")
            .context("PLANNER_BACKEND_URL must be set")?;

        let provider_timeout_secs = parse_var("PROVIDER_TIMEOUT_SECS", defaults::DEFAULT_PROVIDER_TIMEOUT_SECS)?;
        let debounce_ms = parse_var("SCHEDULE_DEBOUNCE_MS", defaults::DEFAULT_DEBOUNCE_MS)?;

        let fallback = CostLimits::default();
        let cost_limits = CostLimits {
            daily_budget_limit: parse_var("COST_DAILY_BUDGET", fallback.daily_budget_limit)?,
            price_per_request: parse_var("COST_PRICE_PER_REQUEST", fallback.price_per_request)?,
            daily_request_limit: parse_var("COST_DAILY_REQUEST_LIMIT", fallback.daily_request_limit)?,
            per_minute_limit: parse_var("COST_PER_MINUTE_LIMIT", fallback.per_minute_limit)?,
        };

        if cost_limits.per_minute_limit == 0 {
            anyhow::bail!("COST_PER_MINUTE_LIMIT must be at least 1");
        }

        let travel_cache_path = std::env::var("TRAVEL_CACHE_PATH").ok().map(PathBuf::from);

        let alert_target = match (std::env::var("COST_ALERT_EMAIL"), std::env::var("RESEND_API_KEY")) {
            (Ok(to), Ok(api_key)) if !to.is_empty() && !api_key.is_empty() => {
                let from = std::env::var("EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| "noreply@dispatch.local".to_string());
                AlertTarget::Email { to, from, api_key }
            }
            (Ok(_), _) => {
                tracing::warn!("COST_ALERT_EMAIL set without RESEND_API_KEY, cost alerts will only be logged");
                AlertTarget::Log
            }
            _ => AlertTarget::Log,
        };

        Ok(Self {
            backend_url,
            provider_timeout_secs,
            debounce_ms,
            cost_limits,
            travel_cache_path,
            alert_target,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_defaults_when_only_backend_set() {
        std::env::set_var("PLANNER_BACKEND_URL", "http://localhost:8080/api");
        std::env::remove_var("PROVIDER_TIMEOUT_SECS");
        std::env::remove_var("SCHEDULE_DEBOUNCE_MS");
        std::env::remove_var("TRAVEL_CACHE_PATH");
        std::env::remove_var("COST_ALERT_EMAIL");

        let config = Config::from_env().unwrap();
        assert_eq!(config.provider_timeout_secs, 10);
        assert_eq!(config.debounce_ms, 1500);
        assert_eq!(config.cost_limits.per_minute_limit, 60);
        assert!(config.travel_cache_path.is_none());
        assert_eq!(config.alert_target, AlertTarget::Log);
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        std::env::remove_var("DISPATCH_TEST_UNSET_VAR");
        let value: u64 = parse_var("DISPATCH_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_reads_value() {
        std::env::set_var("DISPATCH_TEST_BUDGET", " 250.5 ");
        let value: f64 = parse_var("DISPATCH_TEST_BUDGET", 100.0).unwrap();
        assert_eq!(value, 250.5);

        // Cleanup
        std::env::remove_var("DISPATCH_TEST_BUDGET");
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        std::env::set_var("DISPATCH_TEST_LIMIT", "sixty");
        let err = parse_var::<usize>("DISPATCH_TEST_LIMIT", 60).unwrap_err();
        assert!(err.to_string().contains("DISPATCH_TEST_LIMIT"));

        // Cleanup
        std::env::remove_var("DISPATCH_TEST_LIMIT");
    }
}
