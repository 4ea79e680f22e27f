//! Admission control in front of the paid travel-time provider.
//!
//! `CostGovernor` enforces three ordered gates before any provider call:
//! daily budget, daily request count and a sliding 60 s rate window. It also
//! keeps the daily counters (reset at local midnight) and raises one-shot
//! threshold alerts with a cooldown.
//!
//! One instance is constructed at start-up and shared via `Arc<CostGovernor>`;
//! all state sits behind a single mutex so concurrent callers see consistent
//! counters.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::clock::Clock;

const RATE_WINDOW_SECS: i64 = 60;
const ALERT_THRESHOLDS_PCT: [u8; 2] = [80, 90];
const ALERT_COOLDOWN_HOURS: i64 = 1;
/// Absorbs float error in `requests × price` so exact multiples hit the limit.
const BUDGET_EPSILON: f64 = 1e-9;

/// Which gate rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Budget,
    Requests,
    Rate,
}

impl LimitType {
    pub const fn as_str(self) -> &'static str {
        match self {
            LimitType::Budget => "budget",
            LimitType::Requests => "requests",
            LimitType::Rate => "rate",
        }
    }
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// A paid provider call was made
    Api,
    /// Served from cache, no cost
    Cache,
    /// Provider call failed or timed out
    Failed,
}

/// Configured ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLimits {
    pub daily_budget_limit: f64,
    pub price_per_request: f64,
    pub daily_request_limit: u64,
    pub per_minute_limit: usize,
}

impl Default for CostLimits {
    fn default() -> Self {
        Self {
            daily_budget_limit: 100.0,
            price_per_request: 0.005,
            daily_request_limit: 20_000,
            per_minute_limit: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub limit_type: Option<LimitType>,
    /// Seconds until the rate window frees a slot
    pub retry_after_secs: Option<u64>,
    pub reason: Option<String>,
}

impl AdmissionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            limit_type: None,
            retry_after_secs: None,
            reason: None,
        }
    }

    fn reject(limit: LimitType, retry_after_secs: Option<u64>, reason: String) -> Self {
        Self {
            allowed: false,
            limit_type: Some(limit),
            retry_after_secs,
            reason: Some(reason),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostStats {
    pub date: NaiveDate,
    pub requests_today: u64,
    pub cache_hits_today: u64,
    pub failures_today: u64,
    pub estimated_cost: f64,
    pub budget_used_pct: f64,
    pub requests_used_pct: f64,
    pub cache_hit_rate_pct: f64,
    pub requests_last_minute: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Budget,
    Requests,
}

/// Threshold crossing, delivered to the alert egress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostAlert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub threshold_pct: u8,
    pub usage_pct: f64,
    pub stats: CostStats,
    pub fired_at: DateTime<Utc>,
}

impl CostAlert {
    /// Stable id of the threshold, used for cooldown bookkeeping.
    pub fn threshold_id(&self) -> String {
        threshold_id(self.alert_type, self.threshold_pct)
    }
}

fn threshold_id(alert_type: AlertType, pct: u8) -> String {
    let kind = match alert_type {
        AlertType::Budget => "budget",
        AlertType::Requests => "requests",
    };
    format!("{}_{}", kind, pct)
}

#[derive(Debug)]
struct GovernorState {
    date: NaiveDate,
    requests_today: u64,
    cache_hits_today: u64,
    failures_today: u64,
    window: VecDeque<DateTime<Utc>>,
    alerts_fired: HashMap<String, DateTime<Utc>>,
}

pub struct CostGovernor {
    clock: Arc<dyn Clock>,
    limits: CostLimits,
    state: Mutex<GovernorState>,
    alerts_tx: Option<UnboundedSender<CostAlert>>,
}

impl CostGovernor {
    pub fn new(limits: CostLimits, clock: Arc<dyn Clock>) -> Self {
        let today = clock.today();
        Self {
            clock,
            limits,
            state: Mutex::new(GovernorState {
                date: today,
                requests_today: 0,
                cache_hits_today: 0,
                failures_today: 0,
                window: VecDeque::new(),
                alerts_fired: HashMap::new(),
            }),
            alerts_tx: None,
        }
    }

    /// Forward fired alerts to a dispatcher task.
    pub fn with_alert_channel(mut self, tx: UnboundedSender<CostAlert>) -> Self {
        self.alerts_tx = Some(tx);
        self
    }

    pub fn limits(&self) -> &CostLimits {
        &self.limits
    }

    /// Check the three gates without recording anything.
    pub fn can_make_request(&self) -> AdmissionDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        self.evaluate(&mut state, now)
    }

    /// Record the outcome of a lookup. Returns alerts fired by this call.
    pub fn log_request(&self, kind: RequestKind) -> Vec<CostAlert> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        self.record(&mut state, kind, now)
    }

    /// Atomic check-and-record of one paid call, for concurrent callers.
    pub fn try_admit(&self) -> AdmissionDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        let decision = self.evaluate(&mut state, now);
        if decision.allowed {
            self.record(&mut state, RequestKind::Api, now);
        } else {
            warn!(
                limit = %decision.limit_type.map(LimitType::as_str).unwrap_or("?"),
                "Travel-time request rejected: {}",
                decision.reason.as_deref().unwrap_or_default()
            );
        }
        decision
    }

    pub fn stats(&self) -> CostStats {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        prune_window(&mut state.window, now);
        self.snapshot(&state)
    }

    fn evaluate(&self, state: &mut GovernorState, now: DateTime<Utc>) -> AdmissionDecision {
        let spent = state.requests_today as f64 * self.limits.price_per_request;
        if spent + BUDGET_EPSILON >= self.limits.daily_budget_limit {
            return AdmissionDecision::reject(
                LimitType::Budget,
                None,
                format!(
                    "daily budget exhausted (${:.2} of ${:.2})",
                    spent, self.limits.daily_budget_limit
                ),
            );
        }

        if state.requests_today >= self.limits.daily_request_limit {
            return AdmissionDecision::reject(
                LimitType::Requests,
                None,
                format!(
                    "daily request limit reached ({} of {})",
                    state.requests_today, self.limits.daily_request_limit
                ),
            );
        }

        prune_window(&mut state.window, now);
        if state.window.len() >= self.limits.per_minute_limit {
            let oldest_age = state
                .window
                .front()
                .map(|t| (now - *t).num_seconds())
                .unwrap_or(0);
            let retry_after = (RATE_WINDOW_SECS - oldest_age).max(0) as u64;
            return AdmissionDecision::reject(
                LimitType::Rate,
                Some(retry_after),
                format!(
                    "rate limit of {}/min reached, retry in {}s",
                    self.limits.per_minute_limit, retry_after
                ),
            );
        }

        AdmissionDecision::allow()
    }

    fn record(&self, state: &mut GovernorState, kind: RequestKind, now: DateTime<Utc>) -> Vec<CostAlert> {
        match kind {
            RequestKind::Api => {
                state.requests_today += 1;
                state.window.push_back(now);
                self.check_thresholds(state, now)
            }
            RequestKind::Cache => {
                state.cache_hits_today += 1;
                Vec::new()
            }
            RequestKind::Failed => {
                state.failures_today += 1;
                Vec::new()
            }
        }
    }

    fn check_thresholds(&self, state: &mut GovernorState, now: DateTime<Utc>) -> Vec<CostAlert> {
        let usage = [
            (AlertType::Budget, self.budget_used_pct(state)),
            (AlertType::Requests, self.requests_used_pct(state)),
        ];

        let mut fired = Vec::new();
        for (alert_type, usage_pct) in usage {
            for pct in ALERT_THRESHOLDS_PCT {
                if usage_pct < f64::from(pct) {
                    continue;
                }
                let id = threshold_id(alert_type, pct);
                let cooling = state
                    .alerts_fired
                    .get(&id)
                    .is_some_and(|last| now - *last < Duration::hours(ALERT_COOLDOWN_HOURS));
                if cooling {
                    continue;
                }
                state.alerts_fired.insert(id, now);
                fired.push(CostAlert {
                    id: Uuid::new_v4(),
                    alert_type,
                    threshold_pct: pct,
                    usage_pct,
                    stats: self.snapshot(state),
                    fired_at: now,
                });
            }
        }

        for alert in &fired {
            warn!(
                "Cost alert {}: {:.1}% used (threshold {}%)",
                alert.threshold_id(),
                alert.usage_pct,
                alert.threshold_pct
            );
            if let Some(tx) = &self.alerts_tx {
                if tx.send(alert.clone()).is_err() {
                    debug!("Alert channel closed, dropping {}", alert.threshold_id());
                }
            }
        }
        fired
    }

    fn roll_over(&self, state: &mut GovernorState) {
        let today = self.clock.today();
        if state.date != today {
            info!(
                "Cost counters reset for {} (yesterday: {} requests, {} cache hits, {} failures)",
                today, state.requests_today, state.cache_hits_today, state.failures_today
            );
            state.date = today;
            state.requests_today = 0;
            state.cache_hits_today = 0;
            state.failures_today = 0;
        }
    }

    fn budget_used_pct(&self, state: &GovernorState) -> f64 {
        if self.limits.daily_budget_limit <= 0.0 {
            return 100.0;
        }
        state.requests_today as f64 * self.limits.price_per_request / self.limits.daily_budget_limit * 100.0
    }

    fn requests_used_pct(&self, state: &GovernorState) -> f64 {
        if self.limits.daily_request_limit == 0 {
            return 100.0;
        }
        state.requests_today as f64 / self.limits.daily_request_limit as f64 * 100.0
    }

    fn snapshot(&self, state: &GovernorState) -> CostStats {
        let lookups = state.requests_today + state.cache_hits_today;
        CostStats {
            date: state.date,
            requests_today: state.requests_today,
            cache_hits_today: state.cache_hits_today,
            failures_today: state.failures_today,
            estimated_cost: state.requests_today as f64 * self.limits.price_per_request,
            budget_used_pct: self.budget_used_pct(state),
            requests_used_pct: self.requests_used_pct(state),
            cache_hit_rate_pct: if lookups == 0 {
                0.0
            } else {
                state.cache_hits_today as f64 / lookups as f64 * 100.0
            },
            requests_last_minute: state.window.len(),
        }
    }
}

fn prune_window(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let horizon = Duration::seconds(RATE_WINDOW_SECS);
    while window.front().is_some_and(|t| now - *t >= horizon) {
        window.pop_front();
    }
}

// =============================================================================
// Tests
// =============================================================================
