//! Planning preferences

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::Coordinates;
use crate::defaults;

/// Weights of the balanced ranking strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationWeights {
    pub priority: f64,
    pub revenue: f64,
}

impl Default for OptimizationWeights {
    fn default() -> Self {
        Self {
            priority: 0.4,
            revenue: 0.6,
        }
    }
}

/// Dispatcher-configurable constraints and buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanningPreferences {
    pub max_daily_orders: usize,
    pub max_working_hours: f64,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    /// Buffer between consecutive visits
    pub inter_visit_buffer_minutes: u32,
    /// Allowance for leaving from and returning to the start location
    pub home_buffer_minutes: u32,
    /// Order count at which a day is reported as nearly full
    pub near_capacity_threshold: usize,
    /// Configured start location (second fallback tier)
    pub start_location: Option<Coordinates>,
    pub weights: OptimizationWeights,
}

impl Default for PlanningPreferences {
    fn default() -> Self {
        Self {
            max_daily_orders: 12,
            max_working_hours: 8.0,
            work_start: defaults::default_work_start(),
            work_end: defaults::default_work_end(),
            inter_visit_buffer_minutes: defaults::INTER_VISIT_BUFFER_MINUTES,
            home_buffer_minutes: defaults::HOME_BUFFER_MINUTES,
            near_capacity_threshold: 10,
            start_location: None,
            weights: OptimizationWeights::default(),
        }
    }
}
