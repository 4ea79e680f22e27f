//! Day re-ranking strategies
//!
//! Every strategy is a stable sort: orders that compare equal keep their
//! current relative position.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{OptimizationWeights, ServiceOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    /// Shortest jobs first
    Duration,
    /// Highest service cost first
    Revenue,
    /// high > medium > low
    Priority,
    /// High priority or premium clients first, then by revenue
    Vip,
    /// Earliest preferred window first, orders without one last
    PreferredWindow,
    /// Weighted priority score plus normalized revenue
    Balanced,
}

impl OptimizationStrategy {
    pub const ALL: [OptimizationStrategy; 6] = [
        OptimizationStrategy::Duration,
        OptimizationStrategy::Revenue,
        OptimizationStrategy::Priority,
        OptimizationStrategy::Vip,
        OptimizationStrategy::PreferredWindow,
        OptimizationStrategy::Balanced,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OptimizationStrategy::Duration => "duration",
            OptimizationStrategy::Revenue => "revenue",
            OptimizationStrategy::Priority => "priority",
            OptimizationStrategy::Vip => "vip",
            OptimizationStrategy::PreferredWindow => "preferred_window",
            OptimizationStrategy::Balanced => "balanced",
        }
    }
}

impl FromStr for OptimizationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown strategy '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

impl std::fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return `orders` re-ranked by `strategy`.
pub fn rank(orders: &[ServiceOrder], strategy: OptimizationStrategy, weights: &OptimizationWeights) -> Vec<ServiceOrder> {
    let mut ranked = orders.to_vec();
    match strategy {
        OptimizationStrategy::Duration => {
            ranked.sort_by_key(|o| o.estimated_duration_minutes);
        }
        OptimizationStrategy::Revenue => {
            ranked.sort_by(by_revenue_desc);
        }
        OptimizationStrategy::Priority => {
            ranked.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank()));
        }
        OptimizationStrategy::Vip => {
            ranked.sort_by(|a, b| b.is_vip().cmp(&a.is_vip()).then_with(|| by_revenue_desc(a, b)));
        }
        OptimizationStrategy::PreferredWindow => {
            ranked.sort_by(|a, b| match (a.earliest_preferred_start(), b.earliest_preferred_start()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
        OptimizationStrategy::Balanced => {
            let max_revenue = orders.iter().map(|o| o.service_cost).fold(0.0_f64, f64::max);
            let score = |o: &ServiceOrder| {
                let revenue = if max_revenue > 0.0 { o.service_cost / max_revenue } else { 0.0 };
                weights.priority * o.priority.score() + weights.revenue * revenue
            };
            ranked.sort_by(|a, b| score(b).total_cmp(&score(a)));
        }
    }
    ranked
}

fn by_revenue_desc(a: &ServiceOrder, b: &ServiceOrder) -> Ordering {
    b.service_cost.total_cmp(&a.service_cost)
}
