//! Real-time schedule types

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Coordinates, OrderId, TechnicianId};

/// A computed schedule is ignored once older than this.
pub const SCHEDULE_STALE_AFTER_MINUTES: i64 = 10;

/// Identifies one (technician, day) recomputation unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleKey {
    pub technician_id: TechnicianId,
    pub date: NaiveDate,
}

impl ScheduleKey {
    pub fn new(technician_id: impl Into<TechnicianId>, date: NaiveDate) -> Self {
        Self {
            technician_id: technician_id.into(),
            date,
        }
    }
}

impl std::fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.technician_id, self.date)
    }
}

/// Which fallback tier supplied the start location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartLocationSource {
    Override,
    Preference,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleEventKind {
    Departure,
    Travel {
        from_order: Option<OrderId>,
        to_order: Option<OrderId>,
        distance_km: f64,
    },
    Visit {
        order_id: OrderId,
    },
    ArrivalHome,
}

/// One link of the departure→travel→visit→…→arrival chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    #[serde(flatten)]
    pub kind: ScheduleEventKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ScheduleEvent {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Timestamped chain of events for one technician-day
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeSchedule {
    pub key: ScheduleKey,
    pub start_location: Coordinates,
    pub start_source: StartLocationSource,
    pub events: Vec<ScheduleEvent>,
    pub total_travel_minutes: f64,
    pub total_distance_km: f64,
    pub total_service_minutes: u32,
    pub computed_at: DateTime<Utc>,
    pub plan_version: u64,
    /// Non-fatal issues found while walking the chain
    pub warnings: Vec<String>,
}

impl RealTimeSchedule {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.computed_at >= Duration::minutes(SCHEDULE_STALE_AFTER_MINUTES)
    }

    pub fn departure(&self) -> Option<NaiveDateTime> {
        self.events
            .iter()
            .find(|e| e.kind == ScheduleEventKind::Departure)
            .map(|e| e.start)
    }

    pub fn arrival_home(&self) -> Option<NaiveDateTime> {
        self.events
            .iter()
            .find(|e| e.kind == ScheduleEventKind::ArrivalHome)
            .map(|e| e.start)
    }

    /// Visit events in chain order as `(order_id, start, end)`.
    pub fn visits(&self) -> Vec<(&str, NaiveDateTime, NaiveDateTime)> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                ScheduleEventKind::Visit { order_id } => Some((order_id.as_str(), e.start, e.end)),
                _ => None,
            })
            .collect()
    }
}
