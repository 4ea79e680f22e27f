//! Service order types

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Coordinates, RawCoordinates};

/// Identifier of an order as issued by the remote order store
pub type OrderId = String;

/// Identifier of a technician (serviceman)
pub type TechnicianId = String;

/// Order priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Ordinal used by ranking strategies (higher = more urgent).
    pub const fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    /// Priority mapped onto `[0, 1]` for weighted scoring.
    pub fn score(self) -> f64 {
        match self {
            Priority::High => 1.0,
            Priority::Medium => 0.5,
            Priority::Low => 0.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// Client tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    #[default]
    Standard,
    Premium,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    New,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Scheduled => "scheduled",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Half-open time interval `[start, end)` within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

/// Working copy of a repair order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrder {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: OrderId,
    pub client_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "deserialize_coordinates")]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub client_type: ClientType,
    #[serde(default = "default_duration")]
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub service_cost: f64,
    #[serde(default)]
    pub preferred_time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub unavailable_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub assigned_technician_id: Option<TechnicianId>,
    #[serde(default)]
    pub status: OrderStatus,
}

fn default_duration() -> u32 {
    crate::defaults::DEFAULT_SERVICE_DURATION_MINUTES
}

fn deserialize_coordinates<'de, D>(deserializer: D) -> Result<Option<Coordinates>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(RawCoordinates::from_value(&value))
}

/// Backend ids arrive as either JSON numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseId {
    Number(i64),
    Text(String),
}

impl From<LooseId> for String {
    fn from(id: LooseId) -> Self {
        match id {
            LooseId::Number(n) => n.to_string(),
            LooseId::Text(s) => s,
        }
    }
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    LooseId::deserialize(deserializer).map(String::from)
}

pub(crate) fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<LooseId>::deserialize(deserializer)?;
    Ok(id.map(String::from).filter(|s| !s.is_empty()))
}

impl ServiceOrder {
    /// An order counts as scheduled only when it has both a technician and a date.
    pub fn is_scheduled(&self) -> bool {
        self.assigned_technician_id.is_some() && self.scheduled_date.is_some()
    }

    /// Earliest preferred slot start, if the client gave any.
    pub fn earliest_preferred_start(&self) -> Option<NaiveTime> {
        self.preferred_time_slots.iter().map(|s| s.start).min()
    }

    pub fn is_unavailable_on(&self, date: NaiveDate) -> bool {
        self.unavailable_dates.contains(&date)
    }

    pub fn is_vip(&self) -> bool {
        self.priority == Priority::High || self.client_type == ClientType::Premium
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn scheduled_requires_technician_and_date() {
        let mut o = order("1");
        assert!(!o.is_scheduled());

        o.scheduled_date = NaiveDate::from_ymd_opt(2026, 10, 19);
        assert!(!o.is_scheduled(), "date alone is not enough");

        o.assigned_technician_id = Some("t1".into());
        assert!(o.is_scheduled());

        o.scheduled_date = None;
        assert!(!o.is_scheduled(), "technician alone is not enough");
    }

    #[test]
    fn labels_match_wire_names() {
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(json!(priority), json!(priority.as_str()));
        }
        for status in [
            OrderStatus::New,
            OrderStatus::Scheduled,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(json!(status), json!(status.as_str()));
        }
    }

    #[test]
    fn time_slot_overlap_is_half_open() {
        let a = TimeSlot::new(hm(9, 0), hm(11, 0));
        let b = TimeSlot::new(hm(10, 0), hm(12, 0));
        let c = TimeSlot::new(hm(11, 0), hm(12, 0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c), "touching intervals do not overlap");
    }

    #[test]
    fn deserializes_backend_order_with_legacy_coordinates() {
        let o: ServiceOrder = serde_json::from_value(json!({
            "id": "A-17",
            "clientName": "Kowalski",
            "address": "Marszałkowska 1, Warszawa",
            "coordinates": {"latitude": "52.2297", "longitude": "21.0122"},
            "priority": "high",
            "estimatedDurationMinutes": 90,
            "serviceCost": 250.0,
            "preferredTimeSlots": [{"start": "09:00:00", "end": "12:00:00"}],
            "unavailableDates": ["2026-10-21"]
        }))
        .unwrap();

        assert_eq!(o.coordinates, Some(Coordinates::new(52.2297, 21.0122)));
        assert_eq!(o.priority, Priority::High);
        assert_eq!(o.earliest_preferred_start(), Some(hm(9, 0)));
        assert!(o.is_unavailable_on(NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()));
        assert_eq!(o.status, OrderStatus::New);
    }

    #[test]
    fn missing_or_broken_coordinates_become_none() {
        let o: ServiceOrder = serde_json::from_value(json!({
            "id": "B", "clientName": "X", "coordinates": {"lat": null, "lng": null}
        }))
        .unwrap();
        assert!(o.coordinates.is_none());
        assert_eq!(o.estimated_duration_minutes, 60);
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let o: ServiceOrder = serde_json::from_value(json!({
            "id": 42, "clientName": "X", "assignedTechnicianId": 7
        }))
        .unwrap();
        assert_eq!(o.id, "42");
        assert_eq!(o.assigned_technician_id.as_deref(), Some("7"));
    }
}
