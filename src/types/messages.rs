//! Planner backend wire types

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::order::deserialize_id;
use super::{CalendarSlot, Coordinates, OrderStatus, RawCoordinates, ServiceOrder, TechnicianId};

/// Body of `PATCH /orders/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub assigned_to: Option<TechnicianId>,
    pub estimated_duration: u32,
    pub status: OrderStatus,
}

impl OrderPatch {
    pub fn from_order(order: &ServiceOrder) -> Self {
        Self {
            scheduled_date: order.scheduled_date,
            scheduled_time: order.scheduled_time,
            assigned_to: order.assigned_technician_id.clone(),
            estimated_duration: order.estimated_duration_minutes,
            status: order.status,
        }
    }
}

/// Body of `POST /intelligent-planner/save-plan`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePlanRequest {
    pub serviceman_id: TechnicianId,
    pub serviceman_name: Option<String>,
    /// Keyed by lowercase English weekday name
    pub weekly_plan: BTreeMap<String, Vec<ServiceOrder>>,
    pub week_start: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SavePlanResponse {
    pub success: bool,
    pub created: u32,
    pub updated: u32,
    pub message: Option<String>,
}

/// Body of `POST /distance-matrix/calculate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceRequest {
    pub origin: Coordinates,
    pub destination: Coordinates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistanceResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<DistanceResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistanceResult {
    pub distance: DistanceKm,
    pub duration: DurationMinutes,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistanceKm {
    pub km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurationMinutes {
    pub minutes: f64,
}

/// Technician as listed by `get-data`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Serviceman {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: TechnicianId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_location: Option<RawCoordinates>,
}

impl Serviceman {
    pub fn start_coordinates(&self) -> Option<Coordinates> {
        self.start_location.as_ref().and_then(RawCoordinates::normalize)
    }
}

/// Response of `GET /intelligent-planner/get-data`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlannerData {
    pub orders: Vec<ServiceOrder>,
    pub servicemen: Vec<Serviceman>,
    /// Passed through untouched; visits are not modelled by the core.
    pub visits: Vec<serde_json::Value>,
}

/// One employee entry of `GET /employee-calendar?action=get-all-schedules`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSchedule {
    #[serde(deserialize_with = "deserialize_id")]
    pub employee_id: TechnicianId,
    #[serde(default)]
    pub slots: Vec<CalendarSlot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmployeeCalendarResponse {
    pub success: bool,
    pub schedules: Vec<EmployeeSchedule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_patch_serializes_with_backend_field_names() {
        let patch = OrderPatch {
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 20),
            scheduled_time: None,
            assigned_to: Some("7".into()),
            estimated_duration: 90,
            status: OrderStatus::Scheduled,
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({
                "scheduledDate": "2026-10-20",
                "scheduledTime": null,
                "assignedTo": "7",
                "estimatedDuration": 90,
                "status": "scheduled"
            })
        );
    }

    #[test]
    fn distance_response_parses() {
        let resp: DistanceResponse = serde_json::from_value(json!({
            "success": true,
            "result": {"distance": {"km": 12.4}, "duration": {"minutes": 21.0}, "provider": "osrm"}
        }))
        .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result.distance.km, 12.4);
        assert_eq!(result.duration.minutes, 21.0);
        assert_eq!(result.provider.as_deref(), Some("osrm"));
    }

    #[test]
    fn planner_data_tolerates_missing_sections() {
        let data: PlannerData = serde_json::from_value(json!({
            "servicemen": [{"id": 3, "name": "Jan", "startLocation": {"lat": 50.0, "lon": 19.9}}]
        }))
        .unwrap();
        assert!(data.orders.is_empty());
        assert_eq!(data.servicemen[0].id, "3");
        assert_eq!(data.servicemen[0].start_coordinates(), Some(Coordinates::new(50.0, 19.9)));
    }
}
