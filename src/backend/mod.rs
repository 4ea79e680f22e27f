//! Planner backend (remote order store) abstraction
//!
//! `HttpBackend` talks to the planner REST API; `FakeBackend` keeps everything
//! in memory for tests and dry runs.

mod http;

pub use http::HttpBackend;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::types::{EmployeeSchedule, OrderPatch, PlannerData, SavePlanRequest, SavePlanResponse};

#[async_trait]
pub trait PlannerBackend: Send + Sync {
    /// `PATCH /orders/{id}`
    async fn update_order(&self, order_id: &str, patch: &OrderPatch) -> Result<()>;

    /// `POST /intelligent-planner/save-plan`
    async fn save_plan(&self, request: &SavePlanRequest) -> Result<SavePlanResponse>;

    /// `GET /intelligent-planner/get-data?servicemanId=`
    async fn fetch_planner_data(&self, serviceman_id: &str) -> Result<PlannerData>;

    /// `GET /employee-calendar?action=get-all-schedules&date=`
    async fn fetch_schedules(&self, date: NaiveDate) -> Result<Vec<EmployeeSchedule>>;
}

/// In-memory backend that records writes
#[derive(Default)]
pub struct FakeBackend {
    data: Mutex<HashMap<String, PlannerData>>,
    schedules: Mutex<HashMap<NaiveDate, Vec<EmployeeSchedule>>>,
    pub patches: Mutex<Vec<(String, OrderPatch)>>,
    pub saved_plans: Mutex<Vec<SavePlanRequest>>,
    fail_updates: AtomicBool,
    fetches: AtomicU32,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_planner_data(&self, serviceman_id: &str, data: PlannerData) {
        self.data.lock().insert(serviceman_id.to_string(), data);
    }

    pub fn set_schedules(&self, date: NaiveDate, schedules: Vec<EmployeeSchedule>) {
        self.schedules.lock().insert(date, schedules);
    }

    /// Make every subsequent `update_order` fail.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of `fetch_planner_data` calls so far.
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn patched_ids(&self) -> Vec<String> {
        self.patches.lock().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl PlannerBackend for FakeBackend {
    async fn update_order(&self, order_id: &str, patch: &OrderPatch) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            anyhow::bail!("PATCH /orders/{} returned 503 Service Unavailable", order_id);
        }
        self.patches.lock().push((order_id.to_string(), patch.clone()));
        Ok(())
    }

    async fn save_plan(&self, request: &SavePlanRequest) -> Result<SavePlanResponse> {
        let count = request.weekly_plan.values().map(Vec::len).sum::<usize>() as u32;
        self.saved_plans.lock().push(request.clone());
        Ok(SavePlanResponse {
            success: true,
            created: 0,
            updated: count,
            message: None,
        })
    }

    async fn fetch_planner_data(&self, serviceman_id: &str) -> Result<PlannerData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.lock().get(serviceman_id).cloned().unwrap_or_default())
    }

    async fn fetch_schedules(&self, date: NaiveDate) -> Result<Vec<EmployeeSchedule>> {
        Ok(self.schedules.lock().get(&date).cloned().unwrap_or_default())
    }
}
