//! Dispatcher-facing coordinator
//!
//! Reacts to technician switches, start-location changes and drag-and-drop
//! moves by calling the validator, the assignment store and the schedule
//! calculator in order. Store changes are consumed by a listener task that
//! writes the touched orders back to the backend and schedules a debounced
//! recompute per affected technician-day. A failed write triggers a full
//! reload of the technician's plan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Weekday};
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::PlannerBackend;
use crate::error::{PlannerError, PlannerResult};
use crate::services::assignment_store::{AssignmentStore, StoreChange};
use crate::services::clock::Clock;
use crate::services::debounce::Debouncer;
use crate::services::optimization::{self, OptimizationStrategy};
use crate::services::schedule_calculator::{RecomputeOutcome, ScheduleCalculator};
use crate::services::travel::TravelTimeResolver;
use crate::services::validator::ValidationResult;
use crate::types::{
    all_weekdays, week_anchor, Bucket, Coordinates, OrderId, OrderPatch, PlannerData, PlanningPreferences,
    RealTimeSchedule, SavePlanRequest, SavePlanResponse, ScheduleKey, TechnicianId, TechnicianScheduleWindow,
    WeeklyPlan,
};

pub struct Orchestrator {
    store: Arc<AssignmentStore>,
    calculator: Arc<ScheduleCalculator>,
    backend: Arc<dyn PlannerBackend>,
    debouncer: Debouncer<ScheduleKey>,
    active_technician: RwLock<Option<TechnicianId>>,
}

impl Orchestrator {
    /// Build the store, calculator and orchestrator and start the change
    /// listener.
    pub fn start(
        backend: Arc<dyn PlannerBackend>,
        resolver: Arc<TravelTimeResolver>,
        clock: Arc<dyn Clock>,
        preferences: PlanningPreferences,
        debounce: Duration,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(AssignmentStore::new().with_change_channel(tx));
        let calculator = Arc::new(ScheduleCalculator::new(resolver, store.clone(), clock, preferences));
        let orchestrator = Arc::new(Self {
            store,
            calculator,
            backend,
            debouncer: Debouncer::new(debounce),
            active_technician: RwLock::new(None),
        });
        let listener = orchestrator.spawn_change_listener(rx);
        (orchestrator, listener)
    }

    pub fn store(&self) -> &Arc<AssignmentStore> {
        &self.store
    }

    pub fn calculator(&self) -> &Arc<ScheduleCalculator> {
        &self.calculator
    }

    pub fn active_technician(&self) -> Option<TechnicianId> {
        self.active_technician.read().clone()
    }

    /// Fetch the technician's orders and calendar for the week containing
    /// `week_start` and replace the stored plan with the reconciled result.
    pub async fn load_plan(&self, technician_id: &str, week_start: NaiveDate) -> PlannerResult<WeeklyPlan> {
        let week_start = week_anchor(week_start);
        let data = self
            .backend
            .fetch_planner_data(technician_id)
            .await
            .map_err(|e| PlannerError::Persistence(format!("loading plan for {}: {:#}", technician_id, e)))?;

        let plan = self.reconcile(technician_id, week_start, &data);
        self.load_windows(technician_id, &plan).await;
        self.store.replace_plan(plan);

        self.store
            .plan_snapshot(technician_id)
            .ok_or_else(|| PlannerError::UnknownTechnician(technician_id.to_string()))
    }

    /// Make `technician_id` the active technician, loading the plan if the
    /// stored one is missing or for another week.
    pub async fn switch_technician(&self, technician_id: &str, week_start: NaiveDate) -> PlannerResult<WeeklyPlan> {
        let previous = self.active_technician.write().replace(technician_id.to_string());
        info!("Switching technician {:?} -> {}", previous, technician_id);

        let week_start = week_anchor(week_start);
        match self.store.plan_snapshot(technician_id) {
            Some(plan) if plan.week_start == week_start => {
                self.recompute_week(&plan);
                Ok(plan)
            }
            _ => self.load_plan(technician_id, week_start).await,
        }
    }

    /// Set an explicit start location; every cached leg is dropped and the
    /// technician's days are recomputed.
    pub fn change_start_location(&self, technician_id: &str, location: Coordinates) -> PlannerResult<()> {
        let plan = self
            .store
            .plan_snapshot(technician_id)
            .ok_or_else(|| PlannerError::UnknownTechnician(technician_id.to_string()))?;

        info!(
            "Start location for {} changed to {:.4},{:.4}",
            technician_id, location.lat, location.lng
        );
        self.calculator.set_start_override(technician_id, location);
        self.calculator.resolver().cache().invalidate_all();
        self.recompute_week(&plan);
        Ok(())
    }

    /// Drag-and-drop: validate, then assign within a plan or transfer between
    /// plans. Persistence and recompute follow via the change listener.
    pub fn move_order(&self, order_id: &str, technician_id: &str, day: Weekday) -> PlannerResult<ValidationResult> {
        let (source, bucket) = self
            .store
            .locate(order_id)
            .ok_or_else(|| PlannerError::UnknownOrder(order_id.to_string()))?;
        let prefs = self.calculator.preferences();

        if source != technician_id {
            let src_day = match bucket {
                Bucket::Day(d) => Some(d),
                Bucket::Unscheduled => None,
            };
            return self
                .store
                .transfer_between_technicians(order_id, &source, src_day, technician_id, day, &prefs);
        }

        let result = self.store.move_within_plan(order_id, technician_id, None, day, &prefs)?;
        for warning in &result.warnings {
            debug!("Move of {}: {}", order_id, warning);
        }
        Ok(result)
    }

    pub fn unassign_order(&self, order_id: &str) -> PlannerResult<bool> {
        self.store.unassign(order_id)
    }

    /// Re-rank one day with `strategy` and return the new order.
    pub fn optimize_day(
        &self,
        technician_id: &str,
        day: Weekday,
        strategy: OptimizationStrategy,
    ) -> PlannerResult<Vec<OrderId>> {
        let orders = self.store.day_orders(technician_id, day)?;
        let weights = self.calculator.preferences().weights;
        let ranked: Vec<OrderId> = optimization::rank(&orders, strategy, &weights)
            .into_iter()
            .map(|o| o.id)
            .collect();
        self.store.reorder_day(technician_id, day, ranked.clone())?;
        info!("Optimized {} {:?} by {}: {:?}", technician_id, day, strategy, ranked);
        Ok(ranked)
    }

    /// Send the whole week to `save-plan`.
    pub async fn save_plan(&self, technician_id: &str) -> PlannerResult<SavePlanResponse> {
        let plan = self
            .store
            .plan_snapshot(technician_id)
            .ok_or_else(|| PlannerError::UnknownTechnician(technician_id.to_string()))?;

        let weekly_plan: BTreeMap<String, Vec<_>> = all_weekdays()
            .map(|day| (weekday_key(day).to_string(), plan.day_orders(day)))
            .collect();
        let request = SavePlanRequest {
            serviceman_id: plan.technician_id.clone(),
            serviceman_name: plan.technician_name.clone(),
            weekly_plan,
            week_start: plan.week_start,
        };

        let response = self
            .backend
            .save_plan(&request)
            .await
            .map_err(|e| PlannerError::Persistence(format!("saving plan for {}: {:#}", technician_id, e)))?;
        info!(
            "Saved plan for {}: {} created, {} updated",
            technician_id, response.created, response.updated
        );
        Ok(response)
    }

    /// Recompute one technician-day immediately, bypassing the debounce.
    pub async fn recompute_now(&self, key: &ScheduleKey) -> PlannerResult<RecomputeOutcome> {
        self.calculator.recompute(key).await
    }

    pub fn schedule(&self, key: &ScheduleKey) -> Option<RealTimeSchedule> {
        self.calculator.schedule(key)
    }

    /// Stored schedule if it is recent enough to show, otherwise `None`.
    pub fn fresh_schedule(&self, key: &ScheduleKey) -> Option<RealTimeSchedule> {
        self.calculator.fresh_schedule(key)
    }

    /// Debounced recompute of `key`.
    pub fn request_recompute(&self, key: ScheduleKey) {
        let calculator = self.calculator.clone();
        let target = key.clone();
        self.debouncer.schedule(key, move || async move {
            match calculator.recompute(&target).await {
                Ok(RecomputeOutcome::Computed(_)) => {}
                Ok(outcome) => debug!("Recompute of {} skipped: {:?}", target, outcome),
                Err(e) if e.is_transient() => warn!("Recompute of {} failed, next change retries: {}", target, e),
                Err(e) => error!("Recompute of {} failed: {}", target, e),
            }
        });
    }

    /// Stop pending recomputes and flush the durable travel cache.
    pub fn shutdown(&self) {
        self.debouncer.shutdown();
        if let Err(e) = self.calculator.resolver().cache().flush() {
            warn!("Failed to flush travel-time cache: {:#}", e);
        }
        info!("Orchestrator shut down");
    }

    fn spawn_change_listener(self: &Arc<Self>, mut rx: UnboundedReceiver<StoreChange>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                orchestrator.handle_change(change).await;
            }
            debug!("Change listener stopped");
        })
    }

    async fn handle_change(&self, change: StoreChange) {
        let mut failed = false;
        for order in &change.orders {
            let patch = OrderPatch::from_order(order);
            if let Err(e) = self.backend.update_order(&order.id, &patch).await {
                warn!("{}; reloading plan", PlannerError::Persistence(format!("order {}: {:#}", order.id, e)));
                failed = true;
                break;
            }
        }

        if failed {
            let technicians: BTreeSet<TechnicianId> = change
                .affected
                .iter()
                .map(|k| k.technician_id.clone())
                .chain(change.orders.iter().filter_map(|o| o.assigned_technician_id.clone()))
                .collect();
            for technician_id in technicians {
                let Some(week_start) = self.store.plan_snapshot(&technician_id).map(|p| p.week_start) else {
                    continue;
                };
                if let Err(e) = self.load_plan(&technician_id, week_start).await {
                    warn!("Reload of {} after failed write also failed: {}", technician_id, e);
                }
            }
            return;
        }

        for key in change.affected {
            self.request_recompute(key);
        }
    }

    fn recompute_week(&self, plan: &WeeklyPlan) {
        for day in all_weekdays() {
            if !plan.day_ids(day).is_empty() {
                self.request_recompute(ScheduleKey::new(plan.technician_id.clone(), plan.date_of(day)));
            }
        }
    }

    /// Place backend orders into a fresh plan. Orders with both a technician
    /// and a date are scheduled; those for this technician and week go to
    /// their day, the rest belong elsewhere. Orders missing either field go
    /// to the unscheduled pool of their technician, or of the first loaded
    /// plan when they have none.
    fn reconcile(&self, technician_id: &str, week_start: NaiveDate, data: &PlannerData) -> WeeklyPlan {
        let mut plan = WeeklyPlan::new(technician_id, week_start);
        let serviceman = data.servicemen.iter().find(|s| s.id == technician_id);
        plan.technician_name = serviceman.and_then(|s| s.name.clone());

        // The technician's home base counts as an override unless the
        // dispatcher already set one.
        if let Some(location) = serviceman.and_then(|s| s.start_coordinates()) {
            if self.calculator.start_override(technician_id).is_none() {
                self.calculator.set_start_override(technician_id, location);
            }
        }

        let mut skipped = 0;
        for order in &data.orders {
            if !order.is_scheduled() {
                let foreign = order.assigned_technician_id.as_deref().is_some_and(|t| t != technician_id);
                let held_elsewhere = self
                    .store
                    .locate(&order.id)
                    .is_some_and(|(holder, _)| holder != technician_id);
                if foreign || held_elsewhere {
                    skipped += 1;
                    continue;
                }
                let mut order = order.clone();
                order.scheduled_date = None;
                order.assigned_technician_id = None;
                plan.insert(order, Bucket::Unscheduled);
                continue;
            }
            let mine = order.assigned_technician_id.as_deref() == Some(technician_id);
            match order.scheduled_date.and_then(|d| plan.day_of(d)) {
                Some(day) if mine => plan.insert(order.clone(), Bucket::Day(day)),
                _ => skipped += 1,
            }
        }

        info!(
            "Reconciled {} orders for {} (week of {}): {} unscheduled, {} belong elsewhere",
            data.orders.len(),
            technician_id,
            plan.week_start,
            plan.unscheduled_ids().len(),
            skipped
        );
        plan
    }

    async fn load_windows(&self, technician_id: &str, plan: &WeeklyPlan) {
        let dates: Vec<NaiveDate> = all_weekdays().map(|day| plan.date_of(day)).collect();
        let fetched = join_all(dates.iter().map(|date| self.backend.fetch_schedules(*date))).await;

        for (date, result) in dates.into_iter().zip(fetched) {
            match result {
                Ok(schedules) => {
                    if let Some(entry) = schedules.into_iter().find(|s| s.employee_id == technician_id) {
                        self.calculator.set_window(TechnicianScheduleWindow {
                            technician_id: technician_id.to_string(),
                            date,
                            slots: entry.slots,
                        });
                    }
                }
                Err(e) => warn!("Calendar for {} unavailable, using configured hours: {:#}", date, e),
            }
        }
    }
}

fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::backend::FakeBackend;
    use crate::services::clock::ManualClock;
    use crate::services::cost_governor::{CostGovernor, CostLimits};
    use crate::services::travel::testing::CountingProvider;
    use crate::services::travel_cache::TravelTimeCache;
    use crate::types::order::fixtures::{order, order_at};
    use crate::types::{CalendarSlot, EmployeeSchedule, Serviceman, ServiceOrder, SlotKind, StartLocationSource};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn scheduled(id: &str, tech: &str, date: NaiveDate) -> ServiceOrder {
        ServiceOrder {
            scheduled_date: Some(date),
            assigned_technician_id: Some(tech.to_string()),
            ..order_at(id, 52.20 + id.len() as f64 * 0.01, 21.00)
        }
    }

    fn planner_data() -> PlannerData {
        PlannerData {
            orders: vec![
                scheduled("o1", "t1", monday()),
                scheduled("o22", "t1", monday()),
                scheduled("o333", "t2", monday()),
                scheduled("o4444", "t1", NaiveDate::from_ymd_opt(2026, 10, 27).unwrap()),
                order_at("u1", 52.30, 21.10),
                ServiceOrder {
                    assigned_technician_id: Some("t1".into()),
                    ..order("u2")
                },
            ],
            servicemen: vec![Serviceman {
                id: "t1".into(),
                name: Some("Jan".into()),
                start_location: None,
            }],
            visits: vec![],
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        backend: Arc<FakeBackend>,
        provider: Arc<CountingProvider>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(FakeBackend::new());
        backend.set_planner_data("t1", planner_data());
        backend.set_planner_data("t2", PlannerData::default());
        let provider = Arc::new(CountingProvider::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()));
        let resolver = Arc::new(TravelTimeResolver::new(
            provider.clone(),
            Arc::new(TravelTimeCache::new(clock.clone())),
            Arc::new(CostGovernor::new(CostLimits::default(), clock.clone())),
            Duration::from_secs(10),
        ));
        let (orchestrator, _listener) = Orchestrator::start(
            backend.clone(),
            resolver,
            clock.clone(),
            PlanningPreferences::default(),
            Duration::from_millis(1500),
        );
        Harness {
            orchestrator,
            backend,
            provider,
            clock,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn load_plan_reconciles_backend_orders() {
        let h = harness();
        h.backend.set_schedules(
            monday(),
            vec![EmployeeSchedule {
                employee_id: "t1".into(),
                slots: vec![CalendarSlot {
                    kind: SlotKind::Work,
                    start: chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                    end: chrono::NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                }],
            }],
        );

        let plan = h.orchestrator.load_plan("t1", NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()).await.unwrap();
        assert_eq!(plan.week_start, monday());
        assert_eq!(plan.technician_name.as_deref(), Some("Jan"));
        assert_eq!(plan.day_ids(Weekday::Mon), ["o1".to_string(), "o22".to_string()]);
        assert_eq!(plan.unscheduled_ids(), ["u1".to_string(), "u2".to_string()]);
        assert!(!plan.contains("o333"), "other technician's order");
        assert!(!plan.contains("o4444"), "next week's order");
        assert!(plan.order("u2").unwrap().assigned_technician_id.is_none());

        settle().await;
        let schedule = h.orchestrator.schedule(&ScheduleKey::new("t1", monday())).unwrap();
        assert_eq!(schedule.departure().unwrap().time(), chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(schedule.start_source, StartLocationSource::Default);
    }

    #[tokio::test(start_paused = true)]
    async fn move_persists_and_recomputes_once() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;
        let calls_after_load = h.provider.calls();

        let tuesday = ScheduleKey::new("t1", NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        h.orchestrator.move_order("u1", "t1", Weekday::Tue).unwrap();
        settle().await;

        assert_eq!(h.backend.patched_ids(), vec!["u1".to_string()]);
        let (_, patch) = h.backend.patches.lock()[0].clone();
        assert_eq!(patch.scheduled_date, Some(tuesday.date));
        assert_eq!(patch.assigned_to.as_deref(), Some("t1"));

        let schedule = h.orchestrator.schedule(&tuesday).unwrap();
        assert_eq!(schedule.visits().len(), 1);
        assert_eq!(h.provider.calls() - calls_after_load, 2, "home→u1 and u1→home");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_move_changes_nothing() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        let mut unavailable = planner_data();
        unavailable.orders[4].unavailable_dates = vec![monday()];
        h.backend.set_planner_data("t1", unavailable);
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;

        let err = h.orchestrator.move_order("u1", "t1", Weekday::Mon).unwrap_err();
        assert!(matches!(err, PlannerError::Validation { .. }));
        settle().await;
        assert!(h.backend.patched_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_reloads_plan() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;
        assert_eq!(h.backend.fetch_count(), 1);

        h.backend.set_fail_updates(true);
        h.orchestrator.move_order("u1", "t1", Weekday::Wed).unwrap();
        settle().await;

        assert_eq!(h.backend.fetch_count(), 2);
        let plan = h.orchestrator.store().plan_snapshot("t1").unwrap();
        assert_eq!(plan.locate("u1"), Some(Bucket::Unscheduled), "backend state wins");
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_between_technicians_via_move() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        h.orchestrator.load_plan("t2", monday()).await.unwrap();
        settle().await;

        h.orchestrator.move_order("o1", "t2", Weekday::Thu).unwrap();
        settle().await;

        assert_eq!(
            h.orchestrator.store().locate("o1"),
            Some(("t2".to_string(), Bucket::Day(Weekday::Thu)))
        );
        assert_eq!(h.backend.patched_ids(), vec!["o1".to_string()]);
        let thursday = ScheduleKey::new("t2", NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
        assert!(h.orchestrator.schedule(&thursday).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn start_location_change_invalidates_cache_and_recomputes() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;
        assert!(h.orchestrator.calculator().resolver().cache().stats().fast_entries > 0);

        let depot = Coordinates::new(52.40, 20.80);
        h.orchestrator.change_start_location("t1", depot).unwrap();
        assert_eq!(h.orchestrator.calculator().resolver().cache().stats().fast_entries, 0);
        settle().await;

        let schedule = h.orchestrator.schedule(&ScheduleKey::new("t1", monday())).unwrap();
        assert_eq!(schedule.start_source, StartLocationSource::Override);
        assert_eq!(schedule.start_location, depot);
    }

    #[tokio::test(start_paused = true)]
    async fn optimize_then_save_plan() {
        let h = harness();
        let mut data = planner_data();
        data.orders[0].service_cost = 50.0;
        data.orders[1].service_cost = 400.0;
        h.backend.set_planner_data("t1", data);
        h.orchestrator.load_plan("t1", monday()).await.unwrap();

        let ranked = h
            .orchestrator
            .optimize_day("t1", Weekday::Mon, OptimizationStrategy::Revenue)
            .unwrap();
        assert_eq!(ranked, vec!["o22".to_string(), "o1".to_string()]);

        let response = h.orchestrator.save_plan("t1").await.unwrap();
        assert!(response.success);
        let saved = h.backend.saved_plans.lock()[0].clone();
        assert_eq!(saved.serviceman_id, "t1");
        assert_eq!(saved.weekly_plan.len(), 7);
        let monday_ids: Vec<&str> = saved.weekly_plan["monday"].iter().map(|o| o.id.as_str()).collect();
        assert_eq!(monday_ids, vec!["o22", "o1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unscheduled_orders_land_in_a_single_pool() {
        let h = harness();
        let mut shared = planner_data();
        shared.orders.push(ServiceOrder {
            assigned_technician_id: Some("t2".into()),
            ..order("u3")
        });
        h.backend.set_planner_data("t1", shared.clone());
        h.backend.set_planner_data("t2", shared);

        let t1 = h.orchestrator.load_plan("t1", monday()).await.unwrap();
        let t2 = h.orchestrator.load_plan("t2", monday()).await.unwrap();

        assert_eq!(t1.unscheduled_ids(), ["u1".to_string(), "u2".to_string()]);
        assert_eq!(t2.unscheduled_ids(), ["u3".to_string()]);
        assert_eq!(h.orchestrator.store().locate("u1"), Some(("t1".to_string(), Bucket::Unscheduled)));

        // Reloading the holder keeps the shared order where it was.
        let t1 = h.orchestrator.load_plan("t1", monday()).await.unwrap();
        assert!(t1.contains("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_recomputes_days_it_empties() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;
        let key = ScheduleKey::new("t1", monday());
        assert_eq!(h.orchestrator.schedule(&key).unwrap().visits().len(), 2);

        let mut moved = planner_data();
        let tuesday = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        moved.orders[0].scheduled_date = Some(tuesday);
        moved.orders[1].scheduled_date = Some(tuesday);
        h.backend.set_planner_data("t1", moved);
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;

        assert!(h.orchestrator.schedule(&key).unwrap().visits().is_empty());
        assert_eq!(
            h.orchestrator.schedule(&ScheduleKey::new("t1", tuesday)).unwrap().visits().len(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_schedule_hides_stale_results() {
        let h = harness();
        h.orchestrator.load_plan("t1", monday()).await.unwrap();
        settle().await;
        let key = ScheduleKey::new("t1", monday());
        assert!(h.orchestrator.fresh_schedule(&key).is_some());

        h.clock.advance(chrono::Duration::minutes(10));
        assert!(h.orchestrator.fresh_schedule(&key).is_none());
        assert!(h.orchestrator.schedule(&key).is_some());

        h.orchestrator.recompute_now(&key).await.unwrap();
        assert!(h.orchestrator.fresh_schedule(&key).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn switch_technician_reuses_loaded_week() {
        let h = harness();
        h.orchestrator.switch_technician("t1", monday()).await.unwrap();
        h.orchestrator.switch_technician("t2", monday()).await.unwrap();
        h.orchestrator.switch_technician("t1", monday()).await.unwrap();
        assert_eq!(h.backend.fetch_count(), 2);
        assert_eq!(h.orchestrator.active_technician().as_deref(), Some("t1"));
        h.orchestrator.shutdown();
    }
}
