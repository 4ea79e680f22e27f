//! Weekly-plan assignment store
//!
//! Holds one [`WeeklyPlan`] per technician behind its own mutex. Mutations on
//! one technician are serialized by that mutex; a transfer between two
//! technicians takes both locks in technician-id order.
//!
//! Every mutation bumps the plan version and emits a [`StoreChange`] on the
//! change channel so the caller can persist the touched orders and schedule
//! recomputation of the affected days.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Weekday;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{PlannerError, PlannerResult};
use crate::services::schedule_calculator::{DaySnapshot, PlanSource};
use crate::services::validator::{self, ValidationResult};
use crate::types::{
    all_weekdays, Bucket, OrderId, OrderStatus, PlanningPreferences, ScheduleKey, ServiceOrder, TechnicianId,
    WeeklyPlan,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Assigned,
    Unassigned,
    Transferred,
    Reordered,
    Replaced,
}

/// Emitted after every successful mutation
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub kind: ChangeKind,
    /// Post-mutation order records to write back to the backend
    pub orders: Vec<ServiceOrder>,
    /// Technician-days whose schedule is now out of date
    pub affected: Vec<ScheduleKey>,
}

#[derive(Default)]
pub struct AssignmentStore {
    plans: RwLock<HashMap<TechnicianId, Arc<Mutex<WeeklyPlan>>>>,
    changes: Option<UnboundedSender<StoreChange>>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_channel(mut self, tx: UnboundedSender<StoreChange>) -> Self {
        self.changes = Some(tx);
        self
    }

    pub fn technicians(&self) -> Vec<TechnicianId> {
        let mut ids: Vec<TechnicianId> = self.plans.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn plan_snapshot(&self, technician_id: &str) -> Option<WeeklyPlan> {
        let handle = self.plans.read().get(technician_id).cloned()?;
        let plan = handle.lock().clone();
        Some(plan)
    }

    pub fn day_orders(&self, technician_id: &str, day: Weekday) -> PlannerResult<Vec<ServiceOrder>> {
        let handle = self.handle(technician_id)?;
        let orders = handle.lock().day_orders(day);
        Ok(orders)
    }

    /// Technician and bucket currently holding `order_id`.
    pub fn locate(&self, order_id: &str) -> Option<(TechnicianId, Bucket)> {
        for (technician_id, handle) in self.handles() {
            if let Some(bucket) = handle.lock().locate(order_id) {
                return Some((technician_id, bucket));
            }
        }
        None
    }

    /// Replace a technician's plan wholesale after a backend load.
    ///
    /// The version continues from the previous plan so in-flight schedule
    /// computations see the change.
    pub fn replace_plan(&self, mut plan: WeeklyPlan) {
        let technician_id = plan.technician_id.clone();
        let existing = self.plans.read().get(&technician_id).cloned();
        let (version, previous) = match existing {
            Some(handle) => {
                let mut current = handle.lock();
                plan.version = current.version.max(plan.version) + 1;
                let previous = std::mem::replace(&mut *current, plan.clone());
                (plan.version, Some(previous))
            }
            None => {
                let version = plan.version;
                self.plans
                    .write()
                    .insert(technician_id.clone(), Arc::new(Mutex::new(plan.clone())));
                (version, None)
            }
        };

        info!(
            "Plan for {} (week of {}) replaced: {} orders, {} unscheduled, v{}",
            technician_id,
            plan.week_start,
            plan.all_ids().count(),
            plan.unscheduled_ids().len(),
            version
        );

        // Days emptied by the reload still hold a schedule and need a recompute.
        let mut affected: Vec<ScheduleKey> = Vec::new();
        let plans = previous.iter().chain(std::iter::once(&plan));
        for source in plans {
            for day in all_weekdays() {
                if source.day_ids(day).is_empty() {
                    continue;
                }
                let key = ScheduleKey::new(technician_id.clone(), source.date_of(day));
                if !affected.contains(&key) {
                    affected.push(key);
                }
            }
        }
        affected.sort_by_key(|k| k.date);
        self.emit(StoreChange {
            kind: ChangeKind::Replaced,
            orders: Vec::new(),
            affected,
        });
    }

    /// Move an order of `technician_id`'s plan onto `day`.
    ///
    /// Returns `Ok(false)` when nothing changed: the order is unknown (logged)
    /// or already on that day, in which case it keeps its position.
    pub fn assign(&self, order_id: &str, day: Weekday, technician_id: &str) -> PlannerResult<bool> {
        let handle = self.handle(technician_id)?;
        let change = Self::apply_assign(&mut handle.lock(), order_id, day, technician_id)?;
        Ok(match change {
            Some(change) => {
                self.emit(change);
                true
            }
            None => false,
        })
    }

    /// Validate and apply a move inside one technician's plan while holding
    /// its lock, so concurrent moves onto the same day see each other.
    /// `src_day`, when given, must match where the order currently sits.
    pub fn move_within_plan(
        &self,
        order_id: &str,
        technician_id: &str,
        src_day: Option<Weekday>,
        day: Weekday,
        prefs: &PlanningPreferences,
    ) -> PlannerResult<ValidationResult> {
        let handle = self.handle(technician_id)?;
        let mut plan = handle.lock();

        let Some(previous) = plan.locate(order_id) else {
            return Err(PlannerError::UnknownOrder(order_id.to_string()));
        };
        if let Some(expected) = src_day {
            if previous != Bucket::Day(expected) {
                return Err(PlannerError::validation(format!(
                    "order {} is not on {:?} for {}",
                    order_id, expected, technician_id
                )));
            }
        }
        let candidate = plan
            .order(order_id)
            .cloned()
            .ok_or_else(|| PlannerError::UnknownOrder(order_id.to_string()))?;

        let result = validator::validate_in_plan(&candidate, &plan, day, prefs);
        if !result.valid {
            let reason = result.reason.unwrap_or_default();
            info!("Move of {} to {:?} for {} rejected: {}", order_id, day, technician_id, reason);
            return Err(PlannerError::validation(reason));
        }

        let change = Self::apply_assign(&mut plan, order_id, day, technician_id)?;
        drop(plan);
        if let Some(change) = change {
            self.emit(change);
        }
        Ok(result)
    }

    fn apply_assign(
        plan: &mut WeeklyPlan,
        order_id: &str,
        day: Weekday,
        technician_id: &str,
    ) -> PlannerResult<Option<StoreChange>> {
        let Some(previous) = plan.locate(order_id) else {
            warn!("Cannot assign unknown order {} for {}", order_id, technician_id);
            return Ok(None);
        };
        if previous == Bucket::Day(day) {
            debug!("Order {} already on {:?} for {}", order_id, day, technician_id);
            return Ok(None);
        }

        let date = plan.date_of(day);
        plan.detach(order_id);
        plan.push_id(order_id.to_string(), Bucket::Day(day));
        let order = match plan.order_mut(order_id) {
            Some(order) => {
                order.scheduled_date = Some(date);
                order.assigned_technician_id = Some(technician_id.to_string());
                if order.status == OrderStatus::New {
                    order.status = OrderStatus::Scheduled;
                }
                order.clone()
            }
            None => return Err(PlannerError::UnknownOrder(order_id.to_string())),
        };
        let version = plan.bump_version();

        let mut affected = vec![ScheduleKey::new(technician_id, date)];
        if let Bucket::Day(prev_day) = previous {
            affected.push(ScheduleKey::new(technician_id, plan.date_of(prev_day)));
        }

        info!("Assigned order {} to {} on {} (v{})", order_id, technician_id, date, version);
        Ok(Some(StoreChange {
            kind: ChangeKind::Assigned,
            orders: vec![order],
            affected,
        }))
    }

    /// Move an order back to the unscheduled pool of whichever plan holds it.
    pub fn unassign(&self, order_id: &str) -> PlannerResult<bool> {
        for (technician_id, handle) in self.handles() {
            let mut plan = handle.lock();
            let Some(previous) = plan.locate(order_id) else {
                continue;
            };
            if previous == Bucket::Unscheduled {
                return Ok(false);
            }

            plan.detach(order_id);
            plan.push_id(order_id.to_string(), Bucket::Unscheduled);
            let order = match plan.order_mut(order_id) {
                Some(order) => {
                    order.scheduled_date = None;
                    order.scheduled_time = None;
                    order.assigned_technician_id = None;
                    if order.status == OrderStatus::Scheduled {
                        order.status = OrderStatus::New;
                    }
                    order.clone()
                }
                None => return Err(PlannerError::UnknownOrder(order_id.to_string())),
            };
            let version = plan.bump_version();
            let affected = match previous {
                Bucket::Day(day) => vec![ScheduleKey::new(technician_id.clone(), plan.date_of(day))],
                Bucket::Unscheduled => Vec::new(),
            };
            drop(plan);

            info!("Unassigned order {} from {} (v{})", order_id, technician_id, version);
            self.emit(StoreChange {
                kind: ChangeKind::Unassigned,
                orders: vec![order],
                affected,
            });
            return Ok(true);
        }

        warn!("Cannot unassign unknown order {}", order_id);
        Ok(false)
    }

    /// Move an order from one technician's plan to another's `dst_day`.
    ///
    /// The move is validated against the destination plan while both locks
    /// are held; on rejection neither plan changes. `src_day`, when given,
    /// must match where the order currently sits.
    pub fn transfer_between_technicians(
        &self,
        order_id: &str,
        src_technician: &str,
        src_day: Option<Weekday>,
        dst_technician: &str,
        dst_day: Weekday,
        prefs: &PlanningPreferences,
    ) -> PlannerResult<ValidationResult> {
        if src_technician == dst_technician {
            return self.move_within_plan(order_id, src_technician, src_day, dst_day, prefs);
        }

        let src_handle = self.handle(src_technician)?;
        let dst_handle = self.handle(dst_technician)?;

        // Fixed lock order across technicians.
        let src_first = src_technician < dst_technician;
        let (first, second) = if src_first {
            (&src_handle, &dst_handle)
        } else {
            (&dst_handle, &src_handle)
        };
        let mut first_guard = first.lock();
        let mut second_guard = second.lock();
        let (src, dst) = if src_first {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };

        let Some(previous) = src.locate(order_id) else {
            return Err(PlannerError::UnknownOrder(order_id.to_string()));
        };
        if let Some(day) = src_day {
            if previous != Bucket::Day(day) {
                return Err(PlannerError::validation(format!(
                    "order {} is not on {:?} for {}",
                    order_id, day, src_technician
                )));
            }
        }
        let candidate = src
            .order(order_id)
            .cloned()
            .ok_or_else(|| PlannerError::UnknownOrder(order_id.to_string()))?;

        let result = validator::validate_in_plan(&candidate, dst, dst_day, prefs);
        if !result.valid {
            let reason = result.reason.unwrap_or_default();
            info!(
                "Transfer of {} from {} to {} rejected: {}",
                order_id, src_technician, dst_technician, reason
            );
            return Err(PlannerError::validation(reason));
        }

        let Some(mut order) = src.take(order_id) else {
            return Err(PlannerError::UnknownOrder(order_id.to_string()));
        };
        let dst_date = dst.date_of(dst_day);
        order.scheduled_date = Some(dst_date);
        order.assigned_technician_id = Some(dst_technician.to_string());
        if order.status == OrderStatus::New {
            order.status = OrderStatus::Scheduled;
        }
        dst.insert(order.clone(), Bucket::Day(dst_day));
        src.bump_version();
        dst.bump_version();

        let mut affected = vec![ScheduleKey::new(dst_technician, dst_date)];
        if let Bucket::Day(day) = previous {
            affected.push(ScheduleKey::new(src_technician, src.date_of(day)));
        }
        drop(first_guard);
        drop(second_guard);

        info!(
            "Transferred order {} from {} to {} on {}",
            order_id, src_technician, dst_technician, dst_date
        );
        self.emit(StoreChange {
            kind: ChangeKind::Transferred,
            orders: vec![order],
            affected,
        });
        Ok(result)
    }

    /// Apply a ranking to one day bucket. The id set must match the bucket.
    pub fn reorder_day(&self, technician_id: &str, day: Weekday, ordered: Vec<OrderId>) -> PlannerResult<()> {
        let handle = self.handle(technician_id)?;
        let mut plan = handle.lock();
        if !plan.set_day_order(day, ordered) {
            return Err(PlannerError::validation(format!(
                "new order for {:?} does not match the orders planned that day",
                day
            )));
        }
        let version = plan.bump_version();
        let key = ScheduleKey::new(technician_id, plan.date_of(day));
        drop(plan);

        debug!("Reordered {} (v{})", key, version);
        self.emit(StoreChange {
            kind: ChangeKind::Reordered,
            orders: Vec::new(),
            affected: vec![key],
        });
        Ok(())
    }

    fn handle(&self, technician_id: &str) -> PlannerResult<Arc<Mutex<WeeklyPlan>>> {
        self.plans
            .read()
            .get(technician_id)
            .cloned()
            .ok_or_else(|| PlannerError::UnknownTechnician(technician_id.to_string()))
    }

    fn handles(&self) -> Vec<(TechnicianId, Arc<Mutex<WeeklyPlan>>)> {
        let mut handles: Vec<_> = self
            .plans
            .read()
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    fn emit(&self, change: StoreChange) {
        if let Some(tx) = &self.changes {
            if tx.send(change).is_err() {
                debug!("Change channel closed");
            }
        }
    }
}

impl PlanSource for AssignmentStore {
    fn day_snapshot(&self, key: &ScheduleKey) -> Option<DaySnapshot> {
        let handle = self.plans.read().get(&key.technician_id).cloned()?;
        let plan = handle.lock();
        let orders = plan.day_of(key.date).map(|day| plan.day_orders(day)).unwrap_or_default();
        Some(DaySnapshot {
            orders,
            plan_version: plan.version,
        })
    }
}
