//! Real-time schedule computation for one technician-day.
//!
//! Walks the day's orders in bucket order and produces the
//! departure → travel → visit → … → arrival-home chain with absolute times.
//! At most one computation runs per (technician, day); a trigger that arrives
//! while one is in flight is dropped. Results are written back only if the
//! day did not change underneath the computation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::defaults;
use crate::error::{PlannerError, PlannerResult};
use crate::services::clock::Clock;
use crate::services::travel::{TravelTime, TravelTimeResolver};
use crate::types::{
    Coordinates, OrderId, PlanningPreferences, RealTimeSchedule, ScheduleEvent, ScheduleEventKind, ScheduleKey,
    ServiceOrder, StartLocationSource, TechnicianId, TechnicianScheduleWindow, TimeSlot,
};

/// Orders of one technician-day in visiting order, with the plan version
/// they were read at.
#[derive(Debug, Clone)]
pub struct DaySnapshot {
    pub orders: Vec<ServiceOrder>,
    pub plan_version: u64,
}

/// Read access to the weekly plans the calculator walks.
pub trait PlanSource: Send + Sync {
    /// `None` when no plan is loaded for the technician.
    fn day_snapshot(&self, key: &ScheduleKey) -> Option<DaySnapshot>;
}

#[derive(Debug, Clone)]
pub enum RecomputeOutcome {
    Computed(RealTimeSchedule),
    /// Another computation for the same key was running; this trigger is dropped.
    AlreadyInProgress,
    /// The day changed while computing; the result was discarded.
    Superseded,
}

/// Removes its key from the in-flight registry when dropped.
struct InFlightGuard {
    key: ScheduleKey,
    registry: Arc<Mutex<HashSet<ScheduleKey>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}

struct Chain {
    events: Vec<ScheduleEvent>,
    total_travel_minutes: f64,
    total_distance_km: f64,
    total_service_minutes: u32,
    warnings: Vec<String>,
}

pub struct ScheduleCalculator {
    resolver: Arc<TravelTimeResolver>,
    plans: Arc<dyn PlanSource>,
    clock: Arc<dyn Clock>,
    preferences: RwLock<PlanningPreferences>,
    start_overrides: RwLock<HashMap<TechnicianId, Coordinates>>,
    windows: RwLock<HashMap<ScheduleKey, TechnicianScheduleWindow>>,
    schedules: RwLock<HashMap<ScheduleKey, RealTimeSchedule>>,
    in_flight: Arc<Mutex<HashSet<ScheduleKey>>>,
}

impl ScheduleCalculator {
    pub fn new(
        resolver: Arc<TravelTimeResolver>,
        plans: Arc<dyn PlanSource>,
        clock: Arc<dyn Clock>,
        preferences: PlanningPreferences,
    ) -> Self {
        Self {
            resolver,
            plans,
            clock,
            preferences: RwLock::new(preferences),
            start_overrides: RwLock::new(HashMap::new()),
            windows: RwLock::new(HashMap::new()),
            schedules: RwLock::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn resolver(&self) -> &Arc<TravelTimeResolver> {
        &self.resolver
    }

    pub fn preferences(&self) -> PlanningPreferences {
        self.preferences.read().clone()
    }

    pub fn set_preferences(&self, preferences: PlanningPreferences) {
        *self.preferences.write() = preferences;
    }

    pub fn set_start_override(&self, technician_id: &str, location: Coordinates) {
        self.start_overrides
            .write()
            .insert(technician_id.to_string(), location);
    }

    pub fn start_override(&self, technician_id: &str) -> Option<Coordinates> {
        self.start_overrides.read().get(technician_id).copied()
    }

    pub fn clear_start_override(&self, technician_id: &str) -> Option<Coordinates> {
        self.start_overrides.write().remove(technician_id)
    }

    pub fn set_window(&self, window: TechnicianScheduleWindow) {
        let key = ScheduleKey::new(window.technician_id.clone(), window.date);
        self.windows.write().insert(key, window);
    }

    /// Last stored schedule for the key, however old.
    pub fn schedule(&self, key: &ScheduleKey) -> Option<RealTimeSchedule> {
        self.schedules.read().get(key).cloned()
    }

    /// Stored schedule, unless it has gone stale.
    pub fn fresh_schedule(&self, key: &ScheduleKey) -> Option<RealTimeSchedule> {
        let now = self.clock.now();
        self.schedule(key).filter(|s| !s.is_stale(now))
    }

    pub fn is_in_flight(&self, key: &ScheduleKey) -> bool {
        self.in_flight.lock().contains(key)
    }

    /// Start location by tier: explicit override, configured preference,
    /// then the fixed default.
    pub fn resolve_start(&self, technician_id: &str) -> (Coordinates, StartLocationSource) {
        if let Some(location) = self.start_overrides.read().get(technician_id) {
            debug!("Start location for {} from override", technician_id);
            return (*location, StartLocationSource::Override);
        }
        if let Some(location) = self.preferences.read().start_location {
            info!("Start location for {} from preferences", technician_id);
            return (location, StartLocationSource::Preference);
        }
        warn!("No start location for {}, falling back to default", technician_id);
        (defaults::default_start_location(), StartLocationSource::Default)
    }

    /// Recompute the chain for `key`.
    ///
    /// On any error the previously stored schedule is left untouched.
    pub async fn recompute(&self, key: &ScheduleKey) -> PlannerResult<RecomputeOutcome> {
        let Some(_guard) = self.try_acquire(key) else {
            debug!("Schedule for {} already in progress, trigger dropped", key);
            return Ok(RecomputeOutcome::AlreadyInProgress);
        };

        let snapshot = self
            .plans
            .day_snapshot(key)
            .ok_or_else(|| PlannerError::UnknownTechnician(key.technician_id.clone()))?;
        let (start, start_source) = self.resolve_start(&key.technician_id);
        let window = self.windows.read().get(key).cloned();

        let chain = self.build_chain(key, &snapshot.orders, start, window.as_ref()).await?;

        let current = self.plans.day_snapshot(key);
        let plan_version = match current {
            Some(c) if c.plan_version == snapshot.plan_version => c.plan_version,
            Some(c) if c.orders == snapshot.orders => c.plan_version,
            _ => {
                info!("Discarding superseded schedule for {} (computed from v{})", key, snapshot.plan_version);
                return Ok(RecomputeOutcome::Superseded);
            }
        };

        let schedule = RealTimeSchedule {
            key: key.clone(),
            start_location: start,
            start_source,
            events: chain.events,
            total_travel_minutes: chain.total_travel_minutes,
            total_distance_km: chain.total_distance_km,
            total_service_minutes: chain.total_service_minutes,
            computed_at: self.clock.now(),
            plan_version,
            warnings: chain.warnings,
        };

        info!(
            "Schedule for {}: {} visits, {:.0} min travel, {:.1} km, departure {:?}, home {:?}",
            key,
            snapshot.orders.len(),
            schedule.total_travel_minutes,
            schedule.total_distance_km,
            schedule.departure().map(|t| t.time()),
            schedule.arrival_home().map(|t| t.time()),
        );

        self.schedules.write().insert(key.clone(), schedule.clone());
        Ok(RecomputeOutcome::Computed(schedule))
    }

    fn try_acquire(&self, key: &ScheduleKey) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            key: key.clone(),
            registry: self.in_flight.clone(),
        })
    }

    async fn build_chain(
        &self,
        key: &ScheduleKey,
        orders: &[ServiceOrder],
        start: Coordinates,
        window: Option<&TechnicianScheduleWindow>,
    ) -> PlannerResult<Chain> {
        let mut chain = Chain {
            events: Vec::with_capacity(orders.len() * 2 + 2),
            total_travel_minutes: 0.0,
            total_distance_km: 0.0,
            total_service_minutes: 0,
            warnings: Vec::new(),
        };
        let Some(first) = orders.first() else {
            return Ok(chain);
        };

        let date = key.date;
        let at = |t: NaiveTime| date.and_time(t);
        let work_start = window
            .and_then(TechnicianScheduleWindow::earliest_work_start)
            .unwrap_or_else(|| self.preferences.read().work_start);
        let work_end = window
            .and_then(TechnicianScheduleWindow::latest_work_end)
            .unwrap_or_else(|| self.preferences.read().work_end);
        let breaks: Vec<TimeSlot> = window.map(|w| w.break_slots().collect()).unwrap_or_default();

        let first_leg = self.leg_to(start, first, &mut chain.warnings).await?;
        let anchor = first
            .scheduled_time
            .or_else(|| first.earliest_preferred_start())
            .unwrap_or(work_start);
        let departure = at(anchor)
            .checked_sub_signed(minutes(first_leg.duration_minutes)?)
            .ok_or_else(|| out_of_range(key))?
            .max(at(work_start));
        chain.events.push(ScheduleEvent {
            kind: ScheduleEventKind::Departure,
            start: departure,
            end: departure,
        });

        let mut cursor = departure;
        let mut position = start;
        let mut previous: Option<OrderId> = None;
        let mut first_leg = Some(first_leg);

        for order in orders {
            let leg = match first_leg.take() {
                Some(leg) => leg,
                None => self.leg_to(position, order, &mut chain.warnings).await?,
            };
            let arrival = shift(cursor, minutes(leg.duration_minutes)?, key)?;
            chain.push_travel(previous.take(), Some(order.id.clone()), &leg, cursor, arrival);

            // Wait for an agreed time; the first visit also honours its anchor.
            let agreed = if order.id == first.id { Some(anchor) } else { order.scheduled_time };
            let mut visit_start = match agreed {
                Some(t) if at(t) > arrival => at(t),
                _ => arrival,
            };
            visit_start = defer_past_breaks(visit_start, &breaks);

            let service = match order.estimated_duration_minutes {
                0 => defaults::DEFAULT_SERVICE_DURATION_MINUTES,
                m => m,
            };
            let visit_end = shift(visit_start, Duration::minutes(i64::from(service)), key)?;
            chain.events.push(ScheduleEvent {
                kind: ScheduleEventKind::Visit {
                    order_id: order.id.clone(),
                },
                start: visit_start,
                end: visit_end,
            });
            chain.total_service_minutes += service;

            cursor = visit_end;
            previous = Some(order.id.clone());
            if let Some(c) = order.coordinates {
                position = c;
            }
        }

        let home_leg = self.resolver.resolve(position, start).await?;
        let home = shift(cursor, minutes(home_leg.duration_minutes)?, key)?;
        chain.push_travel(previous, None, &home_leg, cursor, home);
        chain.events.push(ScheduleEvent {
            kind: ScheduleEventKind::ArrivalHome,
            start: home,
            end: home,
        });
        if home > at(work_end) {
            chain.warnings.push(format!(
                "back home at {} after work ends at {}",
                home.format("%H:%M"),
                work_end.format("%H:%M")
            ));
        }

        Ok(chain)
    }

    async fn leg_to(
        &self,
        from: Coordinates,
        order: &ServiceOrder,
        warnings: &mut Vec<String>,
    ) -> PlannerResult<TravelTime> {
        match order.coordinates {
            Some(to) => self.resolver.resolve(from, to).await,
            None => {
                warn!("Order {} has no coordinates, travel counted as zero", order.id);
                warnings.push(format!("order {} has no coordinates; travel to it counted as zero", order.id));
                Ok(TravelTime::zero("none"))
            }
        }
    }
}

impl Chain {
    fn push_travel(
        &mut self,
        from_order: Option<OrderId>,
        to_order: Option<OrderId>,
        leg: &TravelTime,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) {
        self.total_travel_minutes += leg.duration_minutes;
        self.total_distance_km += leg.distance_km;
        self.events.push(ScheduleEvent {
            kind: ScheduleEventKind::Travel {
                from_order,
                to_order,
                distance_km: leg.distance_km,
            },
            start,
            end,
        });
    }
}

/// Leg duration as a `Duration`; negative or unrepresentable figures are a
/// provider failure rather than a panic.
fn minutes(m: f64) -> PlannerResult<Duration> {
    if !m.is_finite() || m < 0.0 {
        return Err(PlannerError::Provider(format!("invalid travel duration {} min", m)));
    }
    Duration::try_seconds((m * 60.0).round() as i64)
        .ok_or_else(|| PlannerError::Provider(format!("travel duration {} min out of range", m)))
}

fn shift(t: NaiveDateTime, by: Duration, key: &ScheduleKey) -> PlannerResult<NaiveDateTime> {
    t.checked_add_signed(by).ok_or_else(|| out_of_range(key))
}

fn out_of_range(key: &ScheduleKey) -> PlannerError {
    PlannerError::Provider(format!("schedule for {} runs past representable time", key))
}

/// Move a visit start that falls inside a break to that break's end.
/// Adjacent breaks are skipped in turn.
fn defer_past_breaks(mut start: NaiveDateTime, breaks: &[TimeSlot]) -> NaiveDateTime {
    while let Some(slot) = breaks.iter().find(|b| b.contains(start.time())) {
        start = start.date().and_time(slot.end);
    }
    start
}
