//! Weekly plan aggregate

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::{OrderId, ServiceOrder, TechnicianId};

/// Number of day buckets in a plan (Monday..Sunday)
pub const DAYS_PER_WEEK: usize = 7;

/// Where an order currently sits inside a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Day(Weekday),
    Unscheduled,
}

/// Monday of the week containing `date`.
pub fn week_anchor(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// One technician's week: seven ordered day buckets plus the unscheduled pool.
///
/// Bucket vectors hold ids only; the order records live in `orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPlan {
    pub technician_id: TechnicianId,
    pub technician_name: Option<String>,
    /// Monday of the planned week
    pub week_start: NaiveDate,
    days: [Vec<OrderId>; DAYS_PER_WEEK],
    unscheduled: Vec<OrderId>,
    orders: HashMap<OrderId, ServiceOrder>,
    /// Bumped on every mutation; used to discard superseded schedule results.
    pub version: u64,
}

impl WeeklyPlan {
    pub fn new(technician_id: impl Into<TechnicianId>, week_start: NaiveDate) -> Self {
        Self {
            technician_id: technician_id.into(),
            technician_name: None,
            week_start: week_anchor(week_start),
            days: Default::default(),
            unscheduled: Vec::new(),
            orders: HashMap::new(),
            version: 0,
        }
    }

    pub fn date_of(&self, day: Weekday) -> NaiveDate {
        self.week_start + Duration::days(i64::from(day.num_days_from_monday()))
    }

    /// Day bucket for `date`, or `None` if it falls outside this week.
    pub fn day_of(&self, date: NaiveDate) -> Option<Weekday> {
        let offset = (date - self.week_start).num_days();
        (0..DAYS_PER_WEEK as i64)
            .contains(&offset)
            .then(|| date.weekday())
    }

    pub fn day_ids(&self, day: Weekday) -> &[OrderId] {
        &self.days[day.num_days_from_monday() as usize]
    }

    pub fn unscheduled_ids(&self) -> &[OrderId] {
        &self.unscheduled
    }

    pub fn order(&self, id: &str) -> Option<&ServiceOrder> {
        self.orders.get(id)
    }

    pub fn order_mut(&mut self, id: &str) -> Option<&mut ServiceOrder> {
        self.orders.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.orders.contains_key(id)
    }

    /// Orders of a day in bucket order.
    pub fn day_orders(&self, day: Weekday) -> Vec<ServiceOrder> {
        self.day_ids(day)
            .iter()
            .filter_map(|id| self.orders.get(id).cloned())
            .collect()
    }

    pub fn unscheduled_orders(&self) -> Vec<ServiceOrder> {
        self.unscheduled
            .iter()
            .filter_map(|id| self.orders.get(id).cloned())
            .collect()
    }

    /// Bucket currently holding `id`.
    pub fn locate(&self, id: &str) -> Option<Bucket> {
        if let Some(idx) = self.days.iter().position(|d| d.iter().any(|o| o == id)) {
            return Some(Bucket::Day(weekday_from_index(idx)));
        }
        self.unscheduled
            .iter()
            .any(|o| o == id)
            .then_some(Bucket::Unscheduled)
    }

    /// Insert an order record into `bucket`, replacing any previous placement.
    pub fn insert(&mut self, order: ServiceOrder, bucket: Bucket) {
        let id = order.id.clone();
        self.detach(&id);
        self.orders.insert(id.clone(), order);
        self.bucket_mut(bucket).push(id);
    }

    /// Remove the id from whatever bucket holds it. Returns the old bucket.
    pub fn detach(&mut self, id: &str) -> Option<Bucket> {
        let found = self.locate(id)?;
        self.bucket_mut(found).retain(|o| o != id);
        Some(found)
    }

    /// Remove the order entirely, returning its record.
    pub fn take(&mut self, id: &str) -> Option<ServiceOrder> {
        self.detach(id);
        self.orders.remove(id)
    }

    pub fn push_id(&mut self, id: OrderId, bucket: Bucket) {
        self.bucket_mut(bucket).push(id);
    }

    /// Replace the ordering of a day bucket. Membership must be unchanged.
    pub fn set_day_order(&mut self, day: Weekday, ids: Vec<OrderId>) -> bool {
        let bucket = &mut self.days[day.num_days_from_monday() as usize];
        let mut current = bucket.clone();
        let mut proposed = ids.clone();
        current.sort();
        proposed.sort();
        if current != proposed {
            return false;
        }
        *bucket = ids;
        true
    }

    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Ids across all buckets, in Monday..Sunday then pool order.
    pub fn all_ids(&self) -> impl Iterator<Item = &OrderId> {
        self.days.iter().flatten().chain(self.unscheduled.iter())
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<OrderId> {
        match bucket {
            Bucket::Day(day) => &mut self.days[day.num_days_from_monday() as usize],
            Bucket::Unscheduled => &mut self.unscheduled,
        }
    }
}

pub fn weekday_from_index(idx: usize) -> Weekday {
    match idx {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

pub fn all_weekdays() -> impl Iterator<Item = Weekday> {
    (0..DAYS_PER_WEEK).map(weekday_from_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::order::fixtures::order;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn week_anchor_snaps_to_monday() {
        let thursday = NaiveDate::from_ymd_opt(2026, 10, 22).unwrap();
        assert_eq!(week_anchor(thursday), monday());
        assert_eq!(week_anchor(monday()), monday());
        let plan = WeeklyPlan::new("t1", thursday);
        assert_eq!(plan.week_start, monday());
    }

    #[test]
    fn date_and_day_mapping() {
        let plan = WeeklyPlan::new("t1", monday());
        assert_eq!(plan.date_of(Weekday::Wed), NaiveDate::from_ymd_opt(2026, 10, 21).unwrap());
        assert_eq!(plan.day_of(NaiveDate::from_ymd_opt(2026, 10, 25).unwrap()), Some(Weekday::Sun));
        assert_eq!(plan.day_of(NaiveDate::from_ymd_opt(2026, 10, 26).unwrap()), None);
        assert_eq!(plan.day_of(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()), None);
    }

    #[test]
    fn insert_moves_instead_of_duplicating() {
        let mut plan = WeeklyPlan::new("t1", monday());
        plan.insert(order("a"), Bucket::Unscheduled);
        plan.insert(order("a"), Bucket::Day(Weekday::Tue));

        assert_eq!(plan.locate("a"), Some(Bucket::Day(Weekday::Tue)));
        assert_eq!(plan.all_ids().filter(|id| *id == "a").count(), 1);
        assert!(plan.unscheduled_ids().is_empty());
        assert!(plan.unscheduled_orders().is_empty());

        plan.insert(order("a"), Bucket::Unscheduled);
        let pool: Vec<String> = plan.unscheduled_orders().into_iter().map(|o| o.id).collect();
        assert_eq!(pool, ["a".to_string()]);
    }

    #[test]
    fn set_day_order_rejects_membership_changes() {
        let mut plan = WeeklyPlan::new("t1", monday());
        plan.insert(order("a"), Bucket::Day(Weekday::Mon));
        plan.insert(order("b"), Bucket::Day(Weekday::Mon));

        assert!(!plan.set_day_order(Weekday::Mon, vec!["a".into(), "c".into()]));
        assert!(plan.set_day_order(Weekday::Mon, vec!["b".into(), "a".into()]));
        assert_eq!(plan.day_ids(Weekday::Mon), ["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn take_removes_record_and_id() {
        let mut plan = WeeklyPlan::new("t1", monday());
        plan.insert(order("a"), Bucket::Day(Weekday::Fri));
        let taken = plan.take("a").unwrap();
        assert_eq!(taken.id, "a");
        assert!(!plan.contains("a"));
        assert_eq!(plan.locate("a"), None);
    }
}
