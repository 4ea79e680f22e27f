//! Move validation
//!
//! Pure checks run before any assignment mutation. Hard checks short-circuit
//! in a fixed order (capacity, client unavailability, working-time envelope,
//! day-end overrun); soft checks only add warnings.

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use serde::Serialize;

use crate::types::{all_weekdays, PlanningPreferences, Priority, ServiceOrder, WeeklyPlan};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn ok(warnings: Vec<String>) -> Self {
        Self {
            valid: true,
            reason: None,
            warnings,
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            warnings: Vec::new(),
        }
    }
}

/// Minutes the day would take: service time, buffers between visits and the
/// home allowance.
pub fn working_envelope_minutes(orders: &[&ServiceOrder], prefs: &PlanningPreferences) -> u32 {
    if orders.is_empty() {
        return 0;
    }
    let service: u32 = orders.iter().map(|o| o.estimated_duration_minutes).sum();
    let gaps = (orders.len() as u32 - 1) * prefs.inter_visit_buffer_minutes;
    service + gaps + prefs.home_buffer_minutes
}

/// Check placing `candidate` on `target_date`, whose bucket holds `target_orders`.
///
/// If the candidate is already in `target_orders` it is counted once.
pub fn validate_assignment(
    candidate: &ServiceOrder,
    target_orders: &[ServiceOrder],
    target_date: NaiveDate,
    prefs: &PlanningPreferences,
) -> ValidationResult {
    let others: Vec<&ServiceOrder> = target_orders.iter().filter(|o| o.id != candidate.id).collect();

    if others.len() + 1 > prefs.max_daily_orders {
        return ValidationResult::rejected(format!(
            "day is full: {} orders already planned (max {})",
            others.len(),
            prefs.max_daily_orders
        ));
    }

    if candidate.is_unavailable_on(target_date) {
        return ValidationResult::rejected(format!(
            "client {} is unavailable on {}",
            candidate.client_name, target_date
        ));
    }

    let mut day: Vec<&ServiceOrder> = others.clone();
    day.push(candidate);
    let envelope = working_envelope_minutes(&day, prefs);
    let limit = prefs.max_working_hours * 60.0;
    if f64::from(envelope) > limit {
        return ValidationResult::rejected(format!(
            "working time would be {:.1} h, over the {:.1} h limit",
            f64::from(envelope) / 60.0,
            prefs.max_working_hours
        ));
    }

    let finish = minutes_of_day(prefs.work_start) + envelope;
    if finish > minutes_of_day(prefs.work_end) {
        return ValidationResult::rejected(format!(
            "day would end at {}, after work end {}",
            format_minutes(finish),
            prefs.work_end.format("%H:%M")
        ));
    }

    let mut warnings = Vec::new();
    for other in &others {
        let clash = candidate
            .preferred_time_slots
            .iter()
            .any(|a| other.preferred_time_slots.iter().any(|b| a.overlaps(b)));
        if clash {
            warnings.push(format!(
                "preferred time window overlaps with order {} ({})",
                other.id, other.client_name
            ));
        }
    }

    if others.len() >= prefs.near_capacity_threshold {
        warnings.push(format!(
            "day is nearly full: {} of {} orders",
            others.len() + 1,
            prefs.max_daily_orders
        ));
    }

    ValidationResult::ok(warnings)
}

/// [`validate_assignment`] against a plan's day, adding the warning for a
/// high-priority order placed later than the first day with free capacity.
pub fn validate_in_plan(
    candidate: &ServiceOrder,
    plan: &WeeklyPlan,
    target_day: Weekday,
    prefs: &PlanningPreferences,
) -> ValidationResult {
    let target_date = plan.date_of(target_day);
    let mut result = validate_assignment(candidate, &plan.day_orders(target_day), target_date, prefs);
    if !result.valid || candidate.priority != Priority::High {
        return result;
    }

    let earliest_free = all_weekdays().find(|&day| {
        let count = plan.day_ids(day).iter().filter(|id| **id != candidate.id).count();
        count < prefs.max_daily_orders && !candidate.is_unavailable_on(plan.date_of(day))
    });
    if let Some(day) = earliest_free {
        let date = plan.date_of(day);
        if date < target_date {
            result.warnings.push(format!(
                "high-priority order could be served earlier: {} still has capacity",
                date
            ));
        }
    }
    result
}

fn minutes_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

fn format_minutes(m: u32) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::order::fixtures::{hm, order};
    use crate::types::{Bucket, TimeSlot};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn day_of(n: usize, minutes: u32) -> Vec<ServiceOrder> {
        (0..n)
            .map(|i| ServiceOrder {
                estimated_duration_minutes: minutes,
                ..order(&format!("d{}", i))
            })
            .collect()
    }

    fn long_day_prefs() -> PlanningPreferences {
        PlanningPreferences {
            max_working_hours: 12.0,
            work_end: hm(20, 0),
            ..PlanningPreferences::default()
        }
    }

    #[test]
    fn eleven_of_twelve_passes_with_near_capacity_warning() {
        let candidate = ServiceOrder {
            estimated_duration_minutes: 90,
            priority: Priority::High,
            ..order("c")
        };
        let result = validate_assignment(&candidate, &day_of(11, 30), monday(), &long_day_prefs());
        assert!(result.valid, "{:?}", result.reason);
        assert!(result.warnings.iter().any(|w| w.contains("nearly full")));
    }

    #[test]
    fn thirteen_hour_envelope_is_rejected() {
        let candidate = ServiceOrder {
            estimated_duration_minutes: 90,
            ..order("c")
        };
        // 7 × 90 + 6 × 15 + 60 = 780 min
        let result = validate_assignment(&candidate, &day_of(6, 90), monday(), &long_day_prefs());
        assert!(!result.valid);
        let reason = result.reason.unwrap();
        assert!(reason.contains("13.0 h"), "got {reason}");
        assert!(reason.contains("12.0 h"));
    }

    #[test]
    fn capacity_is_checked_first() {
        let prefs = PlanningPreferences {
            max_daily_orders: 2,
            ..PlanningPreferences::default()
        };
        let mut candidate = order("c");
        candidate.unavailable_dates = vec![monday()];
        let result = validate_assignment(&candidate, &day_of(2, 30), monday(), &prefs);
        assert!(result.reason.unwrap().contains("day is full"));
    }

    #[test]
    fn unavailable_date_is_rejected() {
        let mut candidate = order("c");
        candidate.unavailable_dates = vec![monday()];
        let result = validate_assignment(&candidate, &[], monday(), &PlanningPreferences::default());
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("unavailable"));

        let tuesday = monday().succ_opt().unwrap();
        assert!(validate_assignment(&candidate, &[], tuesday, &PlanningPreferences::default()).valid);
    }

    #[test]
    fn day_end_overrun_is_rejected() {
        let prefs = PlanningPreferences {
            max_working_hours: 12.0,
            work_start: hm(8, 0),
            work_end: hm(12, 0),
            ..PlanningPreferences::default()
        };
        let candidate = ServiceOrder {
            estimated_duration_minutes: 120,
            ..order("c")
        };
        // 120 + 60 + 15 + 60 = 255 min, ends 12:15
        let result = validate_assignment(&candidate, &day_of(1, 60), monday(), &prefs);
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("12:15"));
    }

    #[test]
    fn candidate_already_on_day_is_counted_once() {
        let prefs = PlanningPreferences {
            max_daily_orders: 2,
            ..PlanningPreferences::default()
        };
        let day = day_of(2, 30);
        let result = validate_assignment(&day[1], &day, monday(), &prefs);
        assert!(result.valid, "{:?}", result.reason);
    }

    #[test]
    fn overlapping_preferred_windows_warn() {
        let mut existing = order("e");
        existing.preferred_time_slots = vec![TimeSlot::new(hm(9, 0), hm(11, 0))];
        let mut candidate = order("c");
        candidate.preferred_time_slots = vec![TimeSlot::new(hm(10, 0), hm(12, 0))];

        let result = validate_assignment(&candidate, &[existing.clone()], monday(), &PlanningPreferences::default());
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("order e"));

        // Half-open: touching windows do not overlap.
        candidate.preferred_time_slots = vec![TimeSlot::new(hm(11, 0), hm(12, 0))];
        let result = validate_assignment(&candidate, &[existing], monday(), &PlanningPreferences::default());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn capacity_never_loosens_as_day_grows() {
        let prefs = PlanningPreferences {
            max_working_hours: 24.0,
            work_start: hm(0, 0),
            work_end: hm(23, 59),
            ..PlanningPreferences::default()
        };
        let candidate = order("c");
        let mut failed_at = None;
        for n in 0..20 {
            let result = validate_assignment(&candidate, &day_of(n, 30), monday(), &prefs);
            match failed_at {
                None if !result.valid => failed_at = Some(n),
                Some(first) => assert!(!result.valid, "passed at {} after failing at {}", n, first),
                None => {}
            }
        }
        assert_eq!(failed_at, Some(prefs.max_daily_orders));
    }

    #[test]
    fn high_priority_on_later_day_warns() {
        let mut plan = WeeklyPlan::new("t1", monday());
        let prefs = PlanningPreferences::default();
        let candidate = ServiceOrder {
            priority: Priority::High,
            ..order("c")
        };
        plan.insert(candidate.clone(), Bucket::Unscheduled);

        let result = validate_in_plan(&candidate, &plan, Weekday::Wed, &prefs);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("2026-10-19")));

        let result = validate_in_plan(&candidate, &plan, Weekday::Mon, &prefs);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn envelope_of_empty_day_is_zero() {
        assert_eq!(working_envelope_minutes(&[], &PlanningPreferences::default()), 0);
    }
}
