//! Technician working-hours calendar (read-only, sourced from the backend)

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{TechnicianId, TimeSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Work,
    Break,
}

/// A single slot from the employee calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSlot {
    #[serde(rename = "type")]
    pub kind: SlotKind,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Work and break slots of one technician on one date
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianScheduleWindow {
    pub technician_id: TechnicianId,
    pub date: NaiveDate,
    #[serde(default)]
    pub slots: Vec<CalendarSlot>,
}

impl TechnicianScheduleWindow {
    pub fn work_slots(&self) -> impl Iterator<Item = TimeSlot> + '_ {
        self.slots_of(SlotKind::Work)
    }

    pub fn break_slots(&self) -> impl Iterator<Item = TimeSlot> + '_ {
        self.slots_of(SlotKind::Break)
    }

    /// Start of the earliest work slot.
    pub fn earliest_work_start(&self) -> Option<NaiveTime> {
        self.work_slots().map(|s| s.start).min()
    }

    /// End of the latest work slot.
    pub fn latest_work_end(&self) -> Option<NaiveTime> {
        self.work_slots().map(|s| s.end).max()
    }

    fn slots_of(&self, kind: SlotKind) -> impl Iterator<Item = TimeSlot> + '_ {
        self.slots
            .iter()
            .filter(move |s| s.kind == kind)
            .map(|s| TimeSlot::new(s.start, s.end))
    }
}
