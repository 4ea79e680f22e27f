use chrono::NaiveTime;

use crate::types::Coordinates;

pub const DEFAULT_SERVICE_DURATION_MINUTES: u32 = 60;

pub const INTER_VISIT_BUFFER_MINUTES: u32 = 15;

pub const HOME_BUFFER_MINUTES: u32 = 60;

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;

pub fn default_work_start() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).expect("valid static default work start")
}

pub fn default_work_end() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).expect("valid static default work end")
}

/// Last-resort start location (dispatch office, Warsaw)
pub fn default_start_location() -> Coordinates {
    Coordinates::new(52.2297, 21.0122)
}
