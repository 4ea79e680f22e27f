//! Business logic services

pub mod alerts;
pub mod assignment_store;
pub mod clock;
pub mod cost_governor;
pub mod debounce;
pub mod geo;
pub mod optimization;
pub mod orchestrator;
pub mod schedule_calculator;
pub mod travel;
pub mod travel_cache;
pub mod validator;
