//! Dispatch worker library
//!
//! Weekly assignment store, move validation, real-time day schedules and the
//! cost-governed travel-time lookup behind them.

pub mod backend;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod services;
pub mod types;
