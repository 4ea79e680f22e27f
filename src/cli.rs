//! CLI argument parsing for the dispatch-worker binary.

use chrono::{NaiveDate, Weekday};
use clap::{Parser, Subcommand};

use crate::services::optimization::OptimizationStrategy;

#[derive(Parser)]
#[command(name = "dispatch-worker", about = "Repair-order dispatch planning worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a technician's week and print the computed day schedules
    Plan {
        #[arg(long)]
        serviceman_id: String,
        /// Any date in the target week (defaults to today)
        #[arg(long)]
        week_start: Option<NaiveDate>,
    },
    /// Re-rank one day with a strategy and save the plan
    Optimize {
        #[arg(long)]
        serviceman_id: String,
        /// Weekday name, e.g. "mon" or "wednesday"
        #[arg(long)]
        day: Weekday,
        #[arg(long, default_value = "balanced")]
        strategy: OptimizationStrategy,
        #[arg(long)]
        week_start: Option<NaiveDate>,
    },
    /// Print the configured cost limits
    Stats,
}
