//! Dispatch Worker - planning engine for repair-order dispatch
//!
//! Loads a technician's week from the planner backend and computes, validates
//! and saves day schedules from the command line.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_worker::backend::HttpBackend;
use dispatch_worker::cli::{Cli, Command};
use dispatch_worker::config::{AlertTarget, Config};
use dispatch_worker::services::alerts::{self, AlertSender, EmailAlertSender, LogAlertSender};
use dispatch_worker::services::clock::{Clock, SystemClock};
use dispatch_worker::services::cost_governor::CostGovernor;
use dispatch_worker::services::orchestrator::Orchestrator;
use dispatch_worker::services::travel::{self, BackendTravelConfig, TravelTimeProvider, TravelTimeResolver};
use dispatch_worker::services::travel_cache::TravelTimeCache;
use dispatch_worker::types::{all_weekdays, week_anchor, PlanningPreferences, ScheduleKey, ScheduleEventKind};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ../logs
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "dispatch-worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dispatch_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = Config::from_env()?;
    info!("Configuration loaded");

    if let Command::Stats = command {
        println!("{}", serde_json::to_string_pretty(&config.cost_limits)?);
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Cost alerts flow from the governor to whichever sender is configured
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let sender: Arc<dyn AlertSender> = match &config.alert_target {
        AlertTarget::Email { to, from, api_key } => Arc::new(EmailAlertSender::new(api_key, from, to)),
        AlertTarget::Log => Arc::new(LogAlertSender),
    };
    let alert_dispatcher = alerts::spawn_alert_dispatcher(alert_rx, sender);

    let mut cache = TravelTimeCache::new(clock.clone());
    if let Some(path) = &config.travel_cache_path {
        cache = cache.with_snapshot(path.clone());
    }
    let cache = Arc::new(cache);
    let governor = Arc::new(CostGovernor::new(config.cost_limits.clone(), clock.clone()).with_alert_channel(alert_tx));
    let provider: Arc<dyn TravelTimeProvider> = Arc::from(travel::create_travel_provider(Some(BackendTravelConfig::new(&config.backend_url))));
    let resolver = Arc::new(TravelTimeResolver::new(
        provider,
        cache,
        governor.clone(),
        Duration::from_secs(config.provider_timeout_secs),
    ));

    let backend = Arc::new(HttpBackend::new(&config.backend_url, 30)?);
    info!("Planner backend at {}", config.backend_url);

    let (orchestrator, listener) = Orchestrator::start(
        backend,
        resolver,
        clock.clone(),
        PlanningPreferences::default(),
        Duration::from_millis(config.debounce_ms),
    );

    let result = run(command, &orchestrator, clock.today()).await;

    let stats = governor.stats();
    info!(
        "Travel lookups today: {} requests, {} cache hits, {} failures, est. cost {:.2} of {:.2}",
        stats.requests_today,
        stats.cache_hits_today,
        stats.failures_today,
        stats.estimated_cost,
        governor.limits().daily_budget_limit
    );

    orchestrator.shutdown();
    drop(orchestrator);
    listener.abort();
    drop(governor);
    // Give queued alerts a moment to go out
    if tokio::time::timeout(Duration::from_secs(2), alert_dispatcher).await.is_err() {
        warn!("Alert dispatcher still busy at exit");
    }

    result
}

async fn run(command: Command, orchestrator: &Orchestrator, today: NaiveDate) -> Result<()> {
    match command {
        Command::Plan {
            serviceman_id,
            week_start,
        } => {
            let week = week_anchor(week_start.unwrap_or(today));
            let plan = orchestrator.switch_technician(&serviceman_id, week).await?;
            for day in all_weekdays() {
                if plan.day_ids(day).is_empty() {
                    continue;
                }
                let key = ScheduleKey::new(serviceman_id.as_str(), plan.date_of(day));
                orchestrator.recompute_now(&key).await?;
                match orchestrator.fresh_schedule(&key) {
                    Some(schedule) => {
                        println!("{} ({:?})", key, day);
                        for event in &schedule.events {
                            let label = match &event.kind {
                                ScheduleEventKind::Departure => "departure".to_string(),
                                ScheduleEventKind::Travel { distance_km, .. } => format!("travel {:.1} km", distance_km),
                                ScheduleEventKind::Visit { order_id } => {
                                    format!("visit {} ({} min)", order_id, event.duration_minutes())
                                }
                                ScheduleEventKind::ArrivalHome => "home".to_string(),
                            };
                            println!("  {} - {}  {}", event.start.format("%H:%M"), event.end.format("%H:%M"), label);
                        }
                        for warning in &schedule.warnings {
                            println!("  ! {}", warning);
                        }
                    }
                    None => warn!("No schedule computed for {}", key),
                }
            }
            let pool = plan.unscheduled_orders();
            if !pool.is_empty() {
                println!("unscheduled ({})", pool.len());
                for order in &pool {
                    println!("  {}  {} priority, {}", order.id, order.priority.as_str(), order.status.as_str());
                }
            }
            Ok(())
        }
        Command::Optimize {
            serviceman_id,
            day,
            strategy,
            week_start,
        } => {
            let week = week_anchor(week_start.unwrap_or(today));
            orchestrator.switch_technician(&serviceman_id, week).await?;
            let ranked = orchestrator.optimize_day(&serviceman_id, day, strategy)?;
            let response = orchestrator.save_plan(&serviceman_id).await?;
            println!("{:?} by {}: {}", day, strategy, ranked.join(", "));
            println!("saved: {} created, {} updated", response.created, response.updated);
            Ok(())
        }
        Command::Stats => Ok(()),
    }
}
