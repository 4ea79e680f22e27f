//! Cost-alert egress.
//!
//! `AlertSender` is the core trait: `EmailAlertSender` in production,
//! `LogAlertSender` when no mail transport is configured and
//! `FakeAlertSender` in tests. The governor pushes alerts into a channel; `spawn_alert_dispatcher`
//! drains it so the governor never awaits I/O while holding its lock.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::services::cost_governor::{AlertType, CostAlert};

// =============================================================================
// Core trait
// =============================================================================

#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, alert: &CostAlert) -> Result<()>;
}

fn subject(alert: &CostAlert) -> String {
    let what = match alert.alert_type {
        AlertType::Budget => "daily travel-time budget",
        AlertType::Requests => "daily travel-time request quota",
    };
    format!("[Dispatch] {}% of {} used", alert.threshold_pct, what)
}

fn body(alert: &CostAlert) -> String {
    let s = &alert.stats;
    format!(
        "Usage reached {:.1}% (threshold {}%) at {}.\n\n\
         Requests today: {}\nCache hits today: {}\nFailures today: {}\n\
         Estimated cost: ${:.2}\nBudget used: {:.1}%\nRequest quota used: {:.1}%\n\
         Cache hit rate: {:.1}%\n",
        alert.usage_pct,
        alert.threshold_pct,
        alert.fired_at.to_rfc3339(),
        s.requests_today,
        s.cache_hits_today,
        s.failures_today,
        s.estimated_cost,
        s.budget_used_pct,
        s.requests_used_pct,
        s.cache_hit_rate_pct,
    )
}

// =============================================================================
// LogAlertSender: writes to tracing
// =============================================================================

pub struct LogAlertSender;

#[async_trait]
impl AlertSender for LogAlertSender {
    async fn send(&self, alert: &CostAlert) -> Result<()> {
        warn!(
            alert = %alert.threshold_id(),
            "[LogAlertSender] {}\n{}",
            subject(alert),
            body(alert),
        );
        Ok(())
    }
}

// =============================================================================
// FakeAlertSender: captures alerts in a Vec (tests)
// =============================================================================

#[derive(Default)]
pub struct FakeAlertSender {
    pub sent: Mutex<Vec<CostAlert>>,
}

impl FakeAlertSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_alerts(&self) -> Vec<CostAlert> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl AlertSender for FakeAlertSender {
    async fn send(&self, alert: &CostAlert) -> Result<()> {
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}

// =============================================================================
// EmailAlertSender: Resend.com API
// =============================================================================

pub struct EmailAlertSender {
    api_key: String,
    from: String,
    to: String,
}

impl EmailAlertSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl AlertSender for EmailAlertSender {
    async fn send(&self, alert: &CostAlert) -> Result<()> {
        let client = reqwest::Client::new();
        let subject = subject(alert);
        let text = body(alert);

        let mut payload = HashMap::new();
        payload.insert("from", self.from.as_str());
        payload.insert("to", self.to.as_str());
        payload.insert("subject", subject.as_str());
        payload.insert("text", text.as_str());

        let response = client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Resend API error {}: {}", status, body));
        }

        info!(to = %self.to, alert = %alert.threshold_id(), "Cost alert emailed");
        Ok(())
    }
}

/// Drain the governor's alert channel until it closes.
pub fn spawn_alert_dispatcher(
    mut rx: UnboundedReceiver<CostAlert>,
    sender: std::sync::Arc<dyn AlertSender>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            if let Err(e) = sender.send(&alert).await {
                error!("Failed to deliver cost alert {}: {:#}", alert.threshold_id(), e);
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
