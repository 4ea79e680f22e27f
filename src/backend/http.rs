//! Planner REST API client

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use tracing::debug;

use super::PlannerBackend;
use crate::types::{
    EmployeeCalendarResponse, EmployeeSchedule, OrderPatch, PlannerData, SavePlanRequest, SavePlanResponse,
};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} returned error {}: {}", what, status, body);
    }
    Ok(response)
}

#[async_trait]
impl PlannerBackend for HttpBackend {
    async fn update_order(&self, order_id: &str, patch: &OrderPatch) -> Result<()> {
        let url = self.url(&format!("/orders/{}", urlencoding::encode(order_id)));
        let response = self
            .client
            .patch(&url)
            .json(patch)
            .send()
            .await
            .with_context(|| format!("Failed to send PATCH for order {}", order_id))?;
        ensure_success(response, "Order update").await?;
        debug!("Patched order {}", order_id);
        Ok(())
    }

    async fn save_plan(&self, request: &SavePlanRequest) -> Result<SavePlanResponse> {
        let response = self
            .client
            .post(self.url("/intelligent-planner/save-plan"))
            .json(request)
            .send()
            .await
            .context("Failed to send save-plan request")?;
        let response = ensure_success(response, "Save plan").await?;
        response.json().await.context("Failed to parse save-plan response")
    }

    async fn fetch_planner_data(&self, serviceman_id: &str) -> Result<PlannerData> {
        let url = self.url(&format!(
            "/intelligent-planner/get-data?servicemanId={}",
            urlencoding::encode(serviceman_id)
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch planner data")?;
        let response = ensure_success(response, "Planner data").await?;
        let data: PlannerData = response.json().await.context("Failed to parse planner data")?;
        debug!(
            "Planner data for {}: {} orders, {} servicemen",
            serviceman_id,
            data.orders.len(),
            data.servicemen.len()
        );
        Ok(data)
    }

    async fn fetch_schedules(&self, date: NaiveDate) -> Result<Vec<EmployeeSchedule>> {
        let url = self.url(&format!(
            "/employee-calendar?action=get-all-schedules&date={}",
            date.format("%Y-%m-%d")
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch employee calendar")?;
        let response = ensure_success(response, "Employee calendar").await?;
        let parsed: EmployeeCalendarResponse = response
            .json()
            .await
            .context("Failed to parse employee calendar")?;
        if !parsed.success {
            anyhow::bail!("Employee calendar request for {} unsuccessful", date);
        }
        Ok(parsed.schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:8080/api/", 5).unwrap();
        assert_eq!(backend.url("/orders/1"), "http://localhost:8080/api/orders/1");
    }
}
