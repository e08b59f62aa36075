//! REST client for the Carbon manufacturing system
//!
//! Carbon uses bearer auth and camelCase resources: jobs (work orders),
//! items, work centers and quality inspections.

use serde_json::Value;
use tracing::debug;

use crate::config::CarbonConfig;
use crate::error::{ConnectorError, ConnectorResult};

use super::{build_http_client, check_response};

const SYSTEM: &str = "carbon";
const SYSTEM_LABEL: &str = "Carbon";

/// Client for the Carbon REST API
pub struct CarbonClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CarbonClient {
    pub fn new(config: &CarbonConfig) -> ConnectorResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConnectorError::configuration("Carbon API key is required"))?;
        Ok(Self {
            http: build_http_client(30)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> ConnectorResult<Value> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(check_response(SYSTEM, response).await?.json().await?)
    }

    async fn post(&self, path: &str, body: &Value) -> ConnectorResult<Value> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(check_response(SYSTEM, response).await?.json().await?)
    }

    async fn patch(&self, path: &str, body: &Value) -> ConnectorResult<Value> {
        let response = self
            .http
            .patch(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(check_response(SYSTEM, response).await?.json().await?)
    }

    fn items(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Probe the health endpoint. Failures surface as connection errors
    /// naming the system.
    pub async fn test_connection(&self) -> ConnectorResult<()> {
        let response = self
            .http
            .get(self.url("/health"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed(SYSTEM_LABEL, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(
                SYSTEM_LABEL,
                format!("status {}", response.status().as_u16()),
            ));
        }
        debug!("Carbon API reachable");
        Ok(())
    }

    pub async fn list_jobs(&self) -> ConnectorResult<Vec<Value>> {
        Ok(Self::items(self.get("/jobs").await?))
    }

    pub async fn get_job(&self, id: &str) -> ConnectorResult<Value> {
        self.get(&format!("/jobs/{}", id)).await
    }

    pub async fn create_job(&self, job: &Value) -> ConnectorResult<Value> {
        self.post("/jobs", job).await
    }

    pub async fn update_job_status(&self, id: &str, status: &str) -> ConnectorResult<Value> {
        self.patch(
            &format!("/jobs/{}", id),
            &serde_json::json!({"status": status}),
        )
        .await
    }

    pub async fn list_items(&self) -> ConnectorResult<Vec<Value>> {
        Ok(Self::items(self.get("/items").await?))
    }

    pub async fn get_item(&self, id: &str) -> ConnectorResult<Value> {
        self.get(&format!("/items/{}", id)).await
    }

    pub async fn create_item(&self, item: &Value) -> ConnectorResult<Value> {
        self.post("/items", item).await
    }

    pub async fn list_work_centers(&self) -> ConnectorResult<Vec<Value>> {
        Ok(Self::items(self.get("/workCenters").await?))
    }

    pub async fn record_quality_inspection(&self, inspection: &Value) -> ConnectorResult<Value> {
        self.post("/qualityInspections", inspection).await
    }

    pub async fn get_bill_of_materials(&self, item_id: &str) -> ConnectorResult<Value> {
        self.get(&format!("/items/{}/billOfMaterials", item_id)).await
    }
}
