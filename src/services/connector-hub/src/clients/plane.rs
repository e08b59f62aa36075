//! REST client for Plane project management
//!
//! Plane scopes every path under a workspace slug and authenticates with an
//! `X-API-Key` header. List endpoints return `{"results": [...]}` envelopes.

use serde_json::Value;
use tracing::debug;

use crate::config::PlaneConfig;
use crate::error::{ConnectorError, ConnectorResult};

use super::{build_http_client, check_response};

const SYSTEM: &str = "plane";
const SYSTEM_LABEL: &str = "Plane";

/// Client for the Plane REST API
pub struct PlaneClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    workspace_slug: String,
}

impl PlaneClient {
    pub fn new(config: &PlaneConfig) -> ConnectorResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConnectorError::configuration("Plane API key is required"))?;
        Ok(Self {
            http: build_http_client(30)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            workspace_slug: config.workspace_slug.clone(),
        })
    }

    fn workspace_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/workspaces/{}{}",
            self.base_url, self.workspace_slug, suffix
        )
    }

    async fn get(&self, url: String) -> ConnectorResult<Value> {
        let response = self
            .http
            .get(url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;
        Ok(check_response(SYSTEM, response).await?.json().await?)
    }

    async fn post(&self, url: String, body: &Value) -> ConnectorResult<Value> {
        let response = self
            .http
            .post(url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(check_response(SYSTEM, response).await?.json().await?)
    }

    async fn patch(&self, url: String, body: &Value) -> ConnectorResult<Value> {
        let response = self
            .http
            .patch(url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(check_response(SYSTEM, response).await?.json().await?)
    }

    fn results(value: Value) -> Vec<Value> {
        match value {
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    /// Probe the workspace root. Failures surface as connection errors
    /// naming the system.
    pub async fn test_connection(&self) -> ConnectorResult<()> {
        let response = self
            .http
            .get(self.workspace_url("/"))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed(SYSTEM_LABEL, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(
                SYSTEM_LABEL,
                format!("status {}", response.status().as_u16()),
            ));
        }
        debug!("Plane workspace reachable");
        Ok(())
    }

    pub async fn list_projects(&self) -> ConnectorResult<Vec<Value>> {
        let body = self.get(self.workspace_url("/projects/")).await?;
        Ok(Self::results(body))
    }

    pub async fn create_project(&self, project: &Value) -> ConnectorResult<Value> {
        self.post(self.workspace_url("/projects/"), project).await
    }

    pub async fn list_issues(&self, project_id: &str) -> ConnectorResult<Vec<Value>> {
        let body = self
            .get(self.workspace_url(&format!("/projects/{}/issues/", project_id)))
            .await?;
        Ok(Self::results(body))
    }

    pub async fn create_issue(&self, project_id: &str, issue: &Value) -> ConnectorResult<Value> {
        self.post(
            self.workspace_url(&format!("/projects/{}/issues/", project_id)),
            issue,
        )
        .await
    }

    pub async fn update_issue(
        &self,
        project_id: &str,
        issue_id: &str,
        patch: &Value,
    ) -> ConnectorResult<Value> {
        self.patch(
            self.workspace_url(&format!("/projects/{}/issues/{}/", project_id, issue_id)),
            patch,
        )
        .await
    }

    pub async fn list_cycles(&self, project_id: &str) -> ConnectorResult<Vec<Value>> {
        let body = self
            .get(self.workspace_url(&format!("/projects/{}/cycles/", project_id)))
            .await?;
        Ok(Self::results(body))
    }

    pub async fn create_cycle(&self, project_id: &str, cycle: &Value) -> ConnectorResult<Value> {
        self.post(
            self.workspace_url(&format!("/projects/{}/cycles/", project_id)),
            cycle,
        )
        .await
    }

    pub async fn list_modules(&self, project_id: &str) -> ConnectorResult<Vec<Value>> {
        let body = self
            .get(self.workspace_url(&format!("/projects/{}/modules/", project_id)))
            .await?;
        Ok(Self::results(body))
    }

    pub async fn create_module(&self, project_id: &str, module: &Value) -> ConnectorResult<Value> {
        self.post(
            self.workspace_url(&format!("/projects/{}/modules/", project_id)),
            module,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> PlaneConfig {
        PlaneConfig {
            enabled: true,
            api_url: url,
            api_key: Some("plane-key".to_string()),
            workspace_slug: "omniflow".to_string(),
        }
    }

    #[test]
    fn test_client_requires_key() {
        let config = PlaneConfig {
            enabled: true,
            api_url: "http://localhost:8000".to_string(),
            api_key: None,
            workspace_slug: "omniflow".to_string(),
        };
        assert!(PlaneClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_list_projects_unwraps_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workspaces/omniflow/projects/"))
            .and(header("X-API-Key", "plane-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "p1", "name": "Migration", "identifier": "MIG"},
                    {"id": "p2", "name": "Onboarding", "identifier": "ONB"}
                ]
            })))
            .mount(&server)
            .await;

        let client = PlaneClient::new(&test_config(server.uri())).unwrap();
        let projects = client.list_projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1]["identifier"], "ONB");
    }

    #[tokio::test]
    async fn test_create_issue_posts_to_project_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/workspaces/omniflow/projects/p1/issues/"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"id": "i1", "name": "Fix sync drift"})),
            )
            .mount(&server)
            .await;

        let client = PlaneClient::new(&test_config(server.uri())).unwrap();
        let issue = client
            .create_issue("p1", &json!({"name": "Fix sync drift"}))
            .await
            .unwrap();
        assert_eq!(issue["id"], "i1");
    }

    #[tokio::test]
    async fn test_api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workspaces/omniflow/projects/"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = PlaneClient::new(&test_config(server.uri())).unwrap();
        let err = client.list_projects().await.unwrap_err();
        match err {
            ConnectorError::ExternalApi { status_code, .. } => assert_eq!(status_code, 403),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_names_the_system() {
        let client = PlaneClient::new(&test_config("http://127.0.0.1:9".to_string())).unwrap();
        let err = client.test_connection().await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to connect to Plane:"));
    }
}
