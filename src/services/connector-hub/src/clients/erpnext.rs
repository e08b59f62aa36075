//! REST client for ERPNext
//!
//! ERPNext exposes doctypes under `/api/resource/{doctype}` with responses
//! wrapped in a `{"data": ...}` envelope, plus RPC-style methods under
//! `/api/method/`. Auth is the `token <key>` scheme.

use serde_json::{json, Value};
use tracing::debug;

use crate::config::ErpNextConfig;
use crate::error::{ConnectorError, ConnectorResult};

use super::{build_http_client, check_response};

const SYSTEM: &str = "erpnext";
const SYSTEM_LABEL: &str = "ERPNext";

/// Client for the ERPNext REST API
pub struct ErpNextClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ErpNextClient {
    pub fn new(config: &ErpNextConfig) -> ConnectorResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConnectorError::configuration("ERPNext API key is required"))?;
        Ok(Self {
            http: build_http_client(30)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.api_key)
    }

    fn resource_url(&self, doctype: &str) -> String {
        format!("{}/api/resource/{}", self.base_url, doctype)
    }

    async fn get(&self, url: String, query: &[(&str, String)]) -> ConnectorResult<Value> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await?;
        let body: Value = check_response(SYSTEM, response).await?.json().await?;
        Ok(body["data"].clone())
    }

    async fn post(&self, url: String, body: &Value) -> ConnectorResult<Value> {
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;
        let body: Value = check_response(SYSTEM, response).await?.json().await?;
        Ok(body["data"].clone())
    }

    /// Probe ERPNext's ping method. Failures surface as connection errors
    /// naming the system.
    pub async fn test_connection(&self) -> ConnectorResult<()> {
        let response = self
            .http
            .get(format!("{}/api/method/ping", self.base_url))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed(SYSTEM_LABEL, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(
                SYSTEM_LABEL,
                format!("status {}", response.status().as_u16()),
            ));
        }
        debug!("ERPNext reachable");
        Ok(())
    }

    /// Invoices filtered by status ("Paid", "Overdue", ...), newest first
    pub async fn list_invoices(&self, status: Option<&str>) -> ConnectorResult<Vec<Value>> {
        let mut query = vec![
            (
                "fields",
                r#"["name","customer","grand_total","outstanding_amount","status","due_date","posting_date"]"#.to_string(),
            ),
            ("order_by", "modified desc".to_string()),
        ];
        if let Some(status) = status {
            query.push(("filters", format!(r#"[["status","=","{}"]]"#, status)));
        }
        let data = self
            .get(self.resource_url("Sales Invoice"), &query)
            .await?;
        Ok(data.as_array().cloned().unwrap_or_default())
    }

    pub async fn get_invoice(&self, name: &str) -> ConnectorResult<Value> {
        self.get(
            format!("{}/{}", self.resource_url("Sales Invoice"), name),
            &[],
        )
        .await
    }

    pub async fn create_invoice(&self, invoice: &Value) -> ConnectorResult<Value> {
        self.post(self.resource_url("Sales Invoice"), invoice).await
    }

    pub async fn list_employees(&self) -> ConnectorResult<Vec<Value>> {
        let data = self
            .get(
                self.resource_url("Employee"),
                &[(
                    "fields",
                    r#"["name","employee_number","first_name","last_name","department","grade","date_of_joining"]"#
                        .to_string(),
                )],
            )
            .await?;
        Ok(data.as_array().cloned().unwrap_or_default())
    }

    pub async fn create_customer(&self, customer: &Value) -> ConnectorResult<Value> {
        self.post(self.resource_url("Customer"), customer).await
    }

    /// Monthly salary components for one employee, used by payroll analysis
    pub async fn get_salary_structure(&self, employee: &str) -> ConnectorResult<Value> {
        self.get(
            self.resource_url("Salary Structure Assignment"),
            &[(
                "filters",
                format!(r#"[["employee","=","{}"]]"#, employee),
            )],
        )
        .await
    }

    /// General ledger totals per month, used by the revenue forecast
    pub async fn monthly_totals(&self, account_type: &str, months: u32) -> ConnectorResult<Value> {
        let response = self
            .http
            .post(format!(
                "{}/api/method/omniflow.monthly_totals",
                self.base_url
            ))
            .header("Authorization", self.auth_header())
            .json(&json!({"account_type": account_type, "months": months}))
            .send()
            .await?;
        let body: Value = check_response(SYSTEM, response).await?.json().await?;
        Ok(body["message"].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> ErpNextConfig {
        ErpNextConfig {
            enabled: true,
            api_url: url,
            api_key: Some("erp-key".to_string()),
            invoice_poll_interval: 60,
        }
    }

    #[tokio::test]
    async fn test_list_invoices_unwraps_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resource/Sales%20Invoice"))
            .and(header("Authorization", "token erp-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"name": "SINV-001", "customer": "Acme", "grand_total": 1200.0, "status": "Paid"}
                ]
            })))
            .mount(&server)
            .await;

        let client = ErpNextClient::new(&test_config(server.uri())).unwrap();
        let invoices = client.list_invoices(None).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0]["name"], "SINV-001");
    }

    #[tokio::test]
    async fn test_paid_filter_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resource/Sales%20Invoice"))
            .and(query_param("filters", r#"[["status","=","Paid"]]"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let client = ErpNextClient::new(&test_config(server.uri())).unwrap();
        let invoices = client.list_invoices(Some("Paid")).await.unwrap();
        assert!(invoices.is_empty());
    }

    #[tokio::test]
    async fn test_create_customer_returns_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/resource/Customer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"name": "CUST-0001", "customer_name": "Acme"}
            })))
            .mount(&server)
            .await;

        let client = ErpNextClient::new(&test_config(server.uri())).unwrap();
        let customer = client
            .create_customer(&json!({"customer_name": "Acme"}))
            .await
            .unwrap();
        assert_eq!(customer["name"], "CUST-0001");
    }

    #[tokio::test]
    async fn test_connection_failure_names_the_system() {
        let client = ErpNextClient::new(&test_config("http://127.0.0.1:9".to_string())).unwrap();
        let err = client.test_connection().await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to connect to ERPNext:"));
    }
}
