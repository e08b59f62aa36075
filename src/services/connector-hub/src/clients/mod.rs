//! HTTP and GraphQL clients for the backing systems
//!
//! One thin client per external system: Twenty CRM (GraphQL), Plane and
//! Carbon (REST), ERPNext (REST). Clients speak the external wire shapes
//! only; translation to canonical entities happens in the mapping layer.

pub mod carbon;
pub mod erpnext;
pub mod plane;
pub mod twenty;

pub use carbon::CarbonClient;
pub use erpnext::ErpNextClient;
pub use plane::PlaneClient;
pub use twenty::TwentyClient;

use crate::error::{ConnectorError, ConnectorResult};

const USER_AGENT: &str = "OmniFlow-Connector-Hub/1.0";

/// Shared reqwest client builder for all system clients
pub(crate) fn build_http_client(timeout_secs: u64) -> ConnectorResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ConnectorError::internal(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into an external API error carrying the body
pub(crate) async fn check_response(
    system: &str,
    response: reqwest::Response,
) -> ConnectorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::external_api(
        system,
        status.as_u16(),
        body,
    ))
}
