//! # OmniFlow Connector Hub
//!
//! Connector hub for the OmniFlow platform: one service that hosts the
//! Twenty (CRM), Plane (project management), Carbon (manufacturing) and
//! ERPNext (accounting) connectors behind a single HTTP surface.
//!
//! ## Features
//!
//! - **Plugin lifecycle**: initialize/activate/deactivate/destroy with a
//!   typed status machine and per-connector error capture
//! - **AI delegation**: lead scoring, churn and maintenance prediction,
//!   completion forecasting and production planning through the task
//!   orchestrator, with bounded polling and cancellation
//! - **Cross-module events**: an in-process bus that routes domain events
//!   between connectors (won opportunity -> project -> work order -> invoice)
//! - **Declarative mapping**: per-entity field catalogs translating between
//!   canonical records and each backing system's shape
//! - **Local analysis**: sentiment, payroll, BOM costing and financial
//!   forecasts computed in-process on fetched data
//! - **Observability**: structured logs, request metrics and Prometheus
//!   exposition
//!
//! ## Usage
//!
//! ```rust,no_run
//! use connector_hub::{ConnectorHubService, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HubConfig::from_env()?;
//!     let service = ConnectorHubService::new(config).await?;
//!     service.start().await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod clients;
pub mod config;
pub mod connectors;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lifecycle;
pub mod mapping;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod tasks;

// Re-export main types for easier usage
pub use config::HubConfig;
pub use connectors::{
    CarbonManufacturingConnector, ErpNextConnector, PlaneProjectsConnector, TwentyCrmConnector,
};
pub use error::{ConnectorError, ConnectorResult};
pub use events::{EventBus, SubscriptionSpec};
pub use lifecycle::{Connector, ConnectorSnapshot, ManagedConnector};
pub use metrics::HubMetrics;
pub use registry::{ConnectorRegistry, LifecyclePass};
pub use service::{AppState, ConnectorHubService};
pub use tasks::{HttpOrchestrator, OrchestratorApi, TaskClient};

/// Version information for the connector hub
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "connector-hub";

/// Health check information
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub service: String,
    pub version: String,
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    pub connectors: std::collections::BTreeMap<String, bool>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            version: VERSION.to_string(),
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
            uptime_seconds: 0,
            connectors: std::collections::BTreeMap::new(),
        }
    }

    pub fn with_connector_status(mut self, name: &str, healthy: bool) -> Self {
        self.connectors.insert(name.to_string(), healthy);
        self
    }
}
