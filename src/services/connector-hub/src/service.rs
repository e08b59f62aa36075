//! Service bootstrap for the connector hub
//!
//! Builds the event bus, orchestrator client and every enabled connector,
//! registers them with the registry, then serves the HTTP surface with a
//! graceful shutdown that walks the fleet back down.

use crate::config::HubConfig;
use crate::connectors::{
    CarbonManufacturingConnector, ErpNextConnector, PlaneProjectsConnector, TwentyCrmConnector,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::EventBus;
use crate::handlers::create_routes;
use crate::metrics::HubMetrics;
use crate::registry::ConnectorRegistry;
use crate::tasks::{HttpOrchestrator, TaskClient};
use axum::http::{HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use omniflow_shared::TenantContext;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestId, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Main connector hub service
pub struct ConnectorHubService {
    config: HubConfig,
    app_state: Arc<AppState>,
    addr: SocketAddr,
}

/// Application state shared across handlers
pub struct AppState {
    pub config: HubConfig,
    pub registry: ConnectorRegistry,
    pub bus: Arc<EventBus>,
    pub orchestrator: Arc<TaskClient>,
    pub metrics: Arc<HubMetrics>,
    pub started_at: DateTime<Utc>,
    /// Typed handles for the endpoint handlers; `None` when disabled
    pub crm: Option<Arc<TwentyCrmConnector>>,
    pub projects: Option<Arc<PlaneProjectsConnector>>,
    pub manufacturing: Option<Arc<CarbonManufacturingConnector>>,
    pub erp: Option<Arc<ErpNextConnector>>,
}

/// Request ID generator for the tracing middleware
#[derive(Clone, Default)]
struct HubMakeRequestId;

impl MakeRequestId for HubMakeRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = format!("req-{}", Uuid::new_v4());
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

impl ConnectorHubService {
    /// Create a new connector hub service
    pub async fn new(config: HubConfig) -> ConnectorResult<Self> {
        info!("Initializing OmniFlow Connector Hub");

        config.validate().map_err(ConnectorError::configuration)?;

        let tenant = TenantContext::new(
            config.tenant.tenant_id.as_str(),
            config.tenant.workspace_id.as_str(),
        );

        let bus = Arc::new(EventBus::new());
        let orchestrator = Arc::new(TaskClient::new(
            Arc::new(HttpOrchestrator::new(&config.orchestrator)?),
            config.orchestrator.poll.clone(),
        ));
        let metrics = Arc::new(HubMetrics::new(bus.clone()));
        let registry = ConnectorRegistry::new();

        let mut crm = None;
        if config.twenty.enabled {
            let connector = Arc::new(TwentyCrmConnector::new(
                &config.twenty,
                orchestrator.clone(),
                bus.clone(),
                tenant.clone(),
            )?);
            registry.register(connector.clone()).await?;
            crm = Some(connector);
        }

        let mut projects = None;
        if config.plane.enabled {
            let connector = Arc::new(PlaneProjectsConnector::new(
                &config.plane,
                orchestrator.clone(),
                bus.clone(),
                tenant.clone(),
            )?);
            registry.register(connector.clone()).await?;
            projects = Some(connector);
        }

        let mut manufacturing = None;
        if config.carbon.enabled {
            let connector = Arc::new(CarbonManufacturingConnector::new(
                &config.carbon,
                orchestrator.clone(),
                bus.clone(),
                tenant.clone(),
            )?);
            registry.register(connector.clone()).await?;
            manufacturing = Some(connector);
        }

        let mut erp = None;
        if config.erpnext.enabled {
            let connector = Arc::new(ErpNextConnector::new(
                &config.erpnext,
                bus.clone(),
                tenant.clone(),
            )?);
            registry.register(connector.clone()).await?;
            erp = Some(connector);
        }

        if registry.is_empty().await {
            warn!("No connectors enabled");
        } else {
            info!(count = registry.len().await, "Connectors registered");
        }

        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| ConnectorError::configuration(format!("Invalid server address: {}", e)))?;

        let app_state = Arc::new(AppState {
            config: config.clone(),
            registry,
            bus,
            orchestrator,
            metrics,
            started_at: Utc::now(),
            crm,
            projects,
            manufacturing,
            erp,
        });

        Ok(Self {
            config,
            app_state,
            addr,
        })
    }

    /// Shared application state
    pub fn state(&self) -> Arc<AppState> {
        self.app_state.clone()
    }

    /// Bring the fleet up and serve until a shutdown signal arrives
    pub async fn start(self) -> ConnectorResult<()> {
        info!("Starting OmniFlow Connector Hub on {}", self.addr);

        let initialized = self.app_state.registry.initialize_all().await;
        if !initialized.all_succeeded() {
            warn!(failures = ?initialized.failures, "Some connectors failed to initialize");
        }
        let activated = self.app_state.registry.activate_all().await;
        if !activated.all_succeeded() {
            warn!(failures = ?activated.failures, "Some connectors failed to activate");
        }

        let cors = if self.config.server.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .config
                .server
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let middleware = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static("x-request-id"),
                HubMakeRequestId,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout,
            )))
            .layer(cors);

        let app = create_routes(self.app_state.clone()).layer(middleware);

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ConnectorError::internal(format!("Failed to bind to address: {}", e)))?;

        info!("Connector hub started successfully on {}", self.addr);

        if let Err(e) = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
        {
            error!("Server error: {}", e);
            return Err(ConnectorError::internal(format!("Server error: {}", e)));
        }

        info!("Shutting down connectors");
        let deactivated = self.app_state.registry.deactivate_all().await;
        if !deactivated.all_succeeded() {
            warn!(failures = ?deactivated.failures, "Some connectors failed to deactivate");
        }
        let destroyed = self.app_state.registry.destroy_all().await;
        if !destroyed.all_succeeded() {
            warn!(failures = ?destroyed.failures, "Some connectors failed to destroy");
        }

        info!("Connector hub stopped gracefully");
        Ok(())
    }

    /// Wait for shutdown signal
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = terminate => {
                info!("Received terminate signal, shutting down");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_creation_with_defaults() {
        let service = ConnectorHubService::new(HubConfig::default())
            .await
            .unwrap();
        let state = service.state();

        assert!(state.registry.is_empty().await);
        assert!(state.crm.is_none());
        assert!(state.erp.is_none());
        assert_eq!(service.addr.to_string(), "0.0.0.0:8010");
    }

    #[tokio::test]
    async fn test_enabled_connectors_are_registered() {
        let mut config = HubConfig::default();
        config.twenty.enabled = true;
        config.twenty.api_token = Some("token".to_string());
        config.erpnext.enabled = true;
        config.erpnext.api_key = Some("key".to_string());

        let service = ConnectorHubService::new(config).await.unwrap();
        let state = service.state();

        assert_eq!(state.registry.len().await, 2);
        assert!(state.crm.is_some());
        assert!(state.erp.is_some());
        assert!(state.projects.is_none());
        assert!(state.manufacturing.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = HubConfig::default();
        config.server.port = 0;

        let result = ConnectorHubService::new(config).await;
        assert!(matches!(
            result,
            Err(ConnectorError::Configuration { .. })
        ));
    }
}
