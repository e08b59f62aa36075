//! Configuration for the OmniFlow Connector Hub
//!
//! Layered the usual way: struct defaults, then `CONNECTOR_HUB_*`
//! environment overrides through the config builder, then the well-known
//! bare variables each backing system is configured with in production
//! (`TWENTY_GRAPHQL_URL`, `PLANE_API_URL`, `CARBON_API_KEY`, ...).

use serde::{Deserialize, Serialize};
use url::Url;

/// Main configuration structure for the Connector Hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Tenant served by this hub instance
    pub tenant: TenantConfig,
    /// AI task orchestrator endpoint and polling behavior
    pub orchestrator: OrchestratorConfig,
    /// Twenty CRM connector configuration
    pub twenty: TwentyConfig,
    /// Plane project management connector configuration
    pub plane: PlaneConfig,
    /// Carbon manufacturing connector configuration
    pub carbon: CarbonConfig,
    /// ERPNext accounting connector configuration
    pub erpnext: ErpNextConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
    /// Fallback rate limits for endpoints that declare none
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8010)
    pub port: u16,
    /// Request timeout in seconds (default: 30)
    pub request_timeout: u64,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

/// Tenant identity stamped on every AI task and domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub workspace_id: String,
}

/// AI orchestrator client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base URL of the task orchestrator API
    pub api_url: String,
    /// Bearer token, if the orchestrator requires one
    pub api_token: Option<String>,
    /// Poll behavior for task completion
    pub poll: PollConfig,
}

/// Bounded exponential backoff settings for task polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// First poll interval in milliseconds (default: 1000, never lower)
    pub initial_interval_ms: u64,
    /// Backoff multiplier applied per attempt (default: 2.0)
    pub multiplier: f64,
    /// Interval ceiling in milliseconds (default: 8000)
    pub max_interval_ms: u64,
    /// Overall deadline in milliseconds (default: 60000)
    pub timeout_ms: u64,
}

/// Twenty CRM connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwentyConfig {
    /// Enable the CRM connector
    pub enabled: bool,
    /// GraphQL endpoint
    pub graphql_url: String,
    /// API token
    pub api_token: Option<String>,
}

/// Plane project management connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneConfig {
    /// Enable the project management connector
    pub enabled: bool,
    /// REST base URL
    pub api_url: String,
    /// API key sent as X-API-Key
    pub api_key: Option<String>,
    /// Workspace slug all project paths are scoped to
    pub workspace_slug: String,
}

/// Carbon manufacturing connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonConfig {
    /// Enable the manufacturing connector
    pub enabled: bool,
    /// REST base URL
    pub api_url: String,
    /// Bearer API key
    pub api_key: Option<String>,
}

/// ERPNext accounting connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpNextConfig {
    /// Enable the accounting connector
    pub enabled: bool,
    /// REST base URL
    pub api_url: String,
    /// Token sent as `Authorization: token <key>`
    pub api_key: Option<String>,
    /// Paid-invoice poll interval for the monitor loop, in seconds
    pub invoice_poll_interval: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable the /metrics endpoint
    pub metrics_enabled: bool,
    /// Metrics endpoint path
    pub metrics_path: String,
    /// Health endpoint path
    pub health_path: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty, compact)
    pub log_format: String,
}

/// Rate limiting fallbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    /// Default requests per window for undeclared endpoints
    pub default_limit: u32,
    pub burst_size: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tenant: TenantConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            twenty: TwentyConfig::default(),
            plane: PlaneConfig::default(),
            carbon: CarbonConfig::default(),
            erpnext: ErpNextConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8010,
            request_timeout: 30,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_string(),
            workspace_id: "default".to_string(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8020".to_string(),
            api_token: None,
            poll: PollConfig::default(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            multiplier: 2.0,
            max_interval_ms: 8_000,
            timeout_ms: 60_000,
        }
    }
}

impl Default for TwentyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            graphql_url: "http://localhost:3000/graphql".to_string(),
            api_token: None,
        }
    }
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://localhost:8000".to_string(),
            api_key: None,
            workspace_slug: "default".to_string(),
        }
    }
}

impl Default for CarbonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://localhost:4000".to_string(),
            api_key: None,
        }
    }
}

impl Default for ErpNextConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://localhost:8080".to_string(),
            api_key: None,
            invoice_poll_interval: 60,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            health_path: "/health".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: 100,
            burst_size: 200,
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8010)?
            .set_default("server.request_timeout", 30)?
            .set_default("tenant.tenant_id", "default")?
            .set_default("tenant.workspace_id", "default")?
            .set_default("orchestrator.api_url", "http://localhost:8020")?
            .set_default("orchestrator.poll.initial_interval_ms", 1000)?
            .set_default("orchestrator.poll.multiplier", 2.0)?
            .set_default("orchestrator.poll.max_interval_ms", 8000)?
            .set_default("orchestrator.poll.timeout_ms", 60000)?
            .set_default("twenty.enabled", false)?
            .set_default("twenty.graphql_url", "http://localhost:3000/graphql")?
            .set_default("plane.enabled", false)?
            .set_default("plane.api_url", "http://localhost:8000")?
            .set_default("plane.workspace_slug", "default")?
            .set_default("carbon.enabled", false)?
            .set_default("carbon.api_url", "http://localhost:4000")?
            .set_default("erpnext.enabled", false)?
            .set_default("erpnext.api_url", "http://localhost:8080")?
            .set_default("erpnext.invoice_poll_interval", 60)?
            .set_default("observability.metrics_enabled", true)?
            .set_default("observability.metrics_path", "/metrics")?
            .set_default("observability.health_path", "/health")?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "json")?
            .set_default("rate_limiting.enabled", true)?
            .set_default("rate_limiting.default_limit", 100)?
            .set_default("rate_limiting.burst_size", 200)?
            .add_source(config::Environment::with_prefix("CONNECTOR_HUB").separator("__"));

        // Load from optional config file
        if let Ok(config_path) = std::env::var("CONNECTOR_HUB_CONFIG_FILE") {
            cfg = cfg.add_source(config::File::with_name(&config_path).required(false));
        }

        let mut parsed: Self = cfg.build()?.try_deserialize()?;
        parsed.apply_well_known_env();
        Ok(parsed)
    }

    /// Apply the bare environment variables the backing systems are
    /// conventionally configured with. These win over everything else.
    fn apply_well_known_env(&mut self) {
        if let Ok(url) = std::env::var("TWENTY_GRAPHQL_URL") {
            self.twenty.graphql_url = url;
            self.twenty.enabled = true;
        }
        if let Ok(token) = std::env::var("TWENTY_API_TOKEN") {
            self.twenty.api_token = Some(token);
        }
        if let Ok(url) = std::env::var("PLANE_API_URL") {
            self.plane.api_url = url;
            self.plane.enabled = true;
        }
        if let Ok(key) = std::env::var("PLANE_API_KEY") {
            self.plane.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("CARBON_API_URL") {
            self.carbon.api_url = url;
            self.carbon.enabled = true;
        }
        if let Ok(key) = std::env::var("CARBON_API_KEY") {
            self.carbon.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("ERPNEXT_API_URL") {
            self.erpnext.api_url = url;
            self.erpnext.enabled = true;
        }
        if let Ok(key) = std::env::var("ERPNEXT_API_KEY") {
            self.erpnext.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("ORCHESTRATOR_API_URL") {
            self.orchestrator.api_url = url;
        }
        if let Ok(token) = std::env::var("ORCHESTRATOR_API_TOKEN") {
            self.orchestrator.api_token = Some(token);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.tenant.tenant_id.is_empty() {
            return Err("Tenant id cannot be empty".to_string());
        }

        Url::parse(&self.orchestrator.api_url)
            .map_err(|e| format!("Invalid orchestrator URL: {}", e))?;

        let poll = &self.orchestrator.poll;
        if poll.initial_interval_ms < 1_000 {
            return Err("Poll interval cannot be below 1000ms".to_string());
        }
        if poll.multiplier < 1.0 {
            return Err("Poll multiplier cannot be below 1.0".to_string());
        }
        if poll.max_interval_ms < poll.initial_interval_ms {
            return Err("Poll interval ceiling cannot be below the initial interval".to_string());
        }
        if poll.timeout_ms < poll.initial_interval_ms {
            return Err("Poll timeout cannot be below the initial interval".to_string());
        }

        if self.twenty.enabled {
            Url::parse(&self.twenty.graphql_url)
                .map_err(|e| format!("Invalid Twenty GraphQL URL: {}", e))?;
            if self.twenty.api_token.is_none() {
                return Err("Twenty API token is required when the CRM connector is enabled"
                    .to_string());
            }
        }

        if self.plane.enabled {
            Url::parse(&self.plane.api_url).map_err(|e| format!("Invalid Plane URL: {}", e))?;
            if self.plane.api_key.is_none() {
                return Err(
                    "Plane API key is required when the projects connector is enabled".to_string(),
                );
            }
            if self.plane.workspace_slug.is_empty() {
                return Err("Plane workspace slug cannot be empty".to_string());
            }
        }

        if self.carbon.enabled {
            Url::parse(&self.carbon.api_url).map_err(|e| format!("Invalid Carbon URL: {}", e))?;
            if self.carbon.api_key.is_none() {
                return Err(
                    "Carbon API key is required when the manufacturing connector is enabled"
                        .to_string(),
                );
            }
        }

        if self.erpnext.enabled {
            Url::parse(&self.erpnext.api_url)
                .map_err(|e| format!("Invalid ERPNext URL: {}", e))?;
            if self.erpnext.api_key.is_none() {
                return Err(
                    "ERPNext API key is required when the accounting connector is enabled"
                        .to_string(),
                );
            }
        }

        if self.rate_limiting.default_limit < 15 || self.rate_limiting.default_limit > 200 {
            return Err("Default rate limit must be between 15 and 200".to_string());
        }

        Ok(())
    }

    /// Names of the connectors this configuration enables
    pub fn enabled_connectors(&self) -> Vec<&'static str> {
        let mut enabled = Vec::new();
        if self.twenty.enabled {
            enabled.push("twenty-crm");
        }
        if self.plane.enabled {
            enabled.push("plane-projects");
        }
        if self.carbon.enabled {
            enabled.push("carbon-manufacturing");
        }
        if self.erpnext.enabled {
            enabled.push("erpnext-accounting");
        }
        enabled
    }
}
