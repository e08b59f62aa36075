//! Main binary entry point for the OmniFlow Connector Hub
//!
//! Hosts the Twenty, Plane, Carbon and ERPNext connectors behind one HTTP
//! surface: plugin lifecycle, data sync, AI task delegation and the
//! cross-module event bus.

use connector_hub::{ConnectorHubService, HubConfig};
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize tracing: {}", e);
        process::exit(1);
    }

    info!(
        "Starting OmniFlow Connector Hub v{}",
        connector_hub::VERSION
    );

    // Load configuration
    let config = match HubConfig::from_env() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        process::exit(1);
    }

    log_startup(&config);

    // Create and start the service
    let service = match ConnectorHubService::new(config).await {
        Ok(service) => {
            info!("Connector hub initialized successfully");
            service
        }
        Err(e) => {
            error!("Failed to initialize service: {}", e);
            process::exit(1);
        }
    };

    // Start the service (this blocks until shutdown)
    if let Err(e) = service.start().await {
        error!("Service error: {}", e);
        process::exit(1);
    }

    info!("OmniFlow Connector Hub shutdown complete");
}

/// Initialize tracing/logging
fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let log_level =
        std::env::var("CONNECTOR_HUB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format =
        std::env::var("CONNECTOR_HUB_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_new(&log_level).or_else(|_| EnvFilter::try_new("info"))?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        "pretty" | "text" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_file(true)
                        .with_line_number(true)
                        .with_target(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
    }

    Ok(())
}

/// Log the startup banner: enabled connectors and observability settings
fn log_startup(config: &HubConfig) {
    let enabled = config.enabled_connectors();
    if enabled.is_empty() {
        warn!("No connectors are enabled");
    } else {
        info!("Enabled connectors: {}", enabled.join(", "));
    }

    info!("AI orchestrator: {}", config.orchestrator.api_url);
    info!(
        "Tenant: {} (workspace {})",
        config.tenant.tenant_id, config.tenant.workspace_id
    );

    if config.observability.metrics_enabled {
        info!(
            "Metrics collection: enabled at {}",
            config.observability.metrics_path
        );
    }

    if config.rate_limiting.enabled {
        info!(
            "Rate limiting: {} req/window (burst: {})",
            config.rate_limiting.default_limit, config.rate_limiting.burst_size
        );
    } else {
        info!("Rate limiting: disabled");
    }
}
