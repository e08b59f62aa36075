//! HTTP surface of the connector hub
//!
//! Health and metrics endpoints, fleet introspection under
//! `/api/v1/connectors`, and one route per declared connector endpoint.
//! Every route a connector publishes in its descriptor is mounted here
//! with the same path and method.

use crate::analysis::{BomAnalysis, FinancialForecast, ForecastInput, PayrollInput, PayrollRun};
use crate::connectors::{
    ChurnPrediction, CompletionForecast, LeadScore, MaintenancePrediction, ProductionPlan,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::lifecycle::ConnectorSnapshot;
use crate::service::AppState;
use crate::{HealthStatus, SERVICE_NAME, VERSION};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use omniflow_shared::{EntityKind, ModuleKind, SyncBatch, SyncDirection, SyncReport};

/// Create all routes for the connector hub
pub fn create_routes(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health and monitoring endpoints
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/live", get(liveness_check))
        // Fleet introspection
        .route("/api/v1/connectors", get(list_connectors))
        .route("/api/v1/connectors/:module/status", get(connector_status))
        .route("/api/v1/connectors/:module/sync", post(sync_connector))
        // CRM endpoints
        .route("/api/v1/crm/companies", get(list_companies))
        .route("/api/v1/crm/ai/lead-score", post(lead_score))
        .route("/api/v1/crm/ai/churn", post(churn_prediction))
        .route("/api/v1/crm/sentiment", post(note_sentiment))
        // Project management endpoints
        .route("/api/v1/projects/ai/completion", post(completion_forecast))
        .route("/api/v1/projects/ai/optimize", post(workflow_optimization))
        // Manufacturing endpoints
        .route("/api/v1/manufacturing/ai/production", post(production_plan))
        .route(
            "/api/v1/manufacturing/ai/maintenance",
            post(maintenance_prediction),
        )
        .route("/api/v1/manufacturing/bom/analyze", post(bom_analysis))
        // Accounting endpoints
        .route("/api/v1/erp/payroll/run", post(payroll_run))
        .route("/api/v1/erp/forecast", post(financial_forecast));

    if state.config.observability.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.with_state(state)
}

/// Run one connector operation and record its outcome in the hub metrics
async fn track<T>(
    state: &AppState,
    module: ModuleKind,
    operation: impl Future<Output = ConnectorResult<T>>,
) -> ConnectorResult<T> {
    let started = Instant::now();
    let result = operation.await;
    match &result {
        Ok(_) => state
            .metrics
            .record_success(module, started.elapsed().as_millis() as u64),
        Err(e) => state.metrics.record_failure(module, e.error_code()),
    }
    result
}

fn parse_module(raw: &str) -> ConnectorResult<ModuleKind> {
    raw.parse::<ModuleKind>()
        .map_err(|e| ConnectorError::validation("module", e))
}

fn disabled(connector: &str) -> ConnectorError {
    ConnectorError::service_unavailable(connector)
}

// ============================================================================
// HEALTH AND METRICS
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");

    let connectors = state.registry.health().await;
    let total = connectors.len();
    let healthy = connectors.values().filter(|h| **h).count();

    let status = if total == 0 || healthy == total {
        "healthy"
    } else if healthy > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    let response = HealthStatus {
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        status: status.to_string(),
        timestamp: Utc::now(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        connectors,
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

/// Readiness check endpoint (for Kubernetes)
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Ready once at least one connector answers its health probe
    let ready = state.registry.health().await.values().any(|healthy| *healthy);

    if ready {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not ready"})),
        )
    }
}

/// Liveness check endpoint (for Kubernetes)
async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "alive"})))
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.to_prometheus_format(),
    )
}

// ============================================================================
// FLEET INTROSPECTION
// ============================================================================

/// List every registered connector with live status folded in
async fn list_connectors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connectors = state.registry.descriptors().await;
    Json(json!({
        "count": connectors.len(),
        "connectors": connectors,
    }))
}

/// Status snapshot for one module's connector
async fn connector_status(
    Path(module): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectorSnapshot>, ConnectorError> {
    let module = parse_module(&module)?;
    let connector = state
        .registry
        .get(module)
        .await
        .ok_or_else(|| ConnectorError::not_found(format!("Connector for module {}", module)))?;
    Ok(Json(connector.snapshot().await))
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    direction: SyncDirection,
    kind: EntityKind,
    #[serde(default)]
    records: Vec<Value>,
}

/// Run a sync pass on one module's connector
async fn sync_connector(
    Path(module): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncReport>, ConnectorError> {
    let module = parse_module(&module)?;
    let batch = SyncBatch::new(body.kind, body.records);
    let report = track(
        &state,
        module,
        state.registry.sync(module, body.direction, batch),
    )
    .await?;
    Ok(Json(report))
}

// ============================================================================
// CRM
// ============================================================================

#[derive(Debug, Deserialize)]
struct CompanyQuery {
    limit: Option<u32>,
}

async fn list_companies(
    Query(query): Query<CompanyQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ConnectorError> {
    let crm = state.crm.as_ref().ok_or_else(|| disabled("twenty-crm"))?;
    let companies = track(
        &state,
        ModuleKind::Crm,
        crm.list_companies(query.limit.unwrap_or(50)),
    )
    .await?;
    Ok(Json(json!({
        "count": companies.len(),
        "companies": companies,
    })))
}

#[derive(Debug, Deserialize)]
struct LeadScoreRequest {
    company_id: String,
}

async fn lead_score(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LeadScoreRequest>,
) -> Result<Json<LeadScore>, ConnectorError> {
    let crm = state.crm.as_ref().ok_or_else(|| disabled("twenty-crm"))?;
    let score = track(
        &state,
        ModuleKind::Crm,
        crm.calculate_lead_score(&body.company_id),
    )
    .await?;
    Ok(Json(score))
}

#[derive(Debug, Deserialize)]
struct ChurnRequest {
    customer_id: String,
}

async fn churn_prediction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChurnRequest>,
) -> Result<Json<ChurnPrediction>, ConnectorError> {
    let crm = state.crm.as_ref().ok_or_else(|| disabled("twenty-crm"))?;
    let prediction = track(
        &state,
        ModuleKind::Crm,
        crm.predict_churn(&body.customer_id),
    )
    .await?;
    Ok(Json(prediction))
}

#[derive(Debug, Deserialize)]
struct SentimentRequest {
    text: String,
}

async fn note_sentiment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SentimentRequest>,
) -> Result<Json<crate::analysis::SentimentReport>, ConnectorError> {
    let crm = state.crm.as_ref().ok_or_else(|| disabled("twenty-crm"))?;
    let report = track(&state, ModuleKind::Crm, async {
        crm.analyze_note_sentiment(&body.text)
    })
    .await?;
    Ok(Json(report))
}

// ============================================================================
// PROJECT MANAGEMENT
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProjectRequest {
    project_id: String,
}

async fn completion_forecast(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProjectRequest>,
) -> Result<Json<CompletionForecast>, ConnectorError> {
    let projects = state
        .projects
        .as_ref()
        .ok_or_else(|| disabled("plane-projects"))?;
    let forecast = track(
        &state,
        ModuleKind::ProjectManagement,
        projects.predict_completion(&body.project_id),
    )
    .await?;
    Ok(Json(forecast))
}

async fn workflow_optimization(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProjectRequest>,
) -> Result<Json<Value>, ConnectorError> {
    let projects = state
        .projects
        .as_ref()
        .ok_or_else(|| disabled("plane-projects"))?;
    let suggestions = track(
        &state,
        ModuleKind::ProjectManagement,
        projects.optimize_workflow(&body.project_id),
    )
    .await?;
    Ok(Json(json!({
        "project_id": body.project_id,
        "count": suggestions.len(),
        "suggestions": suggestions,
    })))
}

// ============================================================================
// MANUFACTURING
// ============================================================================

async fn production_plan(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProductionPlan>, ConnectorError> {
    let manufacturing = state
        .manufacturing
        .as_ref()
        .ok_or_else(|| disabled("carbon-manufacturing"))?;
    let plan = track(
        &state,
        ModuleKind::Manufacturing,
        manufacturing.optimize_production(),
    )
    .await?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
struct MaintenanceRequest {
    equipment_id: String,
}

async fn maintenance_prediction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MaintenanceRequest>,
) -> Result<Json<MaintenancePrediction>, ConnectorError> {
    let manufacturing = state
        .manufacturing
        .as_ref()
        .ok_or_else(|| disabled("carbon-manufacturing"))?;
    let prediction = track(
        &state,
        ModuleKind::Manufacturing,
        manufacturing.predict_maintenance(&body.equipment_id),
    )
    .await?;
    Ok(Json(prediction))
}

#[derive(Debug, Deserialize)]
struct BomAnalyzeRequest {
    product_id: String,
    annual_volume: Option<f64>,
}

async fn bom_analysis(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BomAnalyzeRequest>,
) -> Result<Json<BomAnalysis>, ConnectorError> {
    let manufacturing = state
        .manufacturing
        .as_ref()
        .ok_or_else(|| disabled("carbon-manufacturing"))?;
    let analysis = track(
        &state,
        ModuleKind::Manufacturing,
        manufacturing.analyze_bill_of_materials(&body.product_id, body.annual_volume),
    )
    .await?;
    Ok(Json(analysis))
}

// ============================================================================
// ACCOUNTING
// ============================================================================

async fn payroll_run(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PayrollInput>,
) -> Result<Json<PayrollRun>, ConnectorError> {
    let erp = state
        .erp
        .as_ref()
        .ok_or_else(|| disabled("erpnext-accounting"))?;
    let run = track(&state, ModuleKind::Accounting, erp.run_payroll(input)).await?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
struct ForecastRequest {
    #[serde(default)]
    input: Option<ForecastInput>,
    horizon_months: u32,
}

async fn financial_forecast(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForecastRequest>,
) -> Result<Json<FinancialForecast>, ConnectorError> {
    let erp = state
        .erp
        .as_ref()
        .ok_or_else(|| disabled("erpnext-accounting"))?;
    let forecast = track(
        &state,
        ModuleKind::Accounting,
        erp.forecast_financials(body.input, body.horizon_months),
    )
    .await?;
    Ok(Json(forecast))
}
