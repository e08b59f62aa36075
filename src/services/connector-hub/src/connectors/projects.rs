//! Plane project management connector
//!
//! Bridges the Plane REST API into the hub as the project management
//! module: project, issue, cycle and module sync through the project
//! mapping catalog, AI completion forecasting and workflow optimization,
//! plus reactions to won opportunities and completed work orders.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omniflow_shared::{
    AiTaskRequest, ApiEndpointSpec, DomainEvent, EntityContext, EntityKind, EventKind, HttpMethod,
    ModuleKind, PluginCapabilities, PluginDescriptor, PluginRuntimeConfig, PluginStatus, SyncBatch,
    SyncDirection, SyncReport, TaskResult, TaskType, TenantContext, WebhookSpec,
};

use crate::clients::PlaneClient;
use crate::config::PlaneConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::{EventBus, SubscriptionSpec};
use crate::lifecycle::Connector;
use crate::mapping::{catalog_for, DataMappingConfig};
use crate::tasks::TaskClient;

use super::{accept_inbound, prepare_outbound, string_list, CONNECTOR_VERSION};

const PLUGIN_ID: &str = "plane-projects";
const PLUGIN_NAME: &str = "Plane Projects Connector";

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Result of an AI completion forecast round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionForecast {
    pub expected_date: DateTime<Utc>,
    pub confidence: f64,
    pub risk_factors: Vec<String>,
}

/// One workflow improvement proposed by the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSuggestion {
    pub area: String,
    pub action: String,
    pub expected_impact: String,
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// Project management module connector backed by Plane
pub struct PlaneProjectsConnector {
    client: Arc<PlaneClient>,
    tasks: Arc<TaskClient>,
    bus: Arc<EventBus>,
    tenant: TenantContext,
    mapping: DataMappingConfig,
    /// Last completion forecast per project id
    forecasts: Arc<DashMap<String, CompletionForecast>>,
    cancel: CancellationToken,
}

impl PlaneProjectsConnector {
    pub fn new(
        config: &PlaneConfig,
        tasks: Arc<TaskClient>,
        bus: Arc<EventBus>,
        tenant: TenantContext,
    ) -> ConnectorResult<Self> {
        Ok(Self {
            client: Arc::new(PlaneClient::new(config)?),
            tasks,
            bus,
            tenant,
            mapping: catalog_for(ModuleKind::ProjectManagement),
            forecasts: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Last stored forecast for a project, if one was computed
    pub fn completion_forecast(&self, project_id: &str) -> Option<CompletionForecast> {
        self.forecasts.get(project_id).map(|e| e.clone())
    }

    // ========================================================================
    // AI OPERATIONS
    // ========================================================================

    /// Forecast when a project will complete.
    ///
    /// Issue and cycle counts are condensed into features; the orchestrator
    /// returns the expected date. The forecast is kept for later reads.
    pub async fn predict_completion(&self, project_id: &str) -> ConnectorResult<CompletionForecast> {
        let issues = self.client.list_issues(project_id).await?;
        let cycles = self.client.list_cycles(project_id).await?;

        let total = issues.len();
        let completed = issues.iter().filter(|i| i["state"] == "Done").count();
        let cancelled = issues.iter().filter(|i| i["state"] == "Cancelled").count();
        let open = total.saturating_sub(completed + cancelled);
        let velocity = completed as f64 / cycles.len().max(1) as f64;

        let payload = json!({
            "project_id": project_id,
            "total_issues": total,
            "open_issues": open,
            "completed_issues": completed,
            "cycle_count": cycles.len(),
            "cycle_velocity": velocity,
        });
        let request = AiTaskRequest::new(
            TaskType::CompletionForecast,
            payload,
            self.tenant.tenant_id.as_str(),
            self.tenant.workspace_id.as_str(),
        )
        .with_context(EntityContext::for_entity(EntityKind::Project, project_id));

        let result = self.tasks.execute(request, &self.cancel).await?;
        let forecast = parse_forecast(&result)?;

        self.forecasts
            .insert(project_id.to_string(), forecast.clone());
        info!(project = project_id, expected = %forecast.expected_date, "Completion forecast stored");
        Ok(forecast)
    }

    /// Ask the orchestrator for workflow improvements on a project
    pub async fn optimize_workflow(
        &self,
        project_id: &str,
    ) -> ConnectorResult<Vec<WorkflowSuggestion>> {
        let issues = self.client.list_issues(project_id).await?;

        let mut state_counts: BTreeMap<String, u64> = BTreeMap::new();
        for issue in &issues {
            if let Some(state) = issue["state"].as_str() {
                *state_counts.entry(state.to_string()).or_insert(0) += 1;
            }
        }

        let payload = json!({
            "project_id": project_id,
            "total_issues": issues.len(),
            "state_counts": state_counts,
        });
        let request = AiTaskRequest::new(
            TaskType::WorkflowOptimization,
            payload,
            self.tenant.tenant_id.as_str(),
            self.tenant.workspace_id.as_str(),
        )
        .with_context(EntityContext::for_entity(EntityKind::Project, project_id));

        let result = self.tasks.execute(request, &self.cancel).await?;
        let suggestions: Vec<WorkflowSuggestion> =
            serde_json::from_value(result.data["suggestions"].clone()).map_err(|_| {
                ConnectorError::task_failed(
                    "Workflow optimization",
                    Some("Response carries no suggestions".to_string()),
                )
            })?;
        info!(
            project = project_id,
            count = suggestions.len(),
            "Workflow suggestions received"
        );
        Ok(suggestions)
    }

    // ========================================================================
    // EVENT HANDLERS
    // ========================================================================

    async fn register_event_handlers(&self) -> ConnectorResult<()> {
        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "projects.opportunity-won".to_string(),
                    label: "Open a delivery project for won opportunities".to_string(),
                    channel: ModuleKind::Crm,
                    events: vec![EventKind::OpportunityWon],
                    owner: ModuleKind::ProjectManagement,
                },
                opportunity_won_handler(self.client.clone()),
            )
            .await?;

        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "projects.work-order-completed".to_string(),
                    label: "Close the issue linked to a finished work order".to_string(),
                    channel: ModuleKind::Manufacturing,
                    events: vec![EventKind::WorkOrderCompleted],
                    owner: ModuleKind::ProjectManagement,
                },
                work_order_completed_handler(self.client.clone()),
            )
            .await?;

        Ok(())
    }

    async fn push_record(&self, kind: EntityKind, record: &Value) -> ConnectorResult<()> {
        let external = prepare_outbound(&self.mapping, kind, record)?;
        match kind {
            EntityKind::Project => {
                self.client.create_project(&external).await?;
            }
            EntityKind::Issue => {
                let project_id = require_project_id(record)?;
                self.client.create_issue(project_id, &external).await?;
            }
            EntityKind::Cycle => {
                let project_id = require_project_id(record)?;
                self.client.create_cycle(project_id, &external).await?;
            }
            EntityKind::ProjectModule => {
                let project_id = require_project_id(record)?;
                self.client.create_module(project_id, &external).await?;
            }
            other => {
                return Err(ConnectorError::mapping(
                    other.as_str(),
                    "No outbound writer for this entity kind",
                ))
            }
        }
        Ok(())
    }
}

fn require_project_id(record: &Value) -> ConnectorResult<&str> {
    record["project_id"]
        .as_str()
        .ok_or_else(|| ConnectorError::validation("project_id", "Record requires field 'project_id'"))
}

/// Open a delivery project when the CRM closes a deal
fn opportunity_won_handler(
    client: Arc<PlaneClient>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let client = client.clone();
        Box::pin(async move {
            let Some(opportunity_id) = event.payload["opportunity_id"].as_str() else {
                debug!("Won opportunity event without id, skipping");
                return Ok(());
            };
            let name = match event.payload["name"].as_str() {
                Some(name) => format!("Delivery: {}", name),
                None => format!("Delivery for opportunity {}", opportunity_id),
            };
            let project = client
                .create_project(&json!({
                    "name": name,
                    "description": format!("Delivery project for won opportunity {}", opportunity_id),
                }))
                .await?;
            info!(
                opportunity = opportunity_id,
                project = project["id"].as_str().unwrap_or("unknown"),
                "Delivery project opened"
            );
            Ok(())
        })
    }
}

/// Close the linked issue when manufacturing finishes a work order
fn work_order_completed_handler(
    client: Arc<PlaneClient>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let client = client.clone();
        Box::pin(async move {
            let project_id = event.payload["project_id"].as_str();
            let issue_id = event.payload["issue_id"].as_str();
            let (Some(project_id), Some(issue_id)) = (project_id, issue_id) else {
                debug!("Completed work order carries no issue link, skipping");
                return Ok(());
            };
            client
                .update_issue(project_id, issue_id, &json!({"state": "Done"}))
                .await?;
            info!(project = project_id, issue = issue_id, "Linked issue closed");
            Ok(())
        })
    }
}

fn parse_forecast(result: &TaskResult) -> ConnectorResult<CompletionForecast> {
    let raw = result.data["expected_date"].as_str().ok_or_else(|| {
        ConnectorError::task_failed(
            "Completion forecast",
            Some("Response carries no expected date".to_string()),
        )
    })?;
    let expected_date = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| {
            ConnectorError::task_failed(
                "Completion forecast",
                Some(format!("Bad expected date: {}", e)),
            )
        })?
        .with_timezone(&Utc);
    Ok(CompletionForecast {
        expected_date,
        confidence: result.confidence.unwrap_or(0.0),
        risk_factors: string_list(&result.data["risk_factors"]),
    })
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[async_trait]
impl Connector for PlaneProjectsConnector {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: PLUGIN_ID.to_string(),
            name: PLUGIN_NAME.to_string(),
            version: CONNECTOR_VERSION.to_string(),
            module: ModuleKind::ProjectManagement,
            status: PluginStatus::Inactive,
            config: PluginRuntimeConfig {
                enabled: true,
                priority: 2,
                dependencies: Vec::new(),
                permissions: vec![
                    "projects.read".to_string(),
                    "projects.write".to_string(),
                    "ai.tasks".to_string(),
                ],
                api_endpoints: vec![
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/projects/ai/completion",
                        "predict_completion",
                    )
                    .with_rate_limit(30),
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/projects/ai/optimize",
                        "optimize_workflow",
                    )
                    .with_rate_limit(30),
                ],
                webhooks: vec![
                    WebhookSpec::new("project.created"),
                    WebhookSpec::new("issue.stateChanged"),
                ],
            },
            capabilities: PluginCapabilities {
                ai_enabled: true,
                real_time_sync: false,
                cross_module_data: true,
                industry_specific: false,
                custom_fields: false,
            },
        }
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        self.mapping.validate()?;
        self.client.test_connection().await?;
        self.bus.unsubscribe_owner(ModuleKind::ProjectManagement).await;
        self.register_event_handlers().await?;
        info!("Plane projects connector initialized");
        Ok(())
    }

    async fn activate(&self) -> ConnectorResult<()> {
        debug!("Plane projects connector active");
        Ok(())
    }

    async fn deactivate(&self) -> ConnectorResult<()> {
        let removed = self.bus.unsubscribe_owner(ModuleKind::ProjectManagement).await;
        debug!(removed, "Plane projects connector deactivated");
        Ok(())
    }

    async fn destroy(&self) -> ConnectorResult<()> {
        self.cancel.cancel();
        self.bus.unsubscribe_owner(ModuleKind::ProjectManagement).await;
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<bool> {
        match self.client.test_connection().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Plane health probe failed");
                Ok(false)
            }
        }
    }

    async fn sync(&self, direction: SyncDirection, batch: SyncBatch) -> ConnectorResult<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();

        if self.mapping.entity(batch.kind).is_none() {
            report.skipped = batch.records.len() as u64;
            report.duration_ms = started.elapsed().as_millis() as u64;
            debug!(kind = %batch.kind, "Kind not mapped for projects, batch skipped");
            return Ok(report);
        }

        for record in &batch.records {
            let outcome = match direction {
                SyncDirection::Outbound => self.push_record(batch.kind, record).await,
                SyncDirection::Inbound => {
                    accept_inbound(&self.mapping, batch.kind, record).map(|_| ())
                }
            };
            match outcome {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    warn!(kind = %batch.kind, error = %e, "Record sync failed");
                    report.failed += 1;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            kind = %batch.kind,
            direction = %direction,
            synced = report.synced,
            failed = report.failed,
            "Projects sync pass finished"
        );
        Ok(report)
    }
}
