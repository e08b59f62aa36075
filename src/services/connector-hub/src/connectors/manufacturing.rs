//! Carbon manufacturing connector
//!
//! Bridges the Carbon REST API into the hub as the manufacturing module:
//! work order, item, work center and quality inspection sync through the
//! manufacturing catalog, AI production planning and maintenance
//! prediction, local bill-of-materials cost review, and reactions to won
//! opportunities and paid invoices.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omniflow_shared::{
    AiTaskRequest, ApiEndpointSpec, DomainEvent, EntityContext, EntityKind, EventKind, HttpMethod,
    ModuleKind, PluginCapabilities, PluginDescriptor, PluginRuntimeConfig, PluginStatus, RiskLevel,
    SyncBatch, SyncDirection, SyncReport, TaskResult, TaskType, TenantContext, WebhookSpec,
};

use crate::analysis::bom::{self, BomAnalysis, BomComponent, DEFAULT_ANNUAL_VOLUME};
use crate::clients::CarbonClient;
use crate::config::CarbonConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::{EventBus, SubscriptionSpec};
use crate::lifecycle::Connector;
use crate::mapping::{catalog_for, DataMappingConfig};
use crate::tasks::TaskClient;

use super::{accept_inbound, prepare_outbound, string_list, CONNECTOR_VERSION};

const PLUGIN_ID: &str = "carbon-manufacturing";
const PLUGIN_NAME: &str = "Carbon Manufacturing Connector";

/// Failure probability above this publishes a maintenance alert on the
/// manufacturing channel.
pub const MAINTENANCE_ALERT_THRESHOLD: f64 = 0.75;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One work order to work center assignment in a production plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAssignment {
    pub work_order_id: String,
    pub work_center_id: String,
}

/// Result of an AI production optimization round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub assignments: Vec<PlanAssignment>,
    /// Projected plant utilization in `[0, 1]`
    pub utilization: f64,
    pub notes: Vec<String>,
}

/// Result of an AI maintenance prediction round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenancePrediction {
    pub days_until_service: u32,
    /// Failure probability in `[0, 1]`
    pub failure_probability: f64,
    pub urgency: RiskLevel,
    pub recommended_actions: Vec<String>,
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// Manufacturing module connector backed by Carbon
pub struct CarbonManufacturingConnector {
    client: Arc<CarbonClient>,
    tasks: Arc<TaskClient>,
    bus: Arc<EventBus>,
    tenant: TenantContext,
    mapping: DataMappingConfig,
    /// Last maintenance prediction per equipment id
    predictions: Arc<DashMap<String, MaintenancePrediction>>,
    cancel: CancellationToken,
}

impl CarbonManufacturingConnector {
    pub fn new(
        config: &CarbonConfig,
        tasks: Arc<TaskClient>,
        bus: Arc<EventBus>,
        tenant: TenantContext,
    ) -> ConnectorResult<Self> {
        Ok(Self {
            client: Arc::new(CarbonClient::new(config)?),
            tasks,
            bus,
            tenant,
            mapping: catalog_for(ModuleKind::Manufacturing),
            predictions: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Last stored maintenance prediction for a piece of equipment
    pub fn maintenance_prediction(&self, equipment_id: &str) -> Option<MaintenancePrediction> {
        self.predictions.get(equipment_id).map(|e| e.clone())
    }

    // ========================================================================
    // AI OPERATIONS
    // ========================================================================

    /// Plan open work orders across work centers.
    ///
    /// Completed and cancelled jobs are excluded from the features sent to
    /// the orchestrator.
    pub async fn optimize_production(&self) -> ConnectorResult<ProductionPlan> {
        let jobs = self.client.list_jobs().await?;
        let work_centers = self.client.list_work_centers().await?;

        let open_jobs: Vec<Value> = jobs
            .iter()
            .filter(|j| j["status"] != "Completed" && j["status"] != "Cancelled")
            .map(|j| {
                json!({
                    "id": j["id"],
                    "status": j["status"],
                    "quantity": j["quantity"],
                    "dueDate": j["dueDate"],
                })
            })
            .collect();
        let centers: Vec<Value> = work_centers
            .iter()
            .map(|c| json!({"id": c["id"], "name": c["name"], "status": c["status"]}))
            .collect();

        let payload = json!({
            "open_work_orders": open_jobs,
            "work_centers": centers,
        });
        let request = AiTaskRequest::new(
            TaskType::ProductionOptimization,
            payload,
            self.tenant.tenant_id.as_str(),
            self.tenant.workspace_id.as_str(),
        );

        let result = self.tasks.execute(request, &self.cancel).await?;
        let plan = parse_production_plan(&result)?;
        info!(
            assignments = plan.assignments.len(),
            utilization = plan.utilization,
            "Production plan received"
        );
        Ok(plan)
    }

    /// Predict remaining service life for one work center.
    ///
    /// A failure probability above [`MAINTENANCE_ALERT_THRESHOLD`] publishes
    /// one AI_PREDICTION_READY event on the manufacturing channel.
    pub async fn predict_maintenance(
        &self,
        equipment_id: &str,
    ) -> ConnectorResult<MaintenancePrediction> {
        let centers = self.client.list_work_centers().await?;
        let equipment = centers
            .into_iter()
            .find(|c| c["id"] == equipment_id)
            .ok_or_else(|| ConnectorError::not_found(format!("Equipment {}", equipment_id)))?;

        let payload = json!({
            "equipment_id": equipment_id,
            "name": equipment["name"],
            "status": equipment["status"],
        });
        let request = AiTaskRequest::new(
            TaskType::MaintenancePrediction,
            payload,
            self.tenant.tenant_id.as_str(),
            self.tenant.workspace_id.as_str(),
        )
        .with_context(EntityContext::for_entity(EntityKind::Equipment, equipment_id));

        let result = self.tasks.execute(request, &self.cancel).await?;
        let prediction = parse_maintenance(&result)?;

        self.predictions
            .insert(equipment_id.to_string(), prediction.clone());

        if prediction.failure_probability > MAINTENANCE_ALERT_THRESHOLD {
            warn!(
                equipment = equipment_id,
                probability = prediction.failure_probability,
                "High failure risk"
            );
            let event = DomainEvent::new(
                ModuleKind::Manufacturing,
                EventKind::AiPredictionReady,
                self.tenant.tenant_id.as_str(),
            )
            .with_entity(EntityKind::Equipment, equipment_id)
            .with_payload(json!({
                "equipment_id": equipment_id,
                "task_type": TaskType::MaintenancePrediction.as_str(),
                "failure_probability": prediction.failure_probability,
                "days_until_service": prediction.days_until_service,
            }));
            self.bus.publish(event).await;
        }
        Ok(prediction)
    }

    /// Review a product's bill of materials for cost levers. Runs on the
    /// local heuristics, no orchestrator round-trip.
    pub async fn analyze_bill_of_materials(
        &self,
        product_id: &str,
        annual_volume: Option<f64>,
    ) -> ConnectorResult<BomAnalysis> {
        let document = self.client.get_bill_of_materials(product_id).await?;
        let components: Vec<BomComponent> = document["materials"]
            .as_array()
            .map(|items| items.iter().map(component_from_carbon).collect())
            .unwrap_or_default();
        bom::analyze(
            product_id,
            &components,
            annual_volume.unwrap_or(DEFAULT_ANNUAL_VOLUME),
        )
    }

    // ========================================================================
    // EVENT HANDLERS
    // ========================================================================

    async fn register_event_handlers(&self) -> ConnectorResult<()> {
        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "manufacturing.opportunity-won".to_string(),
                    label: "Draft a work order for won opportunities".to_string(),
                    channel: ModuleKind::Crm,
                    events: vec![EventKind::OpportunityWon],
                    owner: ModuleKind::Manufacturing,
                },
                opportunity_won_handler(self.client.clone()),
            )
            .await?;

        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "manufacturing.invoice-paid".to_string(),
                    label: "Complete work orders once their invoice is paid".to_string(),
                    channel: ModuleKind::Accounting,
                    events: vec![EventKind::InvoicePaid],
                    owner: ModuleKind::Manufacturing,
                },
                invoice_paid_handler(self.client.clone()),
            )
            .await?;

        Ok(())
    }

    async fn push_record(&self, kind: EntityKind, record: &Value) -> ConnectorResult<()> {
        let external = prepare_outbound(&self.mapping, kind, record)?;
        match kind {
            EntityKind::WorkOrder => {
                self.client.create_job(&external).await?;
            }
            EntityKind::Product => {
                self.client.create_item(&external).await?;
            }
            EntityKind::QualityCheck => {
                self.client.record_quality_inspection(&external).await?;
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

/// Translate one Carbon BOM line into the analysis shape
fn component_from_carbon(value: &Value) -> BomComponent {
    BomComponent {
        part_number: value["partNumber"].as_str().unwrap_or_default().to_string(),
        description: value["description"].as_str().unwrap_or_default().to_string(),
        quantity: value["quantity"].as_f64().unwrap_or(0.0),
        unit_cost: value["unitCost"].as_f64().unwrap_or(0.0),
        supplier: value["supplier"].as_str().map(str::to_string),
        lead_time_days: value["leadTimeDays"].as_f64().unwrap_or(0.0) as u32,
    }
}

/// Draft a work order when the CRM wins a deal with a product reference
fn opportunity_won_handler(
    client: Arc<CarbonClient>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let client = client.clone();
        Box::pin(async move {
            let Some(product_id) = event.payload["product_id"].as_str() else {
                debug!("Won opportunity carries no product reference, skipping");
                return Ok(());
            };
            let quantity = event.payload["quantity"].as_f64().unwrap_or(1.0);
            let job = client
                .create_job(&json!({
                    "itemId": product_id,
                    "quantity": quantity,
                    "status": "Draft",
                    "reference": event.payload["opportunity_id"],
                }))
                .await?;
            info!(
                product = product_id,
                job = job["id"].as_str().unwrap_or("unknown"),
                "Draft work order created for won opportunity"
            );
            Ok(())
        })
    }
}

/// Complete the linked work order once accounting confirms payment
fn invoice_paid_handler(
    client: Arc<CarbonClient>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let client = client.clone();
        Box::pin(async move {
            let Some(work_order_id) = event.payload["work_order_id"].as_str() else {
                debug!("Paid invoice carries no work order link, skipping");
                return Ok(());
            };
            client.update_job_status(work_order_id, "Completed").await?;
            info!(
                work_order = work_order_id,
                "Work order completed after invoice payment"
            );
            Ok(())
        })
    }
}

fn parse_production_plan(result: &TaskResult) -> ConnectorResult<ProductionPlan> {
    let assignments: Vec<PlanAssignment> =
        serde_json::from_value(result.data["assignments"].clone()).map_err(|_| {
            ConnectorError::task_failed(
                "Production optimization",
                Some("Response carries no assignments".to_string()),
            )
        })?;
    Ok(ProductionPlan {
        assignments,
        utilization: result.data["utilization"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
        notes: string_list(&result.data["notes"]),
    })
}

fn parse_maintenance(result: &TaskResult) -> ConnectorResult<MaintenancePrediction> {
    let failure_probability = result.data["failure_probability"].as_f64().ok_or_else(|| {
        ConnectorError::task_failed(
            "Maintenance prediction",
            Some("Response carries no failure probability".to_string()),
        )
    })?;
    let failure_probability = failure_probability.clamp(0.0, 1.0);
    let days_until_service = result.data["days_until_service"]
        .as_f64()
        .map(|d| d.max(0.0).round() as u32)
        .unwrap_or(0);
    Ok(MaintenancePrediction {
        days_until_service,
        failure_probability,
        urgency: RiskLevel::from_probability(failure_probability),
        recommended_actions: string_list(&result.data["recommended_actions"]),
    })
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[async_trait]
impl Connector for CarbonManufacturingConnector {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: PLUGIN_ID.to_string(),
            name: PLUGIN_NAME.to_string(),
            version: CONNECTOR_VERSION.to_string(),
            module: ModuleKind::Manufacturing,
            status: PluginStatus::Inactive,
            config: PluginRuntimeConfig {
                enabled: true,
                priority: 3,
                dependencies: Vec::new(),
                permissions: vec![
                    "manufacturing.read".to_string(),
                    "manufacturing.write".to_string(),
                    "ai.tasks".to_string(),
                ],
                api_endpoints: vec![
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/manufacturing/ai/production",
                        "optimize_production",
                    )
                    .with_rate_limit(15),
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/manufacturing/ai/maintenance",
                        "predict_maintenance",
                    )
                    .with_rate_limit(30),
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/manufacturing/bom/analyze",
                        "analyze_bill_of_materials",
                    )
                    .with_rate_limit(60),
                ],
                webhooks: vec![
                    WebhookSpec::new("workOrder.completed"),
                    WebhookSpec::new("quality.alert"),
                ],
            },
            capabilities: PluginCapabilities {
                ai_enabled: true,
                real_time_sync: false,
                cross_module_data: true,
                industry_specific: true,
                custom_fields: false,
            },
        }
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        self.mapping.validate()?;
        self.client.test_connection().await?;
        self.bus.unsubscribe_owner(ModuleKind::Manufacturing).await;
        self.register_event_handlers().await?;
        info!("Carbon manufacturing connector initialized");
        Ok(())
    }

    async fn activate(&self) -> ConnectorResult<()> {
        debug!("Carbon manufacturing connector active");
        Ok(())
    }

    async fn deactivate(&self) -> ConnectorResult<()> {
        let removed = self.bus.unsubscribe_owner(ModuleKind::Manufacturing).await;
        debug!(removed, "Carbon manufacturing connector deactivated");
        Ok(())
    }

    async fn destroy(&self) -> ConnectorResult<()> {
        self.cancel.cancel();
        self.bus.unsubscribe_owner(ModuleKind::Manufacturing).await;
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<bool> {
        match self.client.test_connection().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Carbon health probe failed");
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
            debug!(kind = %batch.kind, "Kind not mapped for manufacturing, batch skipped");
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
            "Manufacturing sync pass finished"
        );
        Ok(report)
    }
}
