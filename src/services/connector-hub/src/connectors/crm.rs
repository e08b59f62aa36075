//! Twenty CRM connector
//!
//! Bridges the Twenty GraphQL API into the hub as the CRM module:
//! company, person and opportunity sync through the CRM mapping catalog,
//! AI lead scoring and churn prediction delegated to the orchestrator,
//! local note sentiment, and cross-module reactions to paid invoices and
//! completed projects.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
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

use crate::analysis::{sentiment, SentimentReport};
use crate::clients::TwentyClient;
use crate::config::TwentyConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::{EventBus, SubscriptionSpec};
use crate::lifecycle::Connector;
use crate::mapping::{catalog_for, DataMappingConfig};
use crate::tasks::TaskClient;

use super::{accept_inbound, prepare_outbound, string_list, CONNECTOR_VERSION};

const PLUGIN_ID: &str = "twenty-crm";
const PLUGIN_NAME: &str = "Twenty CRM Connector";

/// Churn probability above this is treated as high risk: the retention
/// workflow fires and a prediction event goes out on the CRM channel.
pub const CHURN_RISK_THRESHOLD: f64 = 0.7;

/// How many opportunities to pull when assembling scoring features
const OPPORTUNITY_FETCH_LIMIT: u32 = 200;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Result of an AI lead scoring round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadScore {
    /// Score in `[0, 100]`
    pub score: f64,
    /// Letter grade: A >= 80, B >= 60, C >= 40, D below
    pub grade: String,
    pub factors: Vec<String>,
    pub confidence: f64,
}

/// Result of an AI churn prediction round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnPrediction {
    /// Churn probability in `[0, 1]`
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub drivers: Vec<String>,
    pub confidence: f64,
}

fn grade_for(score: f64) -> &'static str {
    if score >= 80.0 {
        "A"
    } else if score >= 60.0 {
        "B"
    } else if score >= 40.0 {
        "C"
    } else {
        "D"
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// CRM module connector backed by Twenty
pub struct TwentyCrmConnector {
    client: Arc<TwentyClient>,
    tasks: Arc<TaskClient>,
    bus: Arc<EventBus>,
    tenant: TenantContext,
    mapping: DataMappingConfig,
    /// Last lead score per company id
    lead_scores: Arc<DashMap<String, LeadScore>>,
    /// Paid-invoice revenue per customer id, fed by ACCOUNTING events
    revenue: Arc<DashMap<String, f64>>,
    cancel: CancellationToken,
}

impl TwentyCrmConnector {
    pub fn new(
        config: &TwentyConfig,
        tasks: Arc<TaskClient>,
        bus: Arc<EventBus>,
        tenant: TenantContext,
    ) -> ConnectorResult<Self> {
        Ok(Self {
            client: Arc::new(TwentyClient::new(config)?),
            tasks,
            bus,
            tenant,
            mapping: catalog_for(ModuleKind::Crm),
            lead_scores: Arc::new(DashMap::new()),
            revenue: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Last stored lead score for a company, if one was computed
    pub fn lead_score(&self, company_id: &str) -> Option<LeadScore> {
        self.lead_scores.get(company_id).map(|e| e.clone())
    }

    /// Accumulated paid-invoice revenue for a customer
    pub fn customer_revenue(&self, customer_id: &str) -> Option<f64> {
        self.revenue.get(customer_id).map(|e| *e)
    }

    /// Companies in canonical shape for the HTTP surface
    pub async fn list_companies(&self, limit: u32) -> ConnectorResult<Vec<Value>> {
        let raw = self.client.find_companies(limit).await?;
        Ok(raw
            .iter()
            .map(|c| {
                self.mapping
                    .transform(EntityKind::Company, SyncDirection::Inbound, c)
            })
            .collect())
    }

    // ========================================================================
    // AI OPERATIONS
    // ========================================================================

    /// Score a company as a sales lead.
    ///
    /// Features come from the company record, its opportunity pipeline and
    /// the sentiment of attached notes. The orchestrator's score is stored
    /// locally and pushed back onto the company record.
    pub async fn calculate_lead_score(&self, company_id: &str) -> ConnectorResult<LeadScore> {
        let company = self.client.get_company(company_id).await?;
        let opportunities = self
            .client
            .find_opportunities(OPPORTUNITY_FETCH_LIMIT)
            .await?;

        let pipeline: Vec<&Value> = opportunities
            .iter()
            .filter(|o| o["companyId"] == company_id)
            .collect();
        let pipeline_value: f64 = pipeline.iter().filter_map(|o| o["amount"].as_f64()).sum();

        let notes = collect_note_bodies(&company);
        let note_sentiment = if notes.is_empty() {
            None
        } else {
            sentiment::analyze(&notes.join("\n")).ok().map(|r| r.score)
        };

        let payload = json!({
            "company_id": company_id,
            "employees": company["employees"],
            "annual_revenue": company["annualRecurringRevenue"],
            "open_opportunities": pipeline.len(),
            "pipeline_value": pipeline_value,
            "note_sentiment": note_sentiment,
        });
        let mut context = EntityContext::for_entity(EntityKind::Company, company_id);
        if let Some(industry) = company["industry"].as_str() {
            context = context.with_industry(industry);
        }
        let request = AiTaskRequest::new(
            TaskType::LeadScoring,
            payload,
            self.tenant.tenant_id.as_str(),
            self.tenant.workspace_id.as_str(),
        )
        .with_context(context);

        let result = self.tasks.execute(request, &self.cancel).await?;
        let score = parse_lead_score(&result)?;

        self.lead_scores
            .insert(company_id.to_string(), score.clone());
        self.client
            .update_company(
                company_id,
                json!({"aiScore": score.score, "aiGrade": score.grade}),
            )
            .await?;
        info!(company = company_id, score = score.score, grade = %score.grade, "Lead scored");
        Ok(score)
    }

    /// Predict churn for a customer.
    ///
    /// A probability above [`CHURN_RISK_THRESHOLD`] triggers the retention
    /// workflow once and publishes one AI_PREDICTION_READY event carrying
    /// the customer id.
    pub async fn predict_churn(&self, customer_id: &str) -> ConnectorResult<ChurnPrediction> {
        let company = self.client.get_company(customer_id).await?;
        let paid_revenue = self.customer_revenue(customer_id).unwrap_or(0.0);

        let payload = json!({
            "customer_id": customer_id,
            "employees": company["employees"],
            "annual_revenue": company["annualRecurringRevenue"],
            "paid_revenue": paid_revenue,
        });
        let request = AiTaskRequest::new(
            TaskType::ChurnPrediction,
            payload,
            self.tenant.tenant_id.as_str(),
            self.tenant.workspace_id.as_str(),
        )
        .with_context(EntityContext::for_entity(EntityKind::Company, customer_id));

        let result = self.tasks.execute(request, &self.cancel).await?;
        let prediction = parse_churn_prediction(&result)?;

        if prediction.probability > CHURN_RISK_THRESHOLD {
            warn!(
                customer = customer_id,
                probability = prediction.probability,
                "High churn risk"
            );
            self.trigger_retention_workflow(customer_id).await?;
            let event = DomainEvent::new(
                ModuleKind::Crm,
                EventKind::AiPredictionReady,
                self.tenant.tenant_id.as_str(),
            )
            .with_entity(EntityKind::Company, customer_id)
            .with_payload(json!({
                "customer_id": customer_id,
                "task_type": TaskType::ChurnPrediction.as_str(),
                "probability": prediction.probability,
                "risk_level": prediction.risk_level,
            }));
            self.bus.publish(event).await;
        }
        Ok(prediction)
    }

    /// Create a follow-up task in the CRM for an at-risk customer
    pub async fn trigger_retention_workflow(&self, customer_id: &str) -> ConnectorResult<Value> {
        info!(customer = customer_id, "Triggering retention workflow");
        self.client
            .create_task(json!({
                "title": format!("Retention outreach: customer {}", customer_id),
                "body": "Churn risk crossed the high threshold. Review open issues and schedule a check-in call.",
                "status": "TODO",
                "dueAt": (Utc::now() + chrono::Duration::days(3)).to_rfc3339(),
                "companyId": customer_id,
            }))
            .await
    }

    /// Score free-form note text with the local sentiment lexicon
    pub fn analyze_note_sentiment(&self, text: &str) -> ConnectorResult<SentimentReport> {
        sentiment::analyze(text)
    }

    // ========================================================================
    // EVENT HANDLERS
    // ========================================================================

    async fn register_event_handlers(&self) -> ConnectorResult<()> {
        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "crm.invoice-paid".to_string(),
                    label: "Refresh customer revenue aggregates".to_string(),
                    channel: ModuleKind::Accounting,
                    events: vec![EventKind::InvoicePaid],
                    owner: ModuleKind::Crm,
                },
                invoice_paid_handler(self.revenue.clone()),
            )
            .await?;

        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "crm.project-completed".to_string(),
                    label: "Advance opportunity stage on project completion".to_string(),
                    channel: ModuleKind::ProjectManagement,
                    events: vec![EventKind::ProjectCompleted],
                    owner: ModuleKind::Crm,
                },
                project_completed_handler(self.client.clone()),
            )
            .await?;

        Ok(())
    }

    async fn push_record(&self, kind: EntityKind, record: &Value) -> ConnectorResult<()> {
        let external = prepare_outbound(&self.mapping, kind, record)?;
        match kind {
            EntityKind::Company => {
                self.client.create_company(external).await?;
            }
            EntityKind::Person => {
                self.client.create_person(external).await?;
            }
            EntityKind::Opportunity => {
                self.client.create_opportunity(external).await?;
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

/// Accumulate paid-invoice amounts into the per-customer revenue map
fn invoice_paid_handler(
    revenue: Arc<DashMap<String, f64>>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let revenue = revenue.clone();
        Box::pin(async move {
            let Some(customer_id) = event.payload["customer_id"].as_str() else {
                debug!("Paid invoice event without customer id, skipping");
                return Ok(());
            };
            let amount = event.payload["amount"].as_f64().unwrap_or(0.0);
            let total = {
                let mut entry = revenue.entry(customer_id.to_string()).or_insert(0.0);
                *entry += amount;
                *entry
            };
            debug!(customer = customer_id, amount, total, "Customer revenue refreshed");
            Ok(())
        })
    }
}

/// Move the linked opportunity to the customer stage when delivery wraps up
fn project_completed_handler(
    client: Arc<TwentyClient>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let client = client.clone();
        Box::pin(async move {
            let Some(opportunity_id) = event.payload["opportunity_id"].as_str() else {
                debug!("Project completion carries no opportunity link, skipping");
                return Ok(());
            };
            client
                .update_opportunity(opportunity_id, json!({"stage": "CUSTOMER"}))
                .await?;
            info!(
                opportunity = opportunity_id,
                "Opportunity advanced to CUSTOMER"
            );
            Ok(())
        })
    }
}

fn collect_note_bodies(company: &Value) -> Vec<String> {
    company["notes"]["edges"]
        .as_array()
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| e["node"]["body"].as_str())
                .filter(|body| !body.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_lead_score(result: &TaskResult) -> ConnectorResult<LeadScore> {
    let score = result.data["score"].as_f64().ok_or_else(|| {
        ConnectorError::task_failed("Lead scoring", Some("Response carries no score".to_string()))
    })?;
    let score = score.clamp(0.0, 100.0);
    let grade = result.data["grade"]
        .as_str()
        .unwrap_or_else(|| grade_for(score))
        .to_string();
    Ok(LeadScore {
        score,
        grade,
        factors: string_list(&result.data["factors"]),
        confidence: result.confidence.unwrap_or(0.0),
    })
}

fn parse_churn_prediction(result: &TaskResult) -> ConnectorResult<ChurnPrediction> {
    let probability = result.data["probability"].as_f64().ok_or_else(|| {
        ConnectorError::task_failed(
            "Churn prediction",
            Some("Response carries no probability".to_string()),
        )
    })?;
    let probability = probability.clamp(0.0, 1.0);
    Ok(ChurnPrediction {
        probability,
        risk_level: RiskLevel::from_probability(probability),
        drivers: string_list(&result.data["drivers"]),
        confidence: result.confidence.unwrap_or(0.0),
    })
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[async_trait]
impl Connector for TwentyCrmConnector {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: PLUGIN_ID.to_string(),
            name: PLUGIN_NAME.to_string(),
            version: CONNECTOR_VERSION.to_string(),
            module: ModuleKind::Crm,
            status: PluginStatus::Inactive,
            config: PluginRuntimeConfig {
                enabled: true,
                priority: 1,
                dependencies: Vec::new(),
                permissions: vec![
                    "crm.read".to_string(),
                    "crm.write".to_string(),
                    "ai.tasks".to_string(),
                ],
                api_endpoints: vec![
                    ApiEndpointSpec::new(HttpMethod::Get, "/api/v1/crm/companies", "list_companies"),
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/crm/ai/lead-score",
                        "calculate_lead_score",
                    )
                    .with_rate_limit(30),
                    ApiEndpointSpec::new(HttpMethod::Post, "/api/v1/crm/ai/churn", "predict_churn")
                        .with_rate_limit(30),
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/crm/sentiment",
                        "analyze_note_sentiment",
                    )
                    .with_rate_limit(60),
                ],
                webhooks: vec![
                    WebhookSpec::new("company.created"),
                    WebhookSpec::new("company.updated"),
                    WebhookSpec::new("opportunity.stageChanged"),
                ],
            },
            capabilities: PluginCapabilities {
                ai_enabled: true,
                real_time_sync: true,
                cross_module_data: true,
                industry_specific: false,
                custom_fields: true,
            },
        }
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        self.mapping.validate()?;
        self.client.test_connection().await?;
        self.bus.unsubscribe_owner(ModuleKind::Crm).await;
        self.register_event_handlers().await?;
        info!("Twenty CRM connector initialized");
        Ok(())
    }

    async fn activate(&self) -> ConnectorResult<()> {
        debug!("Twenty CRM connector active");
        Ok(())
    }

    async fn deactivate(&self) -> ConnectorResult<()> {
        let removed = self.bus.unsubscribe_owner(ModuleKind::Crm).await;
        debug!(removed, "Twenty CRM connector deactivated");
        Ok(())
    }

    async fn destroy(&self) -> ConnectorResult<()> {
        self.cancel.cancel();
        self.bus.unsubscribe_owner(ModuleKind::Crm).await;
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<bool> {
        match self.client.test_connection().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Twenty CRM health probe failed");
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
            debug!(kind = %batch.kind, "Kind not mapped for CRM, batch skipped");
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
            "CRM sync pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::tasks::OrchestratorApi;
    use omniflow_shared::{AiTask, TaskId};
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubOrchestrator {
        task: AiTask,
        submissions: Mutex<Vec<AiTaskRequest>>,
    }

    impl StubOrchestrator {
        fn completed(data: Value, confidence: f64) -> Arc<Self> {
            let result = TaskResult::ok(data).with_confidence(confidence);
            Arc::new(Self {
                task: AiTask::completed(TaskId("task-crm".to_string()), result),
                submissions: Mutex::new(Vec::new()),
            })
        }

        fn failed(message: &str) -> Arc<Self> {
            Arc::new(Self {
                task: AiTask::failed(TaskId("task-crm".to_string()), message),
                submissions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OrchestratorApi for StubOrchestrator {
        async fn submit_task(&self, request: &AiTaskRequest) -> ConnectorResult<TaskId> {
            self.submissions.lock().unwrap().push(request.clone());
            Ok(self.task.id.clone())
        }

        async fn task_status(&self, _id: &TaskId) -> ConnectorResult<AiTask> {
            Ok(self.task.clone())
        }

        async fn cancel_task(&self, _id: &TaskId) -> ConnectorResult<()> {
            Ok(())
        }
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            initial_interval_ms: 5,
            multiplier: 2.0,
            max_interval_ms: 20,
            timeout_ms: 500,
        }
    }

    fn connector_with(
        server_uri: &str,
        api: Arc<StubOrchestrator>,
        bus: Arc<EventBus>,
    ) -> TwentyCrmConnector {
        let config = TwentyConfig {
            enabled: true,
            graphql_url: format!("{}/graphql", server_uri),
            api_token: Some("test-token".to_string()),
        };
        let tasks = Arc::new(TaskClient::new(api, fast_poll()));
        TwentyCrmConnector::new(&config, tasks, bus, TenantContext::new("t1", "w1")).unwrap()
    }

    async fn prediction_sink(bus: &EventBus) -> Arc<Mutex<Vec<DomainEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(
            SubscriptionSpec {
                id: "test.prediction-sink".to_string(),
                label: "sink".to_string(),
                channel: ModuleKind::Crm,
                events: vec![EventKind::AiPredictionReady],
                owner: ModuleKind::ProjectManagement,
            },
            move |event| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push(event);
                    Ok(())
                })
            },
        )
        .await
        .unwrap();
        seen
    }

    async fn mount_company(server: &MockServer, id: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("company(id:"))
            .and(body_partial_json(json!({"variables": {"id": id}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"company": body}})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_high_churn_triggers_retention_exactly_once() {
        let server = MockServer::start().await;
        mount_company(
            &server,
            "c-42",
            json!({"id": "c-42", "name": "Acme", "employees": 80}),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("CreateTask"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"createTask": {"id": "task-9", "title": "Retention outreach: customer c-42"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bus = Arc::new(EventBus::new());
        let events = prediction_sink(&bus).await;
        let api = StubOrchestrator::completed(
            json!({"probability": 0.85, "drivers": ["Support tickets rising"]}),
            0.9,
        );
        let connector = connector_with(&server.uri(), api, bus);

        let prediction = connector.predict_churn("c-42").await.unwrap();
        assert_eq!(prediction.probability, 0.85);
        assert_eq!(prediction.risk_level, RiskLevel::High);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::AiPredictionReady);
        assert_eq!(events[0].payload["customer_id"], "c-42");
        assert_eq!(events[0].entity_id.as_deref(), Some("c-42"));
    }

    #[tokio::test]
    async fn test_moderate_churn_stays_quiet() {
        let server = MockServer::start().await;
        mount_company(&server, "c-7", json!({"id": "c-7", "name": "Globex"})).await;

        let bus = Arc::new(EventBus::new());
        let events = prediction_sink(&bus).await;
        let api = StubOrchestrator::completed(json!({"probability": 0.5}), 0.8);
        let connector = connector_with(&server.uri(), api, bus);

        let prediction = connector.predict_churn("c-7").await.unwrap();
        assert_eq!(prediction.risk_level, RiskLevel::Medium);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lead_score_assembles_features_and_writes_back() {
        let server = MockServer::start().await;
        mount_company(
            &server,
            "c-1",
            json!({
                "id": "c-1",
                "name": "Acme",
                "employees": 120,
                "industry": "manufacturing",
                "annualRecurringRevenue": 2000000.0,
                "notes": {"edges": [
                    {"node": {"id": "n1", "body": "Strong growth and record profit this quarter"}}
                ]}
            }),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("opportunities(first:"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"opportunities": {"edges": [
                    {"node": {"id": "o1", "companyId": "c-1", "amount": 30000.0}},
                    {"node": {"id": "o2", "companyId": "c-other", "amount": 99000.0}}
                ]}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("UpdateCompany"))
            .and(body_partial_json(
                json!({"variables": {"id": "c-1", "data": {"aiScore": 87.0, "aiGrade": "A"}}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"updateCompany": {"id": "c-1"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = StubOrchestrator::completed(
            json!({"score": 87.0, "factors": ["Large pipeline", "Healthy notes"]}),
            0.92,
        );
        let bus = Arc::new(EventBus::new());
        let connector = connector_with(&server.uri(), api.clone(), bus);

        let score = connector.calculate_lead_score("c-1").await.unwrap();
        assert_eq!(score.score, 87.0);
        assert_eq!(score.grade, "A");
        assert_eq!(score.factors.len(), 2);
        assert_eq!(score.confidence, 0.92);
        assert_eq!(connector.lead_score("c-1").unwrap().grade, "A");

        let submissions = api.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].task_type, TaskType::LeadScoring);
        assert_eq!(submissions[0].payload["open_opportunities"], 1);
        assert_eq!(submissions[0].payload["pipeline_value"], 30000.0);
        assert!(submissions[0].payload["note_sentiment"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_failed_task_maps_to_operation_error() {
        let server = MockServer::start().await;
        mount_company(&server, "c-1", json!({"id": "c-1", "name": "Acme"})).await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("opportunities(first:"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"opportunities": {"edges": []}}
            })))
            .mount(&server)
            .await;

        let api = StubOrchestrator::failed("model exploded");
        let bus = Arc::new(EventBus::new());
        let connector = connector_with(&server.uri(), api, bus);

        let err = connector.calculate_lead_score("c-1").await.unwrap_err();
        assert_eq!(err.to_string(), "Lead scoring failed");
    }

    #[tokio::test]
    async fn test_sentiment_rejects_blank_text() {
        let server = MockServer::start().await;
        let api = StubOrchestrator::completed(json!({}), 0.0);
        let connector = connector_with(&server.uri(), api, Arc::new(EventBus::new()));
        assert!(connector.analyze_note_sentiment("   ").is_err());
    }

    #[tokio::test]
    async fn test_outbound_sync_counts_per_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("CreateCompany"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"createCompany": {"id": "c-new"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = StubOrchestrator::completed(json!({}), 0.0);
        let bus = Arc::new(EventBus::new());
        let connector = connector_with(&server.uri(), api, bus);

        let batch = SyncBatch::new(
            EntityKind::Company,
            vec![
                json!({"name": "Acme", "domain": "acme.io"}),
                json!({"domain": "nameless.io"}),
            ],
        );
        let report = connector.sync(SyncDirection::Outbound, batch).await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_sync_skips_unmapped_kind() {
        let server = MockServer::start().await;
        let api = StubOrchestrator::completed(json!({}), 0.0);
        let connector = connector_with(&server.uri(), api, Arc::new(EventBus::new()));

        let batch = SyncBatch::new(
            EntityKind::WorkOrder,
            vec![json!({"product_id": "p1"}), json!({"product_id": "p2"})],
        );
        let report = connector.sync(SyncDirection::Inbound, batch).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.synced, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_invoice_paid_events_accumulate_revenue() {
        let server = MockServer::start().await;
        let api = StubOrchestrator::completed(json!({}), 0.0);
        let bus = Arc::new(EventBus::new());
        let connector = connector_with(&server.uri(), api, bus.clone());
        connector.register_event_handlers().await.unwrap();

        let paid = |amount: f64| {
            DomainEvent::new(ModuleKind::Accounting, EventKind::InvoicePaid, "t1").with_payload(
                json!({"customer_id": "c-1", "amount": amount, "invoice": "INV-1"}),
            )
        };
        bus.publish(paid(1200.0)).await;
        bus.publish(paid(800.0)).await;

        assert_eq!(connector.customer_revenue("c-1"), Some(2000.0));
        assert_eq!(connector.customer_revenue("c-2"), None);
    }

    #[tokio::test]
    async fn test_project_completed_advances_opportunity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("UpdateOpportunity"))
            .and(body_partial_json(
                json!({"variables": {"id": "o-7", "data": {"stage": "CUSTOMER"}}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"updateOpportunity": {"id": "o-7", "stage": "CUSTOMER"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = StubOrchestrator::completed(json!({}), 0.0);
        let bus = Arc::new(EventBus::new());
        let connector = connector_with(&server.uri(), api, bus.clone());
        connector.register_event_handlers().await.unwrap();

        let event = DomainEvent::new(
            ModuleKind::ProjectManagement,
            EventKind::ProjectCompleted,
            "t1",
        )
        .with_payload(json!({"project_id": "p-1", "opportunity_id": "o-7"}));
        assert_eq!(bus.publish(event).await, 1);
    }

    #[tokio::test]
    async fn test_initialize_probes_and_subscribes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"__typename": "Query"}
            })))
            .mount(&server)
            .await;

        let api = StubOrchestrator::completed(json!({}), 0.0);
        let bus = Arc::new(EventBus::new());
        let connector = connector_with(&server.uri(), api, bus.clone());

        connector.initialize().await.unwrap();
        assert_eq!(bus.subscriptions().await.len(), 2);

        connector.deactivate().await.unwrap();
        assert!(bus.subscriptions().await.is_empty());
    }

    #[test]
    fn test_descriptor_shape() {
        let config = TwentyConfig {
            enabled: true,
            graphql_url: "http://localhost:3000/graphql".to_string(),
            api_token: Some("token".to_string()),
        };
        let api = StubOrchestrator::completed(json!({}), 0.0);
        let tasks = Arc::new(TaskClient::new(api, fast_poll()));
        let connector = TwentyCrmConnector::new(
            &config,
            tasks,
            Arc::new(EventBus::new()),
            TenantContext::new("t1", "w1"),
        )
        .unwrap();

        let descriptor = connector.descriptor();
        assert_eq!(descriptor.module, ModuleKind::Crm);
        assert_eq!(descriptor.version, CONNECTOR_VERSION);
        assert_eq!(descriptor.config.priority, 1);
        assert_eq!(descriptor.config.api_endpoints.len(), 4);
        assert!(descriptor.capabilities.ai_enabled);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(grade_for(80.0), "A");
        assert_eq!(grade_for(79.9), "B");
        assert_eq!(grade_for(60.0), "B");
        assert_eq!(grade_for(40.0), "C");
        assert_eq!(grade_for(39.9), "D");
    }
}
