//! # Integration Tests for the Connector Hub
//!
//! Drives composed flows across the registry, the event bus, the task client
//! and the HTTP surface: lifecycle enforcement through the registry, the
//! churn prediction pipeline against a mocked Twenty API, and the
//! cross-module revenue feed the churn features read from.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use connector_hub::config::{HubConfig, PollConfig, TwentyConfig};
use connector_hub::handlers::create_routes;
use connector_hub::{
    ConnectorError, ConnectorHubService, ConnectorRegistry, ConnectorResult, EventBus,
    OrchestratorApi, SubscriptionSpec, TaskClient, TwentyCrmConnector,
};
use omniflow_shared::{
    AiTask, AiTaskRequest, DomainEvent, EntityKind, EventKind, ModuleKind, PluginStatus, RiskLevel,
    SyncBatch, SyncDirection, TaskId, TaskResult, TenantContext,
};

/// Orchestrator stub that resolves every submitted task with one scripted
/// outcome and records the requests it saw.
struct StubOrchestrator {
    task: AiTask,
    submissions: Mutex<Vec<AiTaskRequest>>,
}

impl StubOrchestrator {
    fn completed(data: Value, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            task: AiTask::completed(
                TaskId("task-int".to_string()),
                TaskResult::ok(data).with_confidence(confidence),
            ),
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

/// Build a CRM connector wired to a mocked Twenty endpoint
fn create_crm_connector(
    server_uri: &str,
    api: Arc<StubOrchestrator>,
    bus: Arc<EventBus>,
) -> Arc<TwentyCrmConnector> {
    let config = TwentyConfig {
        enabled: true,
        graphql_url: format!("{}/graphql", server_uri),
        api_token: Some("test-token".to_string()),
    };
    let tasks = Arc::new(TaskClient::new(api, fast_poll()));
    let connector = TwentyCrmConnector::new(
        &config,
        tasks,
        bus,
        TenantContext::new("tenant-1", "workspace-1"),
    )
    .unwrap();
    Arc::new(connector)
}

/// Answer every GraphQL request not claimed by a more specific mock; keeps
/// connection probes and health checks green. Mount this one last.
async fn mount_graphql_fallback(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"__typename": "Query"}
        })))
        .mount(server)
        .await;
}

/// Subscribe a recording sink to one channel and return the events it saw
async fn create_event_sink(
    bus: &EventBus,
    channel: ModuleKind,
    kinds: Vec<EventKind>,
) -> Arc<Mutex<Vec<DomainEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(
        SubscriptionSpec {
            id: format!("test.sink.{}", channel),
            label: "recording sink".to_string(),
            channel,
            events: kinds,
            owner: ModuleKind::Manufacturing,
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

#[tokio::test]
async fn test_lifecycle_order_is_enforced_through_the_registry() {
    let server = MockServer::start().await;
    mount_graphql_fallback(&server).await;

    let bus = Arc::new(EventBus::new());
    let api = StubOrchestrator::completed(json!({}), 0.0);
    let connector = create_crm_connector(&server.uri(), api, bus.clone());

    let registry = ConnectorRegistry::new();
    registry.register(connector).await.unwrap();

    // Activation without initialization is rejected and nothing subscribes
    let err = registry.activate(ModuleKind::Crm).await.unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidTransition { .. }));
    assert!(err.to_string().contains("INACTIVE -> ACTIVE"));
    assert!(bus.subscriptions().await.is_empty());

    // The ordered path succeeds and registers the CRM event handlers
    registry.initialize(ModuleKind::Crm).await.unwrap();
    registry.activate(ModuleKind::Crm).await.unwrap();
    assert_eq!(
        registry.get(ModuleKind::Crm).await.unwrap().status().await,
        PluginStatus::Active
    );
    assert_eq!(bus.subscriptions().await.len(), 2);

    // Activating an active connector is a quiet no-op
    registry.activate(ModuleKind::Crm).await.unwrap();
    assert_eq!(
        registry.get(ModuleKind::Crm).await.unwrap().status().await,
        PluginStatus::Active
    );

    // Deactivation drops every handler the connector registered
    registry.deactivate(ModuleKind::Crm).await.unwrap();
    assert_eq!(
        registry.get(ModuleKind::Crm).await.unwrap().status().await,
        PluginStatus::Inactive
    );
    assert!(bus.subscriptions().await.is_empty());
}

#[tokio::test]
async fn test_churn_pipeline_reads_paid_revenue_and_publishes_one_prediction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("company(id:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"company": {"id": "c-42", "name": "Acme", "employees": 80}}
        })))
        .mount(&server)
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
    mount_graphql_fallback(&server).await;

    let bus = Arc::new(EventBus::new());
    let api = StubOrchestrator::completed(
        json!({"probability": 0.85, "drivers": ["Support tickets rising"]}),
        0.9,
    );
    let connector = create_crm_connector(&server.uri(), api.clone(), bus.clone());

    let registry = ConnectorRegistry::new();
    registry.register(connector.clone()).await.unwrap();
    let pass = registry.initialize_all().await;
    assert!(pass.all_succeeded(), "failures: {:?}", pass.failures);
    registry.activate_all().await;

    let predictions =
        create_event_sink(&bus, ModuleKind::Crm, vec![EventKind::AiPredictionReady]).await;

    // Paid invoices land on the ACCOUNTING channel and fill the revenue
    // aggregate the churn features are built from
    for amount in [1200.0, 800.0] {
        bus.publish(
            DomainEvent::new(ModuleKind::Accounting, EventKind::InvoicePaid, "tenant-1")
                .with_payload(json!({"customer_id": "c-42", "amount": amount})),
        )
        .await;
    }
    assert_eq!(connector.customer_revenue("c-42"), Some(2000.0));

    let prediction = connector.predict_churn("c-42").await.unwrap();
    assert_eq!(prediction.probability, 0.85);
    assert_eq!(prediction.risk_level, RiskLevel::High);

    // The submitted features carried the accumulated revenue
    {
        let submissions = api.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].payload["paid_revenue"], 2000.0);
    }

    // Exactly one prediction event went out, carrying the customer id
    {
        let events = predictions.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::AiPredictionReady);
        assert_eq!(events[0].payload["customer_id"], "c-42");
        assert_eq!(events[0].entity_id.as_deref(), Some("c-42"));
    }

    // Two invoice events plus the prediction crossed the bus
    assert_eq!(bus.published_total(), 3);
    assert_eq!(bus.delivered_total(), 3);
}

#[tokio::test]
async fn test_http_surface_reflects_fleet_state() {
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
    mount_graphql_fallback(&server).await;

    let mut config = HubConfig::default();
    config.twenty.enabled = true;
    config.twenty.graphql_url = format!("{}/graphql", server.uri());
    config.twenty.api_token = Some("test-token".to_string());

    let service = ConnectorHubService::new(config).await.unwrap();
    let state = service.state();
    let pass = state.registry.initialize_all().await;
    assert!(pass.all_succeeded(), "failures: {:?}", pass.failures);
    state.registry.activate_all().await;

    let http = TestServer::new(create_routes(state.clone())).unwrap();

    let response = http.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connectors"]["Twenty CRM Connector"], true);

    let response = http.get("/api/v1/connectors").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["connectors"][0]["status"], "ACTIVE");

    let response = http.get("/api/v1/connectors/crm/status").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["name"], "Twenty CRM Connector");
    assert_eq!(body["module"], "CRM");
    assert_eq!(body["status"], "ACTIVE");

    // An outbound sync pass flows through the connector and into the metrics
    let response = http
        .post("/api/v1/connectors/crm/sync")
        .json(&json!({
            "direction": "OUT",
            "kind": "company",
            "records": [{"name": "Initech", "domain": "initech.io"}],
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["synced"], 1);
    assert_eq!(body["failed"], 0);

    let snapshot = state.metrics.snapshot();
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.requests_by_module["CRM"], 1);
}

#[tokio::test]
async fn test_sync_is_refused_until_the_connector_is_active() {
    let server = MockServer::start().await;
    mount_graphql_fallback(&server).await;

    let bus = Arc::new(EventBus::new());
    let api = StubOrchestrator::completed(json!({}), 0.0);
    let connector = create_crm_connector(&server.uri(), api, bus);

    let registry = ConnectorRegistry::new();
    registry.register(connector).await.unwrap();

    let batch = SyncBatch::new(EntityKind::Company, vec![json!({"name": "Initech"})]);
    let err = registry
        .sync(ModuleKind::Crm, SyncDirection::Inbound, batch.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::ServiceUnavailable { .. }));

    registry.initialize_all().await;
    registry.activate_all().await;
    let report = registry
        .sync(ModuleKind::Crm, SyncDirection::Inbound, batch)
        .await
        .unwrap();
    assert_eq!(report.synced, 1);
}
