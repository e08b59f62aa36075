//! ERPNext accounting connector
//!
//! Bridges ERPNext into the hub as the accounting module: invoice and
//! customer sync through the accounting catalog, payroll runs fed from
//! ERPNext employee masters, revenue forecasts seeded from ledger totals,
//! and a background poller that turns freshly paid invoices into
//! INVOICE_PAID events for the other modules.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omniflow_shared::{
    ApiEndpointSpec, DomainEvent, EntityKind, EventKind, HttpMethod, ModuleKind,
    PluginCapabilities, PluginDescriptor, PluginRuntimeConfig, PluginStatus, SyncBatch,
    SyncDirection, SyncReport, TenantContext, WebhookSpec,
};

use crate::analysis::forecast::{self, FinancialForecast, ForecastInput};
use crate::analysis::payroll::{self, PayrollEmployee, PayrollInput, PayrollRun};
use crate::clients::ErpNextClient;
use crate::config::ErpNextConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::{EventBus, SubscriptionSpec};
use crate::lifecycle::Connector;
use crate::mapping::{catalog_for, DataMappingConfig};

use super::{accept_inbound, prepare_outbound, CONNECTOR_VERSION};

const PLUGIN_ID: &str = "erpnext-accounting";
const PLUGIN_NAME: &str = "ERPNext Accounting Connector";

/// Months of ledger history pulled when seeding a forecast
const GROWTH_HISTORY_MONTHS: u32 = 12;

/// Random spread added to each invoice poll so replicas do not align
const INVOICE_POLL_JITTER_MS: u64 = 500;

// ============================================================================
// CONNECTOR
// ============================================================================

/// Accounting module connector backed by ERPNext
pub struct ErpNextConnector {
    client: Arc<ErpNextClient>,
    bus: Arc<EventBus>,
    tenant: TenantContext,
    mapping: DataMappingConfig,
    poll_interval: Duration,
    /// Token for the running invoice monitor, if any
    monitor: Mutex<Option<CancellationToken>>,
    seen_invoices: Arc<DashMap<String, ()>>,
    monitor_primed: Arc<AtomicBool>,
}

impl ErpNextConnector {
    pub fn new(
        config: &ErpNextConfig,
        bus: Arc<EventBus>,
        tenant: TenantContext,
    ) -> ConnectorResult<Self> {
        Ok(Self {
            client: Arc::new(ErpNextClient::new(config)?),
            bus,
            tenant,
            mapping: catalog_for(ModuleKind::Accounting),
            poll_interval: Duration::from_secs(config.invoice_poll_interval.max(1)),
            monitor: Mutex::new(None),
            seen_invoices: Arc::new(DashMap::new()),
            monitor_primed: Arc::new(AtomicBool::new(false)),
        })
    }

    // ========================================================================
    // PAYROLL AND FORECASTING
    // ========================================================================

    /// Compute a payroll run and announce it on the accounting channel.
    ///
    /// An empty employee list is filled from ERPNext's employee and salary
    /// structure masters before the run.
    pub async fn run_payroll(&self, mut input: PayrollInput) -> ConnectorResult<PayrollRun> {
        if input.employees.is_empty() {
            input.employees = self.load_employees().await?;
        }
        let run = payroll::run(&input)?;

        let event = DomainEvent::new(
            ModuleKind::Accounting,
            EventKind::PayrollCompleted,
            self.tenant.tenant_id.as_str(),
        )
        .with_payload(json!({
            "run_id": run.run_id,
            "period_start": run.period_start,
            "period_end": run.period_end,
            "country": run.country.as_str(),
            "employee_count": run.employee_count,
            "total_net_pay": run.total_net_pay,
        }));
        self.bus.publish(event).await;

        info!(
            run_id = %run.run_id,
            employees = run.employee_count,
            net = run.total_net_pay,
            "Payroll run completed"
        );
        Ok(run)
    }

    /// Project revenue and expenses. Without an explicit input the current
    /// figures are seeded from ERPNext ledger totals.
    pub async fn forecast_financials(
        &self,
        input: Option<ForecastInput>,
        horizon_months: u32,
    ) -> ConnectorResult<FinancialForecast> {
        let input = match input {
            Some(input) => input,
            None => self.seed_forecast_input().await?,
        };
        forecast::project(&input, horizon_months)
    }

    async fn load_employees(&self) -> ConnectorResult<Vec<PayrollEmployee>> {
        let records = self.client.list_employees().await?;
        let mut employees = Vec::with_capacity(records.len());

        for record in &records {
            let Some(doc_name) = record["name"].as_str() else {
                continue;
            };
            let assignments = self.client.get_salary_structure(doc_name).await?;
            let Some(assignment) = assignments.as_array().and_then(|a| a.first()) else {
                warn!(employee = doc_name, "No salary structure assigned, skipping");
                continue;
            };
            let base = assignment["base"].as_f64().unwrap_or(0.0);
            if base <= 0.0 {
                warn!(employee = doc_name, "Salary structure has no base pay, skipping");
                continue;
            }

            let full_name = format!(
                "{} {}",
                record["first_name"].as_str().unwrap_or(""),
                record["last_name"].as_str().unwrap_or("")
            )
            .trim()
            .to_string();

            employees.push(PayrollEmployee {
                employee_id: doc_name.to_string(),
                name: full_name,
                base_salary: base,
                grade: record["grade"].as_str().map(str::to_string),
                overtime_hours: 0.0,
                commission: 0.0,
                bonus: 0.0,
                transport_allowance: true,
                meal_allowance: true,
                health_insurance_deduction: 0.0,
                loan_emi: 0.0,
                voluntary_deductions: BTreeMap::new(),
                health_insurance_plan: true,
                life_insurance_coverage: false,
                retirement_contribution: 0.0,
                retirement_match_rate: 0.5,
            });
        }

        if employees.is_empty() {
            return Err(ConnectorError::validation(
                "employees",
                "No payable employees found in ERPNext",
            ));
        }
        Ok(employees)
    }

    async fn seed_forecast_input(&self) -> ConnectorResult<ForecastInput> {
        let totals = self
            .client
            .monthly_totals("Income", GROWTH_HISTORY_MONTHS)
            .await?;
        let history: Vec<f64> = totals["months"]
            .as_array()
            .map(|months| {
                months
                    .iter()
                    .map(|m| m["total"].as_f64().unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();
        let current = history.last().copied().unwrap_or(0.0);
        if current <= 0.0 {
            return Err(ConnectorError::validation(
                "current_revenue",
                "Ledger totals carry no usable revenue",
            ));
        }
        let growth_rate = estimate_growth(&history);
        info!(
            months = history.len(),
            current_revenue = current,
            growth_rate,
            "Forecast input seeded from ledger totals"
        );
        Ok(ForecastInput {
            current_revenue: current,
            growth_rate,
            historical_revenue: history,
        })
    }

    // ========================================================================
    // EVENT HANDLERS
    // ========================================================================

    async fn register_event_handlers(&self) -> ConnectorResult<()> {
        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "erp.work-order-completed".to_string(),
                    label: "Draft an invoice for completed work orders".to_string(),
                    channel: ModuleKind::Manufacturing,
                    events: vec![EventKind::WorkOrderCompleted],
                    owner: ModuleKind::Accounting,
                },
                work_order_completed_handler(self.client.clone()),
            )
            .await?;

        self.bus
            .subscribe(
                SubscriptionSpec {
                    id: "erp.opportunity-won".to_string(),
                    label: "Note won opportunities for receivables planning".to_string(),
                    channel: ModuleKind::Crm,
                    events: vec![EventKind::OpportunityWon],
                    owner: ModuleKind::Accounting,
                },
                opportunity_won_handler(),
            )
            .await?;

        Ok(())
    }

    async fn push_record(&self, kind: EntityKind, record: &Value) -> ConnectorResult<()> {
        let external = prepare_outbound(&self.mapping, kind, record)?;
        match kind {
            EntityKind::Invoice => {
                self.client.create_invoice(&external).await?;
            }
            EntityKind::Company => {
                self.client.create_customer(&external).await?;
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

    async fn stop_monitor(&self) {
        if let Some(token) = self.monitor.lock().await.take() {
            token.cancel();
        }
    }
}

/// Annualized mean month-over-month growth, clamped to a plausible band
fn estimate_growth(history: &[f64]) -> f64 {
    let deltas: Vec<f64> = history
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if deltas.is_empty() {
        return 0.05;
    }
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    (mean * 12.0).clamp(-0.5, 1.0)
}

/// Poll ERPNext for paid invoices and publish one INVOICE_PAID event per
/// newly observed invoice. The first pass only primes the seen set so a
/// restart does not replay the whole paid backlog.
async fn invoice_monitor(
    client: Arc<ErpNextClient>,
    bus: Arc<EventBus>,
    seen: Arc<DashMap<String, ()>>,
    primed: Arc<AtomicBool>,
    tenant: TenantContext,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        match client.list_invoices(Some("Paid")).await {
            Ok(invoices) => {
                let publish = primed.swap(true, Ordering::SeqCst);
                for invoice in invoices {
                    let Some(name) = invoice["name"].as_str() else {
                        continue;
                    };
                    if seen.insert(name.to_string(), ()).is_some() {
                        continue;
                    }
                    if !publish {
                        continue;
                    }
                    let event = DomainEvent::new(
                        ModuleKind::Accounting,
                        EventKind::InvoicePaid,
                        tenant.tenant_id.as_str(),
                    )
                    .with_entity(EntityKind::Invoice, name)
                    .with_payload(json!({
                        "invoice": name,
                        "customer_id": invoice["customer"],
                        "amount": invoice["grand_total"],
                        "status": invoice["status"],
                    }));
                    info!(invoice = name, "Paid invoice detected");
                    bus.publish(event).await;
                }
            }
            Err(e) => warn!(error = %e, "Invoice poll failed"),
        }

        let jitter_ms: u64 = rand::thread_rng().gen_range(0..=INVOICE_POLL_JITTER_MS);
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval + Duration::from_millis(jitter_ms)) => {}
        }
    }
    debug!("Invoice monitor stopped");
}

/// Draft a sales invoice once manufacturing reports a work order complete
fn work_order_completed_handler(
    client: Arc<ErpNextClient>,
) -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    move |event| {
        let client = client.clone();
        Box::pin(async move {
            let Some(customer_id) = event.payload["customer_id"].as_str() else {
                debug!("Completed work order carries no customer, skipping");
                return Ok(());
            };
            let amount = event.payload["amount"].as_f64().unwrap_or(0.0);
            let work_order = event.payload["work_order_id"].as_str().unwrap_or("unknown");
            let invoice = client
                .create_invoice(&json!({
                    "customer": customer_id,
                    "grand_total": amount,
                    "status": "Draft",
                    "remarks": format!("Work order {}", work_order),
                }))
                .await?;
            info!(
                customer = customer_id,
                invoice = invoice["name"].as_str().unwrap_or("unknown"),
                "Draft invoice created for completed work order"
            );
            Ok(())
        })
    }
}

/// Won deals only get logged here; invoicing waits for delivery
fn opportunity_won_handler() -> impl Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> {
    |event| {
        Box::pin(async move {
            info!(
                opportunity = event.payload["opportunity_id"].as_str().unwrap_or("unknown"),
                amount = event.payload["amount"].as_f64().unwrap_or(0.0),
                "Won opportunity noted for receivables planning"
            );
            Ok(())
        })
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[async_trait]
impl Connector for ErpNextConnector {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: PLUGIN_ID.to_string(),
            name: PLUGIN_NAME.to_string(),
            version: CONNECTOR_VERSION.to_string(),
            module: ModuleKind::Accounting,
            status: PluginStatus::Inactive,
            config: PluginRuntimeConfig {
                enabled: true,
                priority: 4,
                dependencies: Vec::new(),
                permissions: vec![
                    "accounting.read".to_string(),
                    "accounting.write".to_string(),
                ],
                api_endpoints: vec![
                    ApiEndpointSpec::new(HttpMethod::Post, "/api/v1/erp/payroll/run", "run_payroll")
                        .with_rate_limit(15),
                    ApiEndpointSpec::new(
                        HttpMethod::Post,
                        "/api/v1/erp/forecast",
                        "forecast_financials",
                    )
                    .with_rate_limit(30),
                ],
                webhooks: vec![
                    WebhookSpec::new("invoice.paid"),
                    WebhookSpec::new("payroll.completed"),
                ],
            },
            capabilities: PluginCapabilities {
                ai_enabled: false,
                real_time_sync: true,
                cross_module_data: true,
                industry_specific: false,
                custom_fields: false,
            },
        }
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        self.mapping.validate()?;
        self.client.test_connection().await?;
        self.bus.unsubscribe_owner(ModuleKind::Accounting).await;
        self.register_event_handlers().await?;
        info!("ERPNext accounting connector initialized");
        Ok(())
    }

    async fn activate(&self) -> ConnectorResult<()> {
        let token = CancellationToken::new();
        let mut guard = self.monitor.lock().await;
        if let Some(old) = guard.take() {
            old.cancel();
        }
        *guard = Some(token.clone());

        tokio::spawn(invoice_monitor(
            self.client.clone(),
            self.bus.clone(),
            self.seen_invoices.clone(),
            self.monitor_primed.clone(),
            self.tenant.clone(),
            self.poll_interval,
            token,
        ));
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Invoice monitor started"
        );
        Ok(())
    }

    async fn deactivate(&self) -> ConnectorResult<()> {
        self.stop_monitor().await;
        let removed = self.bus.unsubscribe_owner(ModuleKind::Accounting).await;
        debug!(removed, "ERPNext accounting connector deactivated");
        Ok(())
    }

    async fn destroy(&self) -> ConnectorResult<()> {
        self.stop_monitor().await;
        self.bus.unsubscribe_owner(ModuleKind::Accounting).await;
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<bool> {
        match self.client.test_connection().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "ERPNext health probe failed");
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
            debug!(kind = %batch.kind, "Kind not mapped for accounting, batch skipped");
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
            "Accounting sync pass finished"
        );
        Ok(report)
    }
}
