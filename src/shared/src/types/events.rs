//! Domain event schema for cross-connector notification
//!
//! Events travel over an in-process pub/sub bus keyed by [`ModuleKind`]
//! channel. Connectors subscribe to foreign channels at initialize time and
//! publish to their own channel when local state changes or an AI prediction
//! crosses an alert threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::core::{EntityKind, ModuleKind};

// ============================================================================
// EVENT KINDS
// ============================================================================

/// Every event kind the bus carries, across all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    CompanyCreated,
    CompanyUpdated,
    OpportunityStageChanged,
    OpportunityWon,
    InvoicePaid,
    PayrollCompleted,
    ProjectCompleted,
    WorkOrderCompleted,
    QualityAlert,
    AiPredictionReady,
    SyncCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CompanyCreated => "COMPANY_CREATED",
            EventKind::CompanyUpdated => "COMPANY_UPDATED",
            EventKind::OpportunityStageChanged => "OPPORTUNITY_STAGE_CHANGED",
            EventKind::OpportunityWon => "OPPORTUNITY_WON",
            EventKind::InvoicePaid => "INVOICE_PAID",
            EventKind::PayrollCompleted => "PAYROLL_COMPLETED",
            EventKind::ProjectCompleted => "PROJECT_COMPLETED",
            EventKind::WorkOrderCompleted => "WORK_ORDER_COMPLETED",
            EventKind::QualityAlert => "QUALITY_ALERT",
            EventKind::AiPredictionReady => "AI_PREDICTION_READY",
            EventKind::SyncCompleted => "SYNC_COMPLETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EVENT ENVELOPE
// ============================================================================

/// One event on the bus.
///
/// `module` is the channel the event was published on; `correlation_id`
/// links events caused by the same upstream action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub module: ModuleKind,
    pub kind: EventKind,
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub tenant_id: String,
    pub payload: serde_json::Value,
    pub correlation_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(module: ModuleKind, kind: EventKind, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            module,
            kind,
            entity_kind: None,
            entity_id: None,
            tenant_id: tenant_id.into(),
            payload: serde_json::Value::Null,
            correlation_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_entity(mut self, kind: EntityKind, id: impl Into<String>) -> Self {
        self.entity_kind = Some(kind);
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}
