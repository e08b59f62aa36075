//! Core type definitions for the OmniFlow connector platform
//!
//! This module contains the types shared between the connector hub, the
//! plugin orchestrator, and the deployment tooling: domain module keys,
//! entity kinds, and the plugin descriptor contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

// ============================================================================
// DOMAIN MODULE TYPES
// ============================================================================

/// Business domain a connector belongs to; also keys the event bus channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleKind {
    Crm,
    Accounting,
    ProjectManagement,
    Manufacturing,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Crm => "CRM",
            ModuleKind::Accounting => "ACCOUNTING",
            ModuleKind::ProjectManagement => "PROJECT_MANAGEMENT",
            ModuleKind::Manufacturing => "MANUFACTURING",
        }
    }

    /// All channels, in a stable order. Used by the bus and the health report.
    pub fn all() -> [ModuleKind; 4] {
        [
            ModuleKind::Crm,
            ModuleKind::Accounting,
            ModuleKind::ProjectManagement,
            ModuleKind::Manufacturing,
        ]
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "CRM" => Ok(ModuleKind::Crm),
            "ACCOUNTING" => Ok(ModuleKind::Accounting),
            "PROJECT_MANAGEMENT" => Ok(ModuleKind::ProjectManagement),
            "MANUFACTURING" => Ok(ModuleKind::Manufacturing),
            _ => Err(format!("Unknown module: {}", s)),
        }
    }
}

// ============================================================================
// ENTITY TYPES
// ============================================================================

/// Canonical entity kinds understood by the mapping and validation layers.
///
/// Dispatch on entity shape happens through this enum rather than free-form
/// string tags, so an unknown kind cannot reach the transform engine. Strings
/// from the wire are parsed at the boundary via `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Person,
    Opportunity,
    Project,
    Issue,
    Cycle,
    ProjectModule,
    WorkOrder,
    Product,
    Equipment,
    QualityCheck,
    Employee,
    Invoice,
    BillOfMaterials,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Person => "person",
            EntityKind::Opportunity => "opportunity",
            EntityKind::Project => "project",
            EntityKind::Issue => "issue",
            EntityKind::Cycle => "cycle",
            EntityKind::ProjectModule => "project_module",
            EntityKind::WorkOrder => "work_order",
            EntityKind::Product => "product",
            EntityKind::Equipment => "equipment",
            EntityKind::QualityCheck => "quality_check",
            EntityKind::Employee => "employee",
            EntityKind::Invoice => "invoice",
            EntityKind::BillOfMaterials => "bill_of_materials",
        }
    }

    /// Fields spot-checked by `validate_record`. One or two per kind; this is
    /// deliberately not a schema validator.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Company => &["name"],
            EntityKind::Person => &["last_name"],
            EntityKind::Opportunity => &["name", "stage"],
            EntityKind::Project => &["name"],
            EntityKind::Issue => &["title"],
            EntityKind::Cycle => &["name"],
            EntityKind::ProjectModule => &["name"],
            EntityKind::WorkOrder => &["product_id"],
            EntityKind::Product => &["sku"],
            EntityKind::Equipment => &["name"],
            EntityKind::QualityCheck => &["work_order_id"],
            EntityKind::Employee => &["employee_id"],
            EntityKind::Invoice => &["number"],
            EntityKind::BillOfMaterials => &["product_id"],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "company" => Ok(EntityKind::Company),
            "person" => Ok(EntityKind::Person),
            "opportunity" => Ok(EntityKind::Opportunity),
            "project" => Ok(EntityKind::Project),
            "issue" => Ok(EntityKind::Issue),
            "cycle" => Ok(EntityKind::Cycle),
            "project_module" => Ok(EntityKind::ProjectModule),
            "work_order" => Ok(EntityKind::WorkOrder),
            "product" => Ok(EntityKind::Product),
            "equipment" => Ok(EntityKind::Equipment),
            "quality_check" => Ok(EntityKind::QualityCheck),
            "employee" => Ok(EntityKind::Employee),
            "invoice" => Ok(EntityKind::Invoice),
            "bill_of_materials" => Ok(EntityKind::BillOfMaterials),
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

// ============================================================================
// PLUGIN LIFECYCLE TYPES
// ============================================================================

/// Lifecycle status of a connector plugin.
///
/// `Loading` covers both "initialize in progress" and "initialized, awaiting
/// activation". `Error` requires a re-initialize before the plugin can be
/// activated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginStatus {
    Inactive,
    Loading,
    Active,
    Error,
}

impl Default for PluginStatus {
    fn default() -> Self {
        PluginStatus::Inactive
    }
}

impl PluginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Inactive => "INACTIVE",
            PluginStatus::Loading => "LOADING",
            PluginStatus::Active => "ACTIVE",
            PluginStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PLUGIN DESCRIPTOR TYPES
// ============================================================================

/// HTTP method of a declared endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// One REST endpoint a plugin declares for the external router.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiEndpointSpec {
    #[validate(length(min = 1))]
    pub path: String,
    pub method: HttpMethod,
    /// Handler name on the connector, e.g. `calculate_lead_score`.
    #[validate(length(min = 1))]
    pub handler: String,
    pub auth_required: bool,
    /// Requests per window. Declared limits range 15-200.
    #[validate(range(min = 15, max = 200))]
    pub rate_limit: u32,
}

impl ApiEndpointSpec {
    pub fn new(method: HttpMethod, path: &str, handler: &str) -> Self {
        Self {
            path: path.to_string(),
            method,
            handler: handler.to_string(),
            auth_required: true,
            rate_limit: 100,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn public(mut self) -> Self {
        self.auth_required = false;
        self
    }
}

/// Backoff shape for webhook redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

/// Retry policy attached to a declared webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRetryPolicy {
    pub attempts: u32,
    pub backoff: BackoffKind,
}

impl Default for WebhookRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffKind::Exponential,
        }
    }
}

/// One internal event a plugin wants delivered as a webhook.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WebhookSpec {
    /// Dotted event name, e.g. `company.created`.
    #[validate(length(min = 1))]
    pub event: String,
    #[serde(default)]
    pub retry: WebhookRetryPolicy,
}

impl WebhookSpec {
    pub fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            retry: WebhookRetryPolicy::default(),
        }
    }
}

/// Runtime configuration a plugin publishes in its descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PluginRuntimeConfig {
    pub enabled: bool,
    /// Lower priorities initialize first.
    pub priority: u8,
    /// Plugin ids that must be initialized before this one.
    pub dependencies: Vec<String>,
    /// Permission strings the hosting platform must grant.
    pub permissions: Vec<String>,
    #[validate]
    pub api_endpoints: Vec<ApiEndpointSpec>,
    #[validate]
    pub webhooks: Vec<WebhookSpec>,
}

impl Default for PluginRuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 10,
            dependencies: Vec::new(),
            permissions: Vec::new(),
            api_endpoints: Vec::new(),
            webhooks: Vec::new(),
        }
    }
}

/// Feature switches a plugin advertises.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PluginCapabilities {
    pub ai_enabled: bool,
    pub real_time_sync: bool,
    pub cross_module_data: bool,
    pub industry_specific: bool,
    pub custom_fields: bool,
}

/// Identity, status, config and capabilities of one connector plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub module: ModuleKind,
    pub status: PluginStatus,
    pub config: PluginRuntimeConfig,
    pub capabilities: PluginCapabilities,
}

// ============================================================================
// SYNC TYPES
// ============================================================================

/// Direction of a data synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    #[serde(rename = "IN")]
    Inbound,
    #[serde(rename = "OUT")]
    Outbound,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Inbound => "IN",
            SyncDirection::Outbound => "OUT",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of records of one entity kind handed to a sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    pub kind: EntityKind,
    pub records: Vec<serde_json::Value>,
}

impl SyncBatch {
    pub fn new(kind: EntityKind, records: Vec<serde_json::Value>) -> Self {
        Self { kind, records }
    }
}

/// Outcome of one sync pass. There is no conflict resolution; the last
/// write wins because no entity carries a version field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced: u64,
    pub skipped: u64,
    pub failed: u64,
    pub duration_ms: u64,
}

// ============================================================================
// SHARED DOMAIN VALUE TYPES
// ============================================================================

/// Coarse risk bucket used by churn and maintenance predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a probability in `[0, 1]`. Above 0.7 is high risk.
    pub fn from_probability(p: f64) -> Self {
        if p > 0.7 {
            RiskLevel::High
        } else if p > 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Tenant/workspace pair stamped on every AI task and domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub workspace_id: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workspace_id: workspace_id.into(),
        }
    }
}
