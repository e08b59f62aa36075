//! Shared type definitions for the OmniFlow connector platform
//!
//! Everything the connector hub and its external collaborators (plugin
//! orchestrator, AI orchestrator, deployment tooling) agree on lives here.

pub mod core;
pub mod events;
pub mod tasks;

// Re-export core types
pub use core::{
    ApiEndpointSpec,
    BackoffKind,
    // Entities
    EntityKind,
    HttpMethod,
    // Domain modules
    ModuleKind,
    PluginCapabilities,
    // Plugin contract
    PluginDescriptor,
    PluginRuntimeConfig,
    PluginStatus,
    RiskLevel,
    // Sync
    SyncBatch,
    SyncDirection,
    SyncReport,
    TenantContext,
    WebhookRetryPolicy,
    WebhookSpec,
};

// Re-export AI task types
pub use tasks::{
    AiTask,
    AiTaskRequest,
    EntityContext,
    ExecutionConstraints,
    TaskId,
    TaskPriority,
    TaskResult,
    TaskStatus,
    TaskType,
};

// Re-export event types
pub use events::{DomainEvent, EventKind};
