//! Error handling for the OmniFlow Connector Hub
//!
//! One taxonomy covers the whole connector layer: validation failures, AI
//! task failures and timeouts, lifecycle violations, and external API
//! trouble. Connectors never catch and recover from these locally; every
//! error propagates to the HTTP handler or CLI caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use omniflow_shared::PluginStatus;
use serde_json::json;
use thiserror::Error;

/// Result type alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Error types for the connector hub
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Required-field validation failures
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Lifecycle transitions the state machine does not allow
    #[error("Invalid lifecycle transition for {plugin}: {from} -> {to}")]
    InvalidTransition {
        plugin: String,
        from: PluginStatus,
        to: PluginStatus,
    },

    /// The AI orchestrator reported a task as unsuccessful.
    /// The message is the fixed per-operation string, e.g. "Lead scoring failed".
    #[error("{operation} failed")]
    TaskFailed {
        operation: String,
        detail: Option<String>,
    },

    /// The polling helper gave up waiting for a terminal task state
    #[error("Task timeout")]
    TaskTimeout { task_id: String, waited_ms: u64 },

    /// A caller aborted the wait through the cancellation token
    #[error("Task {task_id} cancelled")]
    TaskCancelled { task_id: String },

    /// Connectivity check against a backing system failed
    #[error("Failed to connect to {system}: {message}")]
    ConnectionFailed { system: String, message: String },

    /// External API errors
    #[error("External API error for {system}: {status_code} - {message}")]
    ExternalApi {
        system: String,
        status_code: u16,
        message: String,
    },

    /// HTTP client errors
    #[error("HTTP client error: {source}")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Declarative transform failures (wrong value shape for a transform)
    #[error("Mapping error for {entity}: {message}")]
    Mapping { entity: String, message: String },

    /// Event bus errors
    #[error("Event bus error: {message}")]
    EventBus { message: String },

    /// Not found errors
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Service unavailable errors
    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ConnectorError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new lifecycle transition error
    pub fn invalid_transition<S: Into<String>>(
        plugin: S,
        from: PluginStatus,
        to: PluginStatus,
    ) -> Self {
        Self::InvalidTransition {
            plugin: plugin.into(),
            from,
            to,
        }
    }

    /// Create a new AI task failure with the fixed "<operation> failed" message
    pub fn task_failed<S: Into<String>>(operation: S, detail: Option<String>) -> Self {
        Self::TaskFailed {
            operation: operation.into(),
            detail,
        }
    }

    /// Create a new task timeout error
    pub fn task_timeout<S: Into<String>>(task_id: S, waited_ms: u64) -> Self {
        Self::TaskTimeout {
            task_id: task_id.into(),
            waited_ms,
        }
    }

    /// Create a new task cancellation error
    pub fn task_cancelled<S: Into<String>>(task_id: S) -> Self {
        Self::TaskCancelled {
            task_id: task_id.into(),
        }
    }

    /// Create a new connection error
    pub fn connection_failed<S1: Into<String>, S2: Into<String>>(system: S1, message: S2) -> Self {
        Self::ConnectionFailed {
            system: system.into(),
            message: message.into(),
        }
    }

    /// Create a new external API error
    pub fn external_api<S1: Into<String>, S2: Into<String>>(
        system: S1,
        status_code: u16,
        message: S2,
    ) -> Self {
        Self::ExternalApi {
            system: system.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new mapping error
    pub fn mapping<S1: Into<String>, S2: Into<String>>(entity: S1, message: S2) -> Self {
        Self::Mapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a new event bus error
    pub fn event_bus<S: Into<String>>(message: S) -> Self {
        Self::EventBus {
            message: message.into(),
        }
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new service unavailable error
    pub fn service_unavailable<S: Into<String>>(service: S) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConnectorError::Configuration { .. } => StatusCode::BAD_REQUEST,
            ConnectorError::Validation { .. } => StatusCode::BAD_REQUEST,
            ConnectorError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ConnectorError::TaskFailed { .. } => StatusCode::BAD_GATEWAY,
            ConnectorError::TaskTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ConnectorError::TaskCancelled { .. } => StatusCode::REQUEST_TIMEOUT,
            ConnectorError::ConnectionFailed { .. } => StatusCode::BAD_GATEWAY,
            ConnectorError::ExternalApi { status_code, .. } => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ConnectorError::NotFound { .. } => StatusCode::NOT_FOUND,
            ConnectorError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ConnectorError::Mapping { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ConnectorError::HttpClient { .. }
            | ConnectorError::Serialization { .. }
            | ConnectorError::EventBus { .. }
            | ConnectorError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error (for API responses)
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::Configuration { .. } => "CONFIGURATION_ERROR",
            ConnectorError::Validation { .. } => "VALIDATION_ERROR",
            ConnectorError::InvalidTransition { .. } => "INVALID_LIFECYCLE_TRANSITION",
            ConnectorError::TaskFailed { .. } => "AI_TASK_FAILED",
            ConnectorError::TaskTimeout { .. } => "TASK_TIMEOUT",
            ConnectorError::TaskCancelled { .. } => "TASK_CANCELLED",
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ExternalApi { .. } => "EXTERNAL_API_ERROR",
            ConnectorError::HttpClient { .. } => "HTTP_CLIENT_ERROR",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
            ConnectorError::Mapping { .. } => "MAPPING_ERROR",
            ConnectorError::EventBus { .. } => "EVENT_BUS_ERROR",
            ConnectorError::NotFound { .. } => "NOT_FOUND",
            ConnectorError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Check if this error is retryable. Advisory only: the connector layer
    /// itself never retries; retries belong to the orchestrator or caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::HttpClient { .. }
            | ConnectorError::ConnectionFailed { .. }
            | ConnectorError::ServiceUnavailable { .. }
            | ConnectorError::TaskTimeout { .. } => true,
            ConnectorError::ExternalApi { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl IntoResponse for ConnectorError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_code = self.error_code();
        let error_message = self.to_string();

        tracing::error!(
            error_code = error_code,
            error_message = %error_message,
            "Connector hub error"
        );

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": error_message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "retryable": self.is_retryable()
            }
        }));

        (status_code, body).into_response()
    }
}
