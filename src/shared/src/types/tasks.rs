//! AI task delegation types
//!
//! Connectors do not run AI models themselves. They assemble a typed task
//! request, submit it to the external AI orchestrator, and poll the task id
//! until a terminal state. The orchestrator owns task state end to end; a
//! connector only ever holds the `TaskId`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::core::EntityKind;

// ============================================================================
// TASK IDENTITY AND CLASSIFICATION
// ============================================================================

/// Opaque task identifier minted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        TaskId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

/// What the orchestrator is being asked to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    LeadScoring,
    ChurnPrediction,
    WorkflowOptimization,
    CompletionForecast,
    ProductionOptimization,
    MaintenancePrediction,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::LeadScoring => "LEAD_SCORING",
            TaskType::ChurnPrediction => "CHURN_PREDICTION",
            TaskType::WorkflowOptimization => "WORKFLOW_OPTIMIZATION",
            TaskType::CompletionForecast => "COMPLETION_FORECAST",
            TaskType::ProductionOptimization => "PRODUCTION_OPTIMIZATION",
            TaskType::MaintenancePrediction => "MAINTENANCE_PREDICTION",
        }
    }

    /// Human operation label used in error messages ("Lead scoring failed").
    pub fn label(&self) -> &'static str {
        match self {
            TaskType::LeadScoring => "Lead scoring",
            TaskType::ChurnPrediction => "Churn prediction",
            TaskType::WorkflowOptimization => "Workflow optimization",
            TaskType::CompletionForecast => "Completion forecast",
            TaskType::ProductionOptimization => "Production optimization",
            TaskType::MaintenancePrediction => "Maintenance prediction",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority forwarded to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

/// Task lifecycle. Created `Pending`; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

// ============================================================================
// TASK SUBMISSION
// ============================================================================

/// Business context attached to a task so the orchestrator can pick models
/// and rules for the right entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityContext {
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    #[serde(default)]
    pub business_rules: Vec<String>,
    pub industry: Option<String>,
}

impl EntityContext {
    pub fn for_entity(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity_kind: Some(kind),
            entity_id: Some(id.into()),
            business_rules: Vec::new(),
            industry: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.business_rules.push(rule.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

/// Limits the orchestrator must respect while executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConstraints {
    pub max_execution_time_ms: u64,
    pub accuracy_threshold: f64,
    pub explainability: bool,
    pub real_time: bool,
}

impl Default for ExecutionConstraints {
    fn default() -> Self {
        Self {
            max_execution_time_ms: 30_000,
            accuracy_threshold: 0.8,
            explainability: false,
            real_time: false,
        }
    }
}

/// A complete task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiTaskRequest {
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub context: EntityContext,
    pub constraints: ExecutionConstraints,
    pub priority: TaskPriority,
    pub tenant_id: String,
    pub workspace_id: String,
}

impl AiTaskRequest {
    pub fn new(
        task_type: TaskType,
        payload: serde_json::Value,
        tenant_id: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            task_type,
            payload,
            context: EntityContext::default(),
            constraints: ExecutionConstraints::default(),
            priority: TaskPriority::default(),
            tenant_id: tenant_id.into(),
            workspace_id: workspace_id.into(),
        }
    }

    pub fn with_context(mut self, context: EntityContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_constraints(mut self, constraints: ExecutionConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

// ============================================================================
// TASK STATE
// ============================================================================

/// Result payload reported by the orchestrator once a task is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
    pub confidence: Option<f64>,
    pub explanation: Option<String>,
}

impl TaskResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            confidence: None,
            explanation: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(message.into()),
            confidence: None,
            explanation: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// A task as reported by the orchestrator's status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiTask {
    pub id: TaskId,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiTask {
    pub fn pending(id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn completed(id: TaskId, result: TaskResult) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Completed,
            result: Some(result),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn failed(id: TaskId, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Failed,
            result: Some(TaskResult::err(message)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&TaskType::LeadScoring).unwrap(),
            "\"LEAD_SCORING\""
        );
        assert_eq!(
            serde_json::to_string(&TaskType::MaintenancePrediction).unwrap(),
            "\"MAINTENANCE_PREDICTION\""
        );
    }

    #[test]
    fn test_task_type_labels() {
        assert_eq!(TaskType::LeadScoring.label(), "Lead scoring");
        assert_eq!(TaskType::ChurnPrediction.label(), "Churn prediction");
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_request_builder() {
        let request = AiTaskRequest::new(
            TaskType::ChurnPrediction,
            json!({"customer_id": "c-1"}),
            "tenant-1",
            "ws-1",
        )
        .with_context(
            EntityContext::for_entity(EntityKind::Company, "c-1").with_industry("manufacturing"),
        )
        .with_priority(TaskPriority::High);

        assert_eq!(request.priority, TaskPriority::High);
        assert_eq!(request.context.entity_id.as_deref(), Some("c-1"));
        assert_eq!(request.context.industry.as_deref(), Some("manufacturing"));
        assert_eq!(request.constraints.max_execution_time_ms, 30_000);
    }

    #[test]
    fn test_task_constructors() {
        let id = TaskId::generate();
        let pending = AiTask::pending(id.clone());
        assert!(!pending.is_terminal());
        assert!(pending.result.is_none());

        let done = AiTask::completed(id.clone(), TaskResult::ok(json!({"score": 82})));
        assert!(done.is_terminal());
        assert!(done.result.as_ref().is_some_and(|r| r.success));

        let failed = AiTask::failed(id, "model unavailable");
        assert!(failed.is_terminal());
        let result = failed.result.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn test_result_builders() {
        let result = TaskResult::ok(json!({"probability": 0.42}))
            .with_confidence(0.9)
            .with_explanation("low engagement drop-off");
        assert_eq!(result.confidence, Some(0.9));
        assert!(result.explanation.is_some());
    }
}
