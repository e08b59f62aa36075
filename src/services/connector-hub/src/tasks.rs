//! AI task submission and completion polling
//!
//! Connectors delegate model work to the external orchestrator: submit a
//! typed request, hold the task id, poll until terminal. The orchestrator
//! owns task state; nothing here retries a failed task. Polling uses bounded
//! exponential backoff with a hard deadline and honors a cancellation token,
//! so a caller can abort a wait without leaking the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use omniflow_shared::{AiTask, AiTaskRequest, TaskId, TaskResult, TaskStatus};

use crate::config::{OrchestratorConfig, PollConfig};
use crate::error::{ConnectorError, ConnectorResult};

// ============================================================================
// ORCHESTRATOR API
// ============================================================================

/// The orchestrator surface the hub depends on. Kept narrow so tests can
/// script it.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Submit a task and receive the id the orchestrator minted for it
    async fn submit_task(&self, request: &AiTaskRequest) -> ConnectorResult<TaskId>;

    /// Fetch the current state of a task
    async fn task_status(&self, id: &TaskId) -> ConnectorResult<AiTask>;

    /// Ask the orchestrator to stop a task. Best effort; an already-terminal
    /// task is not an error.
    async fn cancel_task(&self, id: &TaskId) -> ConnectorResult<()>;
}

#[derive(serde::Deserialize)]
struct SubmitTaskResponse {
    task_id: String,
}

/// HTTP client for the task orchestrator.
pub struct HttpOrchestrator {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpOrchestrator {
    pub fn new(config: &OrchestratorConfig) -> ConnectorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl OrchestratorApi for HttpOrchestrator {
    async fn submit_task(&self, request: &AiTaskRequest) -> ConnectorResult<TaskId> {
        let response = self
            .request(reqwest::Method::POST, "/api/v1/tasks")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::external_api(
                "orchestrator",
                status.as_u16(),
                body,
            ));
        }
        let parsed: SubmitTaskResponse = response.json().await?;
        Ok(TaskId(parsed.task_id))
    }

    async fn task_status(&self, id: &TaskId) -> ConnectorResult<AiTask> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/v1/tasks/{}", id))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ConnectorError::not_found(format!("task {}", id)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::external_api(
                "orchestrator",
                status.as_u16(),
                body,
            ));
        }
        Ok(response.json().await?)
    }

    async fn cancel_task(&self, id: &TaskId) -> ConnectorResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/api/v1/tasks/{}", id))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConnectorError::external_api(
            "orchestrator",
            status.as_u16(),
            body,
        ))
    }
}

// ============================================================================
// TASK CLIENT
// ============================================================================

/// Connector-facing task service: submit, wait, map failures.
pub struct TaskClient {
    api: Arc<dyn OrchestratorApi>,
    poll: PollConfig,
}

impl TaskClient {
    pub fn new(api: Arc<dyn OrchestratorApi>, poll: PollConfig) -> Self {
        Self { api, poll }
    }

    pub async fn submit(&self, request: &AiTaskRequest) -> ConnectorResult<TaskId> {
        self.api.submit_task(request).await
    }

    pub async fn status(&self, id: &TaskId) -> ConnectorResult<AiTask> {
        self.api.task_status(id).await
    }

    /// Wait for a task to reach a terminal state, using the configured
    /// deadline.
    pub async fn wait_for_completion(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<AiTask> {
        self.wait_with_deadline(task_id, self.poll.timeout_ms, cancel)
            .await
    }

    /// Poll a task until terminal or the deadline passes.
    ///
    /// The first poll fires immediately, so an already-terminal task returns
    /// without sleeping. Poll spacing starts at the configured interval,
    /// grows by the multiplier and is capped at the interval ceiling; the
    /// final sleep is clipped to the deadline so one last poll lands on it.
    #[instrument(skip(self, cancel), fields(task_id = %task_id))]
    pub async fn wait_with_deadline(
        &self,
        task_id: &TaskId,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> ConnectorResult<AiTask> {
        let started = Instant::now();
        let mut interval_ms = self.poll.initial_interval_ms;

        loop {
            if cancel.is_cancelled() {
                return Err(ConnectorError::task_cancelled(task_id.as_str()));
            }

            let task = self.api.task_status(task_id).await?;
            if task.is_terminal() {
                debug!(status = ?task.status, "Task reached terminal state");
                return Ok(task);
            }

            let elapsed = started.elapsed().as_millis() as u64;
            if elapsed >= timeout_ms {
                return Err(ConnectorError::task_timeout(task_id.as_str(), elapsed));
            }

            let wait = interval_ms.min(timeout_ms - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ConnectorError::task_cancelled(task_id.as_str()));
                }
                _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
            }

            interval_ms = ((interval_ms as f64) * self.poll.multiplier) as u64;
            interval_ms = interval_ms.min(self.poll.max_interval_ms);
        }
    }

    /// Submit a task and block until it completes, mapping any reported
    /// failure to the operation's error ("Lead scoring failed", ...).
    /// Timeouts and cancellations keep their own error kinds.
    pub async fn execute(
        &self,
        request: AiTaskRequest,
        cancel: &CancellationToken,
    ) -> ConnectorResult<TaskResult> {
        let operation = request.task_type.label();
        let task_id = self.api.submit_task(&request).await?;
        debug!(task_id = %task_id, task_type = %request.task_type, "Task submitted");

        let task = self.wait_for_completion(&task_id, cancel).await?;
        match task.result {
            Some(result) if task.status == TaskStatus::Completed && result.success => Ok(result),
            Some(result) => Err(ConnectorError::task_failed(operation, result.error)),
            None => Err(ConnectorError::task_failed(operation, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniflow_shared::TaskType;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted orchestrator: pops one status per poll, repeats the last
    /// entry once the script is exhausted.
    struct ScriptedOrchestrator {
        script: Mutex<VecDeque<AiTask>>,
        fallback: AiTask,
        status_calls: AtomicUsize,
    }

    impl ScriptedOrchestrator {
        fn new(script: Vec<AiTask>, fallback: AiTask) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                status_calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrchestratorApi for ScriptedOrchestrator {
        async fn submit_task(&self, _request: &AiTaskRequest) -> ConnectorResult<TaskId> {
            Ok(TaskId("task-1".to_string()))
        }

        async fn task_status(&self, _id: &TaskId) -> ConnectorResult<AiTask> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.fallback.clone()))
        }

        async fn cancel_task(&self, _id: &TaskId) -> ConnectorResult<()> {
            Ok(())
        }
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            initial_interval_ms: 10,
            multiplier: 2.0,
            max_interval_ms: 40,
            timeout_ms: 200,
        }
    }

    fn pending() -> AiTask {
        AiTask::pending(TaskId("task-1".to_string()))
    }

    #[tokio::test]
    async fn test_terminal_on_first_poll_returns_immediately() {
        let api = ScriptedOrchestrator::new(
            vec![AiTask::completed(
                TaskId("task-1".to_string()),
                TaskResult::ok(json!({"score": 80})),
            )],
            pending(),
        );
        let client = TaskClient::new(api.clone(), fast_poll());

        let started = std::time::Instant::now();
        let task = client
            .wait_for_completion(&TaskId("task-1".to_string()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(api.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let api = ScriptedOrchestrator::new(
            vec![
                pending(),
                pending(),
                AiTask::completed(
                    TaskId("task-1".to_string()),
                    TaskResult::ok(json!({"ok": true})),
                ),
            ],
            pending(),
        );
        let client = TaskClient::new(api.clone(), fast_poll());

        let task = client
            .wait_for_completion(&TaskId("task-1".to_string()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_timeout_raises_task_timeout() {
        let api = ScriptedOrchestrator::new(vec![], pending());
        let client = TaskClient::new(api.clone(), fast_poll());

        let err = client
            .wait_for_completion(&TaskId("task-1".to_string()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::TaskTimeout { .. }));
        assert_eq!(err.to_string(), "Task timeout");
        // 10 + 20 + 40 + 40 + 40 + 40 covers the 200ms deadline, plus the
        // immediate first poll and the final poll on the deadline
        assert!(api.calls() >= 4);
        assert!(api.calls() <= 10);
    }

    #[tokio::test]
    async fn test_backoff_polls_less_than_fixed_interval_would() {
        let api = ScriptedOrchestrator::new(vec![], pending());
        let client = TaskClient::new(api.clone(), fast_poll());

        let _ = client
            .wait_for_completion(&TaskId("task-1".to_string()), &CancellationToken::new())
            .await;

        // A fixed 10ms interval over 200ms would poll about 20 times
        assert!(api.calls() < 12);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let api = ScriptedOrchestrator::new(vec![], pending());
        let client = TaskClient::new(
            api,
            PollConfig {
                initial_interval_ms: 5_000,
                multiplier: 2.0,
                max_interval_ms: 5_000,
                timeout_ms: 60_000,
            },
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = client
            .wait_for_completion(&TaskId("task-1".to_string()), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::TaskCancelled { .. }));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_execute_success_returns_result() {
        let api = ScriptedOrchestrator::new(
            vec![AiTask::completed(
                TaskId("task-1".to_string()),
                TaskResult::ok(json!({"score": 91})).with_confidence(0.88),
            )],
            pending(),
        );
        let client = TaskClient::new(api, fast_poll());

        let request = AiTaskRequest::new(TaskType::LeadScoring, json!({"lead": "l-1"}), "t1", "w1");
        let result = client
            .execute(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.data["score"], 91);
        assert_eq!(result.confidence, Some(0.88));
    }

    #[tokio::test]
    async fn test_execute_failure_maps_to_operation_error() {
        let api = ScriptedOrchestrator::new(
            vec![AiTask::failed(
                TaskId("task-1".to_string()),
                "model unavailable",
            )],
            pending(),
        );
        let client = TaskClient::new(api, fast_poll());

        let request = AiTaskRequest::new(TaskType::LeadScoring, json!({"lead": "l-1"}), "t1", "w1");
        let err = client
            .execute(request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Lead scoring failed");
        match err {
            ConnectorError::TaskFailed { detail, .. } => {
                assert_eq!(detail.as_deref(), Some("model unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_completed_without_success_flag_fails() {
        let mut task = AiTask::completed(
            TaskId("task-1".to_string()),
            TaskResult::err("confidence below threshold"),
        );
        task.status = TaskStatus::Completed;
        let api = ScriptedOrchestrator::new(vec![task], pending());
        let client = TaskClient::new(api, fast_poll());

        let request =
            AiTaskRequest::new(TaskType::ChurnPrediction, json!({"customer": "c"}), "t", "w");
        let err = client
            .execute(request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Churn prediction failed");
    }
}
