use serde_json::Value;
use std::time::Duration;

use crate::constants::{TASK_FAILED_STATUSES, TASK_NOT_FOUND_MARKERS, TASK_SUCCESS_STATUSES};
use crate::error::{GatewayError, GatewayResult};
use crate::session::{FetchOutcome, SessionHandle};
use crate::upstream::executor::Executor;

/// Extraction precedence for a task identifier in a task-creation body, first
/// match wins: nested provider task reference, top-level id, top-level task
/// reference, response id, nested message id.
pub fn extract_task_id(body: &Value) -> Option<String> {
    const CANDIDATES: [&str; 5] = [
        "/data/task_id",
        "/id",
        "/task_id",
        "/response_id",
        "/data/message_id",
    ];
    CANDIDATES
        .iter()
        .find_map(|pointer| body.pointer(pointer))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Completed {
        result_url: String,
        usage: Option<Value>,
    },
    Failed {
        reason: String,
    },
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }
}

fn result_url(body: &Value) -> Option<String> {
    const CANDIDATES: [&str; 6] = [
        "/data/video_url",
        "/data/url",
        "/data/content",
        "/video_url",
        "/url",
        "/content",
    ];
    CANDIDATES
        .iter()
        .find_map(|pointer| body.pointer(pointer))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn failure_reason(body: &Value) -> String {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str())
        .unwrap_or("upstream reported failure")
        .to_string()
}

/// Maps one status-query round trip onto the poller state machine. An unknown
/// task id is a hard error; any other non-success response is transient and
/// leaves the task `Pending`.
pub fn map_task_status(task_id: &str, outcome: &FetchOutcome) -> GatewayResult<TaskState> {
    let lowered = outcome.text.to_lowercase();
    if TASK_NOT_FOUND_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(GatewayError::TaskNotFound(task_id.to_string()));
    }
    if !outcome.ok {
        tracing::debug!(
            "[TaskPoller] Transient status-query failure ({}) for {}",
            outcome.status,
            task_id
        );
        return Ok(TaskState::Pending);
    }

    let Ok(body) = serde_json::from_str::<Value>(&outcome.text) else {
        tracing::debug!("[TaskPoller] Unparseable status body for {}", task_id);
        return Ok(TaskState::Pending);
    };

    let status = body
        .pointer("/data/status")
        .or_else(|| body.get("status"))
        .or_else(|| body.get("task_status"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    if TASK_SUCCESS_STATUSES.iter().any(|s| *s == status) {
        return Ok(TaskState::Completed {
            result_url: result_url(&body).unwrap_or_default(),
            usage: body.get("usage").filter(|v| !v.is_null()).cloned(),
        });
    }
    if TASK_FAILED_STATUSES.iter().any(|s| *s == status) {
        return Ok(TaskState::Failed {
            reason: failure_reason(&body),
        });
    }
    Ok(TaskState::Pending)
}

/// Drives one created task to a terminal state with bounded, fixed-interval
/// ticks. Each tick is one status query on the caller's own handle; a
/// transient transport failure consumes an attempt without changing state.
pub struct TaskPoller {
    interval: Duration,
    max_attempts: u32,
}

impl TaskPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Returns the first terminal state, or `TimedOut` after exactly
    /// `max_attempts` non-terminal ticks. `TaskNotFound` propagates as an
    /// error; polling an id the upstream never knew cannot converge.
    pub async fn poll(
        &self,
        executor: &Executor,
        handle: &SessionHandle,
        token: &str,
        task_id: &str,
    ) -> GatewayResult<TaskState> {
        for attempt in 1..=self.max_attempts {
            match executor.query_task(handle, token, task_id).await {
                Ok(outcome) => {
                    let state = map_task_status(task_id, &outcome)?;
                    if state.is_terminal() {
                        tracing::info!(
                            "[TaskPoller] Task {} terminal after {} tick(s)",
                            task_id,
                            attempt
                        );
                        return Ok(state);
                    }
                }
                Err(e) => {
                    // Consumes the attempt; state stays Pending.
                    tracing::warn!(
                        "[TaskPoller] Tick {}/{} for {} failed: {}",
                        attempt,
                        self.max_attempts,
                        task_id,
                        e
                    );
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        tracing::warn!(
            "[TaskPoller] Task {} still pending after {} attempts",
            task_id,
            self.max_attempts
        );
        Ok(TaskState::TimedOut)
    }
}
