use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{FETCH_SCRIPT, TASK_QUERY_SCRIPT};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{ChatType, GatewayConfig};
use crate::session::{FetchOutcome, SessionHandle};
use crate::upstream::classifier::{classify_failure, UpstreamFailure};
use crate::upstream::sse::aggregate_stream;
use crate::upstream::task::extract_task_id;

/// Classified outcome of one upstream call.
#[derive(Debug, Clone)]
pub enum UpstreamResponse {
    Synchronous {
        content: String,
        usage: Option<Value>,
        response_id: Option<String>,
    },
    TaskCreated {
        task_id: String,
    },
    Failure(UpstreamFailure),
}

/// Performs single upstream round trips on a supplied handle + token. Carries
/// no pool or retry logic; the one network call is its only side effect.
pub struct Executor {
    config: Arc<GatewayConfig>,
}

impl Executor {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    async fn fetch(
        &self,
        handle: &SessionHandle,
        script: &str,
        args: Value,
    ) -> GatewayResult<FetchOutcome> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let result = tokio::time::timeout(timeout, handle.evaluate(script, args))
            .await
            .map_err(|_| GatewayError::Transport {
                status: None,
                body: format!("request timed out after {}s", timeout.as_secs()),
            })??;
        FetchOutcome::from_value(&result)
    }

    /// One generation call. Text/image payloads stream; the raw frame text is
    /// aggregated here. Video payloads return one JSON document that must
    /// carry a recognizable task identifier.
    pub async fn execute(
        &self,
        handle: &SessionHandle,
        token: &str,
        payload: &Value,
        chat_type: ChatType,
    ) -> GatewayResult<UpstreamResponse> {
        let stream = chat_type.is_streaming();
        let url = self.config.completions_url();
        let outcome = self
            .fetch(handle, FETCH_SCRIPT, json!([url, token, payload, stream]))
            .await?;

        if !outcome.ok {
            tracing::warn!(
                "[Executor] Upstream returned {} ({} bytes)",
                outcome.status,
                outcome.text.len()
            );
            return Ok(UpstreamResponse::Failure(classify_failure(
                Some(outcome.status),
                &outcome.text,
            )));
        }

        if stream {
            let aggregate = aggregate_stream(&outcome.text);
            // The upstream sometimes delivers error documents with a 2xx
            // status. A body that produced no frame at all is only a success
            // if the classifier finds no marker in it.
            if aggregate.content.is_empty()
                && aggregate.response_id.is_none()
                && aggregate.usage.is_none()
            {
                match classify_failure(Some(outcome.status), &outcome.text) {
                    UpstreamFailure::Generic { .. } => {}
                    failure => {
                        tracing::warn!(
                            "[Executor] Error body behind {} status: {:?}",
                            outcome.status,
                            failure
                        );
                        return Ok(UpstreamResponse::Failure(failure));
                    }
                }
            }
            return Ok(UpstreamResponse::Synchronous {
                content: aggregate.content,
                usage: aggregate.usage,
                response_id: aggregate.response_id,
            });
        }

        let body: Value =
            serde_json::from_str(&outcome.text).map_err(|e| GatewayError::Transport {
                status: Some(outcome.status),
                body: format!("malformed task-creation body: {}", e),
            })?;
        match extract_task_id(&body) {
            Some(task_id) => Ok(UpstreamResponse::TaskCreated { task_id }),
            None => Err(GatewayError::Transport {
                status: Some(outcome.status),
                body: "task id missing".to_string(),
            }),
        }
    }

    /// Creates a fresh chat and returns its id. Failed calls classify the
    /// same way generation calls do.
    pub async fn create_chat(
        &self,
        handle: &SessionHandle,
        token: &str,
        model: &str,
        chat_type: ChatType,
    ) -> GatewayResult<Result<String, UpstreamFailure>> {
        let url = self.config.new_chat_url();
        let payload = json!({ "model": model, "chat_type": chat_type });
        let outcome = self
            .fetch(handle, FETCH_SCRIPT, json!([url, token, payload, false]))
            .await?;

        if !outcome.ok {
            return Ok(Err(classify_failure(Some(outcome.status), &outcome.text)));
        }

        let body: Value =
            serde_json::from_str(&outcome.text).map_err(|e| GatewayError::Transport {
                status: Some(outcome.status),
                body: format!("malformed new-chat body: {}", e),
            })?;
        let chat_id = body
            .pointer("/data/id")
            .or_else(|| body.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Transport {
                status: Some(outcome.status),
                body: "chat id missing".to_string(),
            })?;
        tracing::debug!("[Executor] Created chat {}", chat_id);
        Ok(Ok(chat_id.to_string()))
    }

    /// One task status query: the transport primitive the poller ticks with.
    pub async fn query_task(
        &self,
        handle: &SessionHandle,
        token: &str,
        task_id: &str,
    ) -> GatewayResult<FetchOutcome> {
        let url = self.config.task_status_url(task_id);
        self.fetch(handle, TASK_QUERY_SCRIPT, json!([url, token]))
            .await
    }
}
