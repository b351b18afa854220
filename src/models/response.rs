use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub id: String,
    pub model: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCreatedBody {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResultBody {
    pub task_id: String,
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Every failure resolves to this shape; `error` is the only discriminator a
/// caller needs to check.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: GatewayError,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ErrorBody {
    pub fn new(error: GatewayError) -> Self {
        Self {
            error,
            chat_id: None,
            task_id: None,
            status: None,
        }
    }

    pub fn with_chat(mut self, chat_id: Option<String>) -> Self {
        self.chat_id = chat_id;
        self
    }

    pub fn with_task(mut self, task_id: String) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GenerationReply {
    Sync(SyncResult),
    TaskCreated(TaskCreatedBody),
    TaskCompleted(TaskResultBody),
    Error(ErrorBody),
}

impl GenerationReply {
    pub fn error(&self) -> Option<&GatewayError> {
        match self {
            GenerationReply::Error(body) => Some(&body.error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

impl From<ErrorBody> for GenerationReply {
    fn from(body: ErrorBody) -> Self {
        GenerationReply::Error(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_serializes_error_field_only_discriminator() {
        let reply = GenerationReply::Error(
            ErrorBody::new(GatewayError::TaskTimeout {
                task_id: "t-1".to_string(),
            })
            .with_task("t-1".to_string()),
        );
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.get("error").is_some());
        assert_eq!(json["task_id"], "t-1");
        assert!(json.get("chat_id").is_none());
    }

    #[test]
    fn sync_result_omits_absent_optionals() {
        let reply = GenerationReply::Sync(SyncResult {
            id: "gen-1".to_string(),
            model: "standard".to_string(),
            content: "hello".to_string(),
            usage: None,
            response_id: None,
            chat_id: "c-1".to_string(),
            parent_id: None,
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.get("usage").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["content"], "hello");
    }
}
