use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Text,
    Image,
    Video,
}

impl ChatType {
    /// Text and image responses arrive as server-pushed frames; video creates
    /// an asynchronous task instead.
    pub fn is_streaming(self) -> bool {
        !matches!(self, ChatType::Video)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
    File { url: String, name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl RequestContent {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestContent::Text(s) => s.trim().is_empty(),
            RequestContent::Parts(parts) => parts.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub content: RequestContent,
    pub model: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub chat_type: ChatType,
    /// Aspect ratio such as "16:9"; image/video only.
    #[serde(default)]
    pub size: Option<String>,
    /// Video only: block until the task reaches a terminal state.
    #[serde(default)]
    pub wait_for_completion: bool,
    #[serde(default)]
    pub retry_count: u32,
}

impl GenerationRequest {
    pub fn validate(&self, known_models: &[String]) -> GatewayResult<()> {
        if self.content.is_empty() {
            return Err(GatewayError::Validation("content must not be empty".into()));
        }
        if self.size.is_some() && self.chat_type == ChatType::Text {
            return Err(GatewayError::Validation(
                "size only applies to image and video requests".into(),
            ));
        }
        if !known_models.iter().any(|m| m == &self.model) {
            return Err(GatewayError::Validation(format!(
                "unknown model: {}",
                self.model
            )));
        }
        Ok(())
    }

    /// Retried copy for the next attempt. The original stays immutable.
    pub fn with_retry(&self, retry_count: u32) -> Self {
        let mut next = self.clone();
        next.retry_count = retry_count;
        next
    }

    /// Upstream completion payload. Text/image requests stream; video does not.
    pub fn build_payload(&self, chat_id: &str) -> Value {
        let content = match &self.content {
            RequestContent::Text(text) => json!(text),
            RequestContent::Parts(parts) => json!(parts),
        };
        let mut payload = json!({
            "stream": self.chat_type.is_streaming(),
            "model": self.model,
            "chat_id": chat_id,
            "parent_id": self.parent_id,
            "chat_type": self.chat_type,
            "messages": [{ "role": "user", "content": content }],
        });
        if let Some(size) = &self.size {
            payload["size"] = json!(size);
        }
        payload
    }
}
