use serde_json::Value;

use crate::constants::{SSE_DATA_PREFIX, SSE_DONE_SENTINEL};

/// Aggregate of one streamed response: partial-content frames concatenated in
/// arrival order, the first-seen response id, and the last-seen usage object.
#[derive(Debug, Default, Clone)]
pub struct StreamAggregate {
    pub content: String,
    pub usage: Option<Value>,
    pub response_id: Option<String>,
}

fn frame_content(frame: &Value) -> Option<&str> {
    frame
        .pointer("/choices/0/delta/content")
        .or_else(|| frame.get("content"))
        .and_then(|v| v.as_str())
}

fn frame_response_id(frame: &Value) -> Option<&str> {
    frame
        .get("response_id")
        .or_else(|| frame.get("id"))
        .and_then(|v| v.as_str())
}

fn frame_is_final(frame: &Value) -> bool {
    if frame
        .pointer("/choices/0/finish_reason")
        .map(|v| !v.is_null())
        .unwrap_or(false)
    {
        return true;
    }
    matches!(
        frame.get("status").and_then(|v| v.as_str()),
        Some("finished") | Some("done")
    )
}

/// Folds the raw SSE text of one streamed response. Frames are line-prefixed
/// `data: <json>`; aggregation stops at a completion frame or stream end.
/// Unparseable frames are skipped, not fatal — the upstream interleaves
/// heartbeats and comment lines with real frames.
pub fn aggregate_stream(raw: &str) -> StreamAggregate {
    let mut aggregate = StreamAggregate::default();

    for line in raw.lines() {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == SSE_DONE_SENTINEL {
            if payload == SSE_DONE_SENTINEL {
                break;
            }
            continue;
        }

        let Ok(frame) = serde_json::from_str::<Value>(payload) else {
            tracing::debug!("[Stream] Skipping unparseable frame: {}", payload);
            continue;
        };

        if let Some(content) = frame_content(&frame) {
            aggregate.content.push_str(content);
        }
        if aggregate.response_id.is_none() {
            if let Some(id) = frame_response_id(&frame) {
                aggregate.response_id = Some(id.to_string());
            }
        }
        if let Some(usage) = frame.get("usage") {
            if !usage.is_null() {
                aggregate.usage = Some(usage.clone());
            }
        }
        if frame_is_final(&frame) {
            break;
        }
    }

    aggregate
}
