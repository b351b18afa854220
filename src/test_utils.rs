#![cfg(test)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GatewayError, GatewayResult};
use crate::session::{SessionBackend, SessionFactory, SessionHandle};

/// One scripted upstream round trip.
#[derive(Debug, Clone)]
pub(crate) enum ScriptedCall {
    Ok { text: String },
    Error { status: u16, body: String },
    TransportFailure { message: String },
}

impl ScriptedCall {
    pub(crate) fn ok_text(text: &str) -> Self {
        ScriptedCall::Ok {
            text: text.to_string(),
        }
    }

    pub(crate) fn error(status: u16, body: &str) -> Self {
        ScriptedCall::Error {
            status,
            body: body.to_string(),
        }
    }

    pub(crate) fn transport_failure(message: &str) -> Self {
        ScriptedCall::TransportFailure {
            message: message.to_string(),
        }
    }
}

/// Shared queue of scripted responses. Every handle minted from the same
/// queue consumes from it in order, so a multi-attempt scenario scripts one
/// linear sequence regardless of how many handles the pool builds. Running
/// past the end panics: a test that issues more calls than it scripted is
/// broken.
pub(crate) struct ScriptQueue {
    calls: Mutex<VecDeque<ScriptedCall>>,
    evaluations: AtomicUsize,
    navigations: AtomicUsize,
}

impl ScriptQueue {
    pub(crate) fn new(calls: Vec<ScriptedCall>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(calls.into()),
            evaluations: AtomicUsize::new(0),
            navigations: AtomicUsize::new(0),
        })
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub(crate) fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub(crate) fn handle(self: &Arc<Self>) -> SessionHandle {
        SessionHandle::new(Arc::new(ScriptedBackend {
            queue: self.clone(),
        }))
    }
}

struct ScriptedBackend {
    queue: Arc<ScriptQueue>,
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    async fn navigate(&self, _url: &str) -> GatewayResult<()> {
        self.queue.navigations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn evaluate(&self, _script: &str, _args: Value) -> GatewayResult<Value> {
        self.queue.evaluations.fetch_add(1, Ordering::SeqCst);
        let call = self
            .queue
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .expect("scripted backend ran out of responses: unexpected upstream call");
        match call {
            ScriptedCall::Ok { text } => Ok(json!({"status": 200, "ok": true, "text": text})),
            ScriptedCall::Error { status, body } => {
                Ok(json!({"status": status, "ok": false, "text": body}))
            }
            ScriptedCall::TransportFailure { message } => Err(GatewayError::Transport {
                status: None,
                body: message,
            }),
        }
    }
}

/// Session factory minting handles off one shared queue.
pub(crate) struct ScriptedFactory {
    pub(crate) queue: Arc<ScriptQueue>,
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create(&self) -> GatewayResult<Arc<dyn SessionBackend>> {
        Ok(Arc::new(ScriptedBackend {
            queue: self.queue.clone(),
        }))
    }
}
