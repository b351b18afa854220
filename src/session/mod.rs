pub mod pool;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};

pub use pool::{PooledSession, SessionPool};

/// Narrow capability over one authenticated interactive tab. Implemented once
/// per automation backend and selected at startup; the core never branches on
/// backend shape beyond this trait.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn navigate(&self, url: &str) -> GatewayResult<()>;

    /// Evaluates a script inside the authenticated context and returns its
    /// JSON result. `args` is passed to the script as its single argument.
    async fn evaluate(&self, script: &str, args: Value) -> GatewayResult<Value>;
}

/// Builds backend instances for the resource pool. One implementation per
/// supported automation engine, chosen when the gateway is wired up.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> GatewayResult<Arc<dyn SessionBackend>>;
}

/// One logical interactive tab. Entry navigation must complete before first
/// use; the handle carries no request-specific state across reuses.
#[derive(Clone)]
pub struct SessionHandle {
    backend: Arc<dyn SessionBackend>,
}

impl SessionHandle {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    /// One-time bootstrap for a freshly constructed handle.
    pub async fn bootstrap(&self, entry_url: &str) -> GatewayResult<()> {
        tracing::debug!("[Session] Bootstrapping handle via {}", entry_url);
        self.backend.navigate(entry_url).await
    }

    pub async fn evaluate(&self, script: &str, args: Value) -> GatewayResult<Value> {
        self.backend.evaluate(script, args).await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

/// Result shape every in-page round trip resolves to.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub ok: bool,
    pub text: String,
}

impl FetchOutcome {
    /// The scripts resolve to `{status, ok, text}`; anything else means the
    /// backend returned something other than the script result.
    pub fn from_value(value: &Value) -> GatewayResult<Self> {
        let status = value
            .get("status")
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| GatewayError::Transport {
                status: None,
                body: format!("malformed fetch result: {}", value),
            })?;
        let ok = value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
        let text = value
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self { status, ok, text })
    }
}
