use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::GatewayResult;
use crate::session::SessionHandle;

struct PoolInner {
    idle: Mutex<Vec<SessionHandle>>,
    capacity: usize,
    /// Bumped by `drain`; handles checked out under an older epoch are
    /// disposed instead of returned, so stale sessions never outlive a forced
    /// re-authentication.
    epoch: AtomicU64,
}

/// Bounded cache of idle session handles. `capacity` bounds both the idle set
/// and the number of concurrent holders; callers wait on the semaphore rather
/// than fail when the pool is saturated.
pub struct SessionPool {
    inner: Arc<PoolInner>,
    permits: Arc<Semaphore>,
}

impl SessionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
                epoch: AtomicU64::new(0),
            }),
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Hands out a pooled idle handle, or constructs one via `factory` after
    /// a permit is available. The returned guard gives the handle back on
    /// drop, so an abandoned request cannot leak it.
    pub async fn acquire<F, Fut>(&self, factory: F) -> GatewayResult<PooledSession>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<SessionHandle>>,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("session pool semaphore closed");

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let pooled = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();

        let handle = match pooled {
            Some(handle) => {
                tracing::debug!("[SessionPool] Reusing idle handle");
                handle
            }
            None => {
                tracing::debug!("[SessionPool] Constructing fresh handle");
                factory().await?
            }
        };

        Ok(PooledSession {
            handle: Some(handle),
            inner: self.inner.clone(),
            epoch,
            _permit: permit,
        })
    }

    /// Disposes all idle handles. Handles currently held by requests are
    /// disposed when their guards drop, not returned.
    pub fn drain(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let drained = {
            let mut idle = self
                .inner
                .idle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *idle)
        };
        tracing::info!("[SessionPool] Drained {} idle handle(s)", drained.len());
    }

    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Exclusive ownership of one handle for the duration of one request.
pub struct PooledSession {
    handle: Option<SessionHandle>,
    inner: Arc<PoolInner>,
    epoch: u64,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    pub fn handle(&self) -> &SessionHandle {
        self.handle.as_ref().expect("handle taken before drop")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.inner.epoch.load(Ordering::Acquire) != self.epoch {
            tracing::debug!("[SessionPool] Disposing handle from drained epoch");
            return;
        }
        let mut idle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < self.inner.capacity {
            idle.push(handle);
        }
    }
}
