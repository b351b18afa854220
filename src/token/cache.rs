use std::sync::Mutex;

/// Last known good credential, shared process-wide. A lookup convenience, not
/// a lock: when unset, the request path must fetch a fresh account before
/// proceeding. `invalidate` is the only way the value goes away, which keeps
/// cache invalidation explicit and test isolation cheap.
#[derive(Default)]
pub struct TokenCache {
    current: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub account_id: String,
    pub token: String,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<CachedToken> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// At most one cached token is active at a time; setting replaces any
    /// previous value.
    pub fn set(&self, account_id: String, token: String) {
        let mut guard = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(CachedToken { account_id, token });
    }

    pub fn invalidate(&self) {
        let mut guard = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.take().is_some() {
            tracing::debug!("[TokenCache] Cached token invalidated");
        }
    }
}
