use std::collections::HashSet;
use std::sync::Mutex;

use crate::constants::DEFAULT_RATE_LIMIT_HOURS;
use crate::models::{Account, AccountState};

struct PoolState {
    accounts: Vec<Account>,
    /// Round-robin cursor so no usable account is starved.
    cursor: usize,
}

/// In-memory credential pool for the process lifetime. All acquire/mark
/// operations serialize behind one lock; rate-limit expiry is evaluated
/// lazily at each acquire, never by a background timer.
pub struct AccountPool {
    state: Mutex<PoolState>,
}

impl AccountPool {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                accounts,
                cursor: 0,
            }),
        }
    }

    pub fn acquire(&self) -> Option<Account> {
        self.acquire_excluding(&HashSet::new())
    }

    /// Round-robin selection skipping invalid accounts, accounts still inside
    /// a rate-limit window, and anything in `attempted` (so one request never
    /// re-selects an account that already failed it).
    pub fn acquire_excluding(&self, attempted: &HashSet<String>) -> Option<Account> {
        let now = chrono::Utc::now().timestamp();
        let mut state = self.lock();
        let len = state.accounts.len();
        if len == 0 {
            return None;
        }

        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            let account = &mut state.accounts[idx];

            // Lazy expiry: restore a lapsed rate-limit window on sight.
            if let AccountState::RateLimited { until } = account.state {
                if until <= now {
                    tracing::debug!("[AccountPool] Rate limit on {} expired", account.id);
                    account.state = AccountState::Available;
                }
            }

            if account.state != AccountState::Available || attempted.contains(&account.id) {
                continue;
            }

            let selected = account.clone();
            state.cursor = (idx + 1) % len;
            tracing::debug!("[AccountPool] Selected account {}", selected.id);
            return Some(selected);
        }

        None
    }

    pub fn mark_rate_limited(&self, id: &str, hours: Option<i64>) {
        let hours = hours.unwrap_or(DEFAULT_RATE_LIMIT_HOURS);
        let until = chrono::Utc::now().timestamp() + hours * 3600;
        let mut state = self.lock();
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
            account.state = AccountState::RateLimited { until };
            tracing::warn!("[AccountPool] Account {} rate-limited for {}h", id, hours);
        }
    }

    pub fn mark_invalid(&self, id: &str) {
        let mut state = self.lock();
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
            account.state = AccountState::Invalid;
            tracing::warn!("[AccountPool] Account {} marked invalid", id);
        }
    }

    /// Whether any account could be handed out right now, ignoring per-request
    /// attempted sets. False here means the process has nothing left to rotate
    /// to, which the orchestrator treats as fatal.
    pub fn has_usable(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.lock().accounts.iter().any(|a| a.is_usable(now))
    }

    /// Whether any account could ever be handed out again. A rate-limited
    /// account recovers when its window lapses; an invalid one never does.
    /// False here is the fatal condition.
    pub fn has_recoverable(&self) -> bool {
        self.lock()
            .accounts
            .iter()
            .any(|a| a.state != AccountState::Invalid)
    }

    pub fn len(&self) -> usize {
        self.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_of(&self, id: &str) -> Option<AccountState> {
        self.lock()
            .accounts
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.state.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
