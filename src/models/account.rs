use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountState {
    Available,
    RateLimited { until: i64 },
    Invalid,
}

impl Default for AccountState {
    fn default() -> Self {
        AccountState::Available
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub state: AccountState,
}

impl Account {
    pub fn new(id: String, token: String) -> Self {
        Self {
            id,
            token,
            state: AccountState::Available,
        }
    }

    /// Whether this account may be handed out right now. A rate-limited
    /// account whose window has passed counts as usable; the pool restores
    /// its state lazily on the next acquire.
    pub fn is_usable(&self, now: i64) -> bool {
        match self.state {
            AccountState::Available => true,
            AccountState::RateLimited { until } => until <= now,
            AccountState::Invalid => false,
        }
    }
}
