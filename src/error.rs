use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Verification required, interactive re-authentication triggered")]
    VerificationRequired,

    #[error("Account {account_id} rate-limited for {hours}h")]
    RateLimited { account_id: String, hours: i64 },

    #[error("Task {0} not found")]
    TaskNotFound(String),

    #[error("Task {task_id} polling timed out")]
    TaskTimeout { task_id: String },

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Upstream error{}: {body}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transport { status: Option<u16>, body: String },

    #[error("No usable accounts remain")]
    NoUsableAccounts,
}

impl Serialize for GatewayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
