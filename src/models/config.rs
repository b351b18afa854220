use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{GatewayError, GatewayResult};
use crate::models::Account;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upstream origin, e.g. `https://chat.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path navigated once per fresh session handle before first use.
    #[serde(default = "default_entry_path")]
    pub entry_path: String,
    #[serde(default = "default_completions_path")]
    pub completions_path: String,
    #[serde(default = "default_new_chat_path")]
    pub new_chat_path: String,
    /// `{task_id}` is substituted with the task id.
    #[serde(default = "default_task_status_path")]
    pub task_status_path: String,
    #[serde(default = "default_session_pool_size")]
    pub session_pool_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://chat.example.com".to_string()
}
fn default_entry_path() -> String {
    "/".to_string()
}
fn default_completions_path() -> String {
    "/api/chat/completions".to_string()
}
fn default_new_chat_path() -> String {
    "/api/v2/chats/new".to_string()
}
fn default_task_status_path() -> String {
    "/api/v1/tasks/status/{task_id}".to_string()
}
fn default_session_pool_size() -> usize {
    4
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_poll_max_attempts() -> u32 {
    90
}
fn default_request_timeout_secs() -> u64 {
    300
}
fn default_model() -> String {
    "standard".to_string()
}
fn default_max_retries() -> u32 {
    3
}

impl Default for GatewayConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("defaults must deserialize")
    }
}

impl GatewayConfig {
    pub fn completions_url(&self) -> String {
        format!("{}{}", self.base_url, self.completions_path)
    }

    pub fn new_chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.new_chat_path)
    }

    pub fn entry_url(&self) -> String {
        format!("{}{}", self.base_url, self.entry_path)
    }

    pub fn task_status_url(&self, task_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.task_status_path.replace("{task_id}", task_id)
        )
    }

    /// Collects every problem at once instead of stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.base_url.is_empty() || !self.base_url.starts_with("http") {
            errors.push(format!("base_url is not a valid origin: {}", self.base_url));
        }
        if self.session_pool_size == 0 {
            errors.push("session_pool_size must be at least 1".to_string());
        }
        if self.poll_max_attempts == 0 {
            errors.push("poll_max_attempts must be at least 1".to_string());
        }
        if !self.task_status_path.contains("{task_id}") {
            errors.push("task_status_path must contain a {task_id} placeholder".to_string());
        }
        if self.default_model.trim().is_empty() {
            errors.push("default_model must not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub fn load_config(path: &Path) -> GatewayResult<GatewayConfig> {
    if !path.exists() {
        tracing::info!("[Config] {} missing, using defaults", path.display());
        return Ok(GatewayConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| GatewayError::Validation(format!("failed to read config file: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| GatewayError::Validation(format!("failed to parse config file: {}", e)))
}

/// Credential list: a JSON array of `{id, token}` objects, read once at startup.
pub fn load_accounts(path: &Path) -> GatewayResult<Vec<Account>> {
    let content = fs::read_to_string(path)
        .map_err(|e| GatewayError::Auth(format!("failed to read credential file: {}", e)))?;
    let accounts: Vec<Account> = serde_json::from_str(&content)
        .map_err(|e| GatewayError::Auth(format!("failed to parse credential file: {}", e)))?;
    tracing::info!("[Config] Loaded {} account(s)", accounts.len());
    Ok(accounts)
}

/// Valid model names, one JSON array of strings. A missing file yields just the
/// configured default model so requests are not rejected outright.
pub fn load_model_registry(path: &Path, default_model: &str) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
            Ok(models) if !models.is_empty() => models,
            Ok(_) | Err(_) => {
                tracing::warn!(
                    "[Config] Model registry {} empty or malformed, using default only",
                    path.display()
                );
                vec![default_model.to_string()]
            }
        },
        Err(_) => vec![default_model.to_string()],
    }
}
