use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::models::{
    Account, AccountState, ErrorBody, GatewayConfig, GenerationReply, GenerationRequest,
    SyncResult, TaskCreatedBody, TaskResultBody,
};
use crate::session::{PooledSession, SessionFactory, SessionHandle, SessionPool};
use crate::token::{AccountPool, TokenCache};
use crate::upstream::{
    map_task_status, Executor, TaskPoller, TaskState, UpstreamFailure, UpstreamResponse,
};

/// Drives one interactive re-authentication pass. Invoked at most once per
/// verification challenge; never awaited on the request path.
#[async_trait]
pub trait Reauthenticator: Send + Sync {
    async fn reauthenticate(&self);
}

/// Called when zero accounts remain usable system-wide.
pub trait ShutdownHook: Send + Sync {
    fn fatal(&self, reason: &str);
}

/// Production hook: orderly log then process exit.
pub struct ProcessExit;

impl ShutdownHook for ProcessExit {
    fn fatal(&self, reason: &str) {
        tracing::error!("[Gateway] Fatal: {}", reason);
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct TaskContext {
    chat_id: String,
    parent_id: Option<String>,
}

enum AttemptOutcome {
    Reply(GenerationReply),
    /// Rotate to a fresh account and try again; carries the failure to
    /// surface if the retry budget runs out.
    Rotate(GatewayError),
}

/// Orchestrates the full request path: account selection, session checkout,
/// execution, task polling, and bounded retry with account rotation. Every
/// public method resolves to a `GenerationReply`, never a fault.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    accounts: AccountPool,
    sessions: SessionPool,
    token_cache: TokenCache,
    executor: Executor,
    poller: TaskPoller,
    tasks: DashMap<String, TaskContext>,
    known_models: Vec<String>,
    factory: Arc<dyn SessionFactory>,
    reauth: Arc<dyn Reauthenticator>,
    shutdown: Arc<dyn ShutdownHook>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        accounts: Vec<Account>,
        known_models: Vec<String>,
        factory: Arc<dyn SessionFactory>,
        reauth: Arc<dyn Reauthenticator>,
        shutdown: Arc<dyn ShutdownHook>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            executor: Executor::new(config.clone()),
            poller: TaskPoller::new(
                Duration::from_millis(config.poll_interval_ms),
                config.poll_max_attempts,
            ),
            sessions: SessionPool::new(config.session_pool_size),
            accounts: AccountPool::new(accounts),
            token_cache: TokenCache::new(),
            tasks: DashMap::new(),
            known_models,
            factory,
            reauth,
            shutdown,
            config,
        }
    }

    /// Full generation path with bounded account rotation: at most
    /// `max_retries + 1` attempts before a terminal error surfaces.
    pub async fn generate(&self, request: GenerationRequest) -> GenerationReply {
        if let Err(e) = request.validate(&self.known_models) {
            return ErrorBody::new(e).with_chat(request.chat_id.clone()).into();
        }

        let max_attempts = self.config.max_retries + 1;
        let mut attempted: HashSet<String> = HashSet::new();
        let mut last_error: Option<GatewayError> = None;

        for attempt in 0..max_attempts {
            let attempt_request = request.with_retry(request.retry_count + attempt);
            let (account_id, token) = match self.checkout_token(&attempted) {
                Ok(pair) => pair,
                Err(GatewayError::NoUsableAccounts) => {
                    return self.fatal_reply(request.chat_id.clone());
                }
                Err(e) => {
                    return ErrorBody::new(last_error.unwrap_or(e))
                        .with_chat(request.chat_id.clone())
                        .into();
                }
            };

            tracing::debug!(
                "[Gateway] Attempt {}/{} on account {}",
                attempt + 1,
                max_attempts,
                account_id
            );
            match self.attempt(&attempt_request, &account_id, &token).await {
                AttemptOutcome::Reply(reply) => return reply,
                AttemptOutcome::Rotate(error) => {
                    tracing::warn!(
                        "[Gateway] Rotating after failure on account {}: {}",
                        account_id,
                        error
                    );
                    attempted.insert(account_id);
                    last_error = Some(error);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| GatewayError::Auth("retry budget exhausted".to_string()));
        ErrorBody::new(error).with_chat(request.chat_id.clone()).into()
    }

    /// Operator-facing view of one account's bookkeeping state.
    pub fn account_state(&self, id: &str) -> Option<AccountState> {
        self.accounts.state_of(id)
    }

    /// One poller tick driven synchronously for an out-of-band status query.
    pub async fn task_status(&self, task_id: &str) -> GenerationReply {
        let context = self.tasks.get(task_id).map(|c| c.value().clone());

        let (_, token) = match self.checkout_token(&HashSet::new()) {
            Ok(pair) => pair,
            Err(GatewayError::NoUsableAccounts) => return self.fatal_reply(None),
            Err(e) => return ErrorBody::new(e).with_task(task_id.to_string()).into(),
        };
        let session = match self.checkout_session().await {
            Ok(s) => s,
            Err(e) => return ErrorBody::new(e).with_task(task_id.to_string()).into(),
        };

        let outcome = match self
            .executor
            .query_task(session.handle(), &token, task_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return ErrorBody::new(e).with_task(task_id.to_string()).into(),
        };
        match map_task_status(task_id, &outcome) {
            Ok(state) => self.task_state_reply(task_id.to_string(), state, context),
            Err(e) => ErrorBody::new(e).with_task(task_id.to_string()).into(),
        }
    }

    async fn attempt(
        &self,
        request: &GenerationRequest,
        account_id: &str,
        token: &str,
    ) -> AttemptOutcome {
        let session = match self.checkout_session().await {
            Ok(s) => s,
            Err(e) => {
                return AttemptOutcome::Reply(
                    ErrorBody::new(e).with_chat(request.chat_id.clone()).into(),
                );
            }
        };
        let handle = session.handle();

        let chat_id = match &request.chat_id {
            Some(id) => id.clone(),
            None => {
                match self
                    .executor
                    .create_chat(handle, token, &request.model, request.chat_type)
                    .await
                {
                    Ok(Ok(id)) => id,
                    Ok(Err(failure)) => return self.handle_failure(failure, account_id, None),
                    Err(e) => return AttemptOutcome::Reply(ErrorBody::new(e).into()),
                }
            }
        };

        let payload = request.build_payload(&chat_id);
        let response = match self
            .executor
            .execute(handle, token, &payload, request.chat_type)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return AttemptOutcome::Reply(
                    ErrorBody::new(e).with_chat(Some(chat_id)).into(),
                );
            }
        };

        match response {
            UpstreamResponse::Synchronous {
                content,
                usage,
                response_id,
            } => AttemptOutcome::Reply(GenerationReply::Sync(SyncResult {
                id: format!("gen-{}", Uuid::new_v4()),
                model: request.model.clone(),
                content,
                usage,
                response_id,
                chat_id,
                parent_id: request.parent_id.clone(),
            })),
            UpstreamResponse::TaskCreated { task_id } => {
                self.tasks.insert(
                    task_id.clone(),
                    TaskContext {
                        chat_id: chat_id.clone(),
                        parent_id: request.parent_id.clone(),
                    },
                );
                tracing::info!("[Gateway] Task {} created in chat {}", task_id, chat_id);
                if request.wait_for_completion {
                    self.await_task(handle, token, task_id).await
                } else {
                    AttemptOutcome::Reply(GenerationReply::TaskCreated(TaskCreatedBody {
                        task_id,
                        chat_id: Some(chat_id),
                        parent_id: request.parent_id.clone(),
                        status: "processing".to_string(),
                    }))
                }
            }
            UpstreamResponse::Failure(failure) => {
                self.handle_failure(failure, account_id, Some(chat_id))
            }
        }
    }

    /// Blocking-mode video: drive the created task to a terminal state on
    /// this request's own handle.
    async fn await_task(
        &self,
        handle: &SessionHandle,
        token: &str,
        task_id: String,
    ) -> AttemptOutcome {
        let context = self.tasks.get(&task_id).map(|c| c.value().clone());
        match self
            .poller
            .poll(&self.executor, handle, token, &task_id)
            .await
        {
            Ok(state) => AttemptOutcome::Reply(self.task_state_reply(task_id, state, context)),
            Err(e) => {
                AttemptOutcome::Reply(ErrorBody::new(e).with_task(task_id).into())
            }
        }
    }

    fn task_state_reply(
        &self,
        task_id: String,
        state: TaskState,
        context: Option<TaskContext>,
    ) -> GenerationReply {
        let (chat_id, parent_id) = context
            .map(|c| (Some(c.chat_id), c.parent_id))
            .unwrap_or((None, None));
        match state {
            TaskState::Completed { result_url, usage } => {
                self.tasks.remove(&task_id);
                GenerationReply::TaskCompleted(TaskResultBody {
                    task_id,
                    video_url: result_url,
                    usage,
                    chat_id,
                    parent_id,
                })
            }
            TaskState::Failed { reason } => {
                self.tasks.remove(&task_id);
                let mut body = ErrorBody::new(GatewayError::TaskFailed(reason))
                    .with_chat(chat_id)
                    .with_task(task_id);
                body.status = Some("failed".to_string());
                body.into()
            }
            TaskState::TimedOut => {
                // The id stays registered so polling can resume out-of-band.
                let mut body = ErrorBody::new(GatewayError::TaskTimeout {
                    task_id: task_id.clone(),
                })
                .with_chat(chat_id)
                .with_task(task_id);
                body.status = Some("timeout".to_string());
                body.into()
            }
            TaskState::Pending => GenerationReply::TaskCreated(TaskCreatedBody {
                task_id,
                chat_id,
                parent_id,
                status: "processing".to_string(),
            }),
        }
    }

    /// Decides what one classified upstream failure means for the request.
    fn handle_failure(
        &self,
        failure: UpstreamFailure,
        account_id: &str,
        chat_id: Option<String>,
    ) -> AttemptOutcome {
        match failure {
            UpstreamFailure::VerificationRequired => {
                tracing::warn!("[Gateway] Verification challenge, draining sessions");
                self.token_cache.invalidate();
                self.sessions.drain();
                let reauth = self.reauth.clone();
                tokio::spawn(async move { reauth.reauthenticate().await });
                AttemptOutcome::Reply(
                    ErrorBody::new(GatewayError::VerificationRequired)
                        .with_chat(chat_id)
                        .into(),
                )
            }
            UpstreamFailure::Unauthorized => {
                self.token_cache.invalidate();
                self.accounts.mark_invalid(account_id);
                if !self.accounts.has_recoverable() {
                    return AttemptOutcome::Reply(self.fatal_reply(chat_id));
                }
                AttemptOutcome::Rotate(GatewayError::Auth(format!(
                    "account {} unauthorized",
                    account_id
                )))
            }
            UpstreamFailure::RateLimited { hours } => {
                self.accounts.mark_rate_limited(account_id, Some(hours));
                self.token_cache.invalidate();
                AttemptOutcome::Rotate(GatewayError::RateLimited {
                    account_id: account_id.to_string(),
                    hours,
                })
            }
            UpstreamFailure::Generic { status, body } => AttemptOutcome::Reply(
                ErrorBody::new(GatewayError::Transport { status, body })
                    .with_chat(chat_id)
                    .into(),
            ),
        }
    }

    /// Zero usable accounts system-wide: release everything, fire the
    /// shutdown hook, and still hand the caller a structured error.
    fn fatal_reply(&self, chat_id: Option<String>) -> GenerationReply {
        self.token_cache.invalidate();
        self.sessions.drain();
        self.shutdown.fatal("no usable accounts remain");
        ErrorBody::new(GatewayError::NoUsableAccounts)
            .with_chat(chat_id)
            .into()
    }

    /// Current credential: the cached token when its account is still
    /// available, else a fresh acquisition. A path that still lacks a token
    /// after lookup fails the request rather than call upstream blind.
    fn checkout_token(&self, attempted: &HashSet<String>) -> GatewayResult<(String, String)> {
        if let Some(cached) = self.token_cache.get() {
            let still_available = matches!(
                self.accounts.state_of(&cached.account_id),
                Some(AccountState::Available)
            );
            if still_available && !attempted.contains(&cached.account_id) {
                return Ok((cached.account_id, cached.token));
            }
            self.token_cache.invalidate();
        }

        let Some(account) = self.accounts.acquire_excluding(attempted) else {
            if !self.accounts.has_recoverable() {
                return Err(GatewayError::NoUsableAccounts);
            }
            return Err(GatewayError::Auth("all accounts rate-limited".to_string()));
        };
        if account.token.trim().is_empty() {
            return Err(GatewayError::Auth(format!(
                "account {} has no token",
                account.id
            )));
        }
        self.token_cache.set(account.id.clone(), account.token.clone());
        Ok((account.id, account.token))
    }

    async fn checkout_session(&self) -> GatewayResult<PooledSession> {
        let entry_url = self.config.entry_url();
        let factory = self.factory.clone();
        self.sessions
            .acquire(move || async move {
                let backend = factory.create().await?;
                let handle = SessionHandle::new(backend);
                handle.bootstrap(&entry_url).await?;
                Ok(handle)
            })
            .await
    }
}
