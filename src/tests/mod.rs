//! End-to-end scenarios driving the gateway against scripted sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::gateway::{Gateway, Reauthenticator, ShutdownHook};
use crate::models::{
    Account, AccountState, ChatType, GatewayConfig, GenerationReply, GenerationRequest,
    RequestContent,
};
use crate::test_utils::{ScriptQueue, ScriptedCall, ScriptedFactory};

struct RecordingReauth {
    invocations: AtomicUsize,
}

#[async_trait]
impl Reauthenticator for RecordingReauth {
    async fn reauthenticate(&self) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
    }
}

struct RecordingShutdown {
    invocations: AtomicUsize,
    reason: Mutex<Option<String>>,
}

impl ShutdownHook for RecordingShutdown {
    fn fatal(&self, reason: &str) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        *self.reason.lock().unwrap() = Some(reason.to_string());
    }
}

struct Harness {
    gateway: Gateway,
    queue: Arc<ScriptQueue>,
    reauth: Arc<RecordingReauth>,
    shutdown: Arc<RecordingShutdown>,
}

fn harness(accounts: Vec<Account>, calls: Vec<ScriptedCall>) -> Harness {
    harness_with(accounts, calls, |_| {})
}

fn harness_with(
    accounts: Vec<Account>,
    calls: Vec<ScriptedCall>,
    tune: impl FnOnce(&mut GatewayConfig),
) -> Harness {
    let mut config = GatewayConfig::default();
    config.poll_interval_ms = 5;
    config.poll_max_attempts = 5;
    tune(&mut config);

    let queue = ScriptQueue::new(calls);
    let reauth = Arc::new(RecordingReauth {
        invocations: AtomicUsize::new(0),
    });
    let shutdown = Arc::new(RecordingShutdown {
        invocations: AtomicUsize::new(0),
        reason: Mutex::new(None),
    });
    let gateway = Gateway::new(
        config,
        accounts,
        vec!["standard".to_string()],
        Arc::new(ScriptedFactory {
            queue: queue.clone(),
        }),
        reauth.clone(),
        shutdown.clone(),
    );
    Harness {
        gateway,
        queue,
        reauth,
        shutdown,
    }
}

fn accounts(ids: &[&str]) -> Vec<Account> {
    ids.iter()
        .map(|id| Account::new(id.to_string(), format!("tok-{}", id)))
        .collect()
}

fn text_request(chat_id: Option<&str>) -> GenerationRequest {
    GenerationRequest {
        content: RequestContent::Text("What is the capital of France?".to_string()),
        model: "standard".to_string(),
        chat_id: chat_id.map(str::to_string),
        parent_id: None,
        chat_type: ChatType::Text,
        size: None,
        wait_for_completion: false,
        retry_count: 0,
    }
}

fn video_request(chat_id: Option<&str>, wait_for_completion: bool) -> GenerationRequest {
    GenerationRequest {
        content: RequestContent::Text("a harbor at dawn, slow pan".to_string()),
        model: "standard".to_string(),
        chat_id: chat_id.map(str::to_string),
        parent_id: None,
        chat_type: ChatType::Video,
        size: Some("16:9".to_string()),
        wait_for_completion,
        retry_count: 0,
    }
}

fn paris_stream() -> ScriptedCall {
    ScriptedCall::ok_text(concat!(
        "data: {\"id\":\"r-1\",\"choices\":[{\"delta\":{\"content\":\"Pa\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ris\"}}]}\n",
        "data: [DONE]\n",
    ))
}

#[tokio::test]
async fn rotates_to_third_account_after_auth_failures() {
    let h = harness(
        accounts(&["a", "b", "c"]),
        vec![
            ScriptedCall::error(401, "Unauthorized"),
            ScriptedCall::error(401, "Unauthorized"),
            paris_stream(),
        ],
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    match reply {
        GenerationReply::Sync(body) => {
            assert_eq!(body.content, "Paris");
            assert_eq!(body.chat_id, "c-1");
        }
        other => panic!("expected sync reply, got {:?}", other),
    }

    assert_eq!(h.gateway.account_state("a"), Some(AccountState::Invalid));
    assert_eq!(h.gateway.account_state("b"), Some(AccountState::Invalid));
    assert_eq!(h.gateway.account_state("c"), Some(AccountState::Available));
    assert_eq!(h.queue.evaluations(), 3);
    // All three attempts rode the same pooled session.
    assert_eq!(h.queue.navigations(), 1);
    assert_eq!(h.shutdown.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_behind_ok_status_still_rotates() {
    let h = harness(
        accounts(&["a", "b"]),
        vec![
            ScriptedCall::ok_text(r#"{"message":"Token expired, please log in again"}"#),
            paris_stream(),
        ],
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    match reply {
        GenerationReply::Sync(body) => assert_eq!(body.content, "Paris"),
        other => panic!("expected sync reply, got {:?}", other),
    }
    assert_eq!(h.gateway.account_state("a"), Some(AccountState::Invalid));
    assert_eq!(h.queue.evaluations(), 2);
}

#[tokio::test]
async fn attempts_are_bounded_by_retry_budget() {
    let h = harness_with(
        accounts(&["a", "b", "c"]),
        vec![
            ScriptedCall::error(429, "Rate limit exceeded"),
            ScriptedCall::error(429, "Rate limit exceeded"),
        ],
        |config| config.max_retries = 1,
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    assert!(matches!(
        reply.error(),
        Some(GatewayError::RateLimited { .. })
    ));
    // max_retries + 1 attempts, then the last failure surfaces.
    assert_eq!(h.queue.evaluations(), 2);
}

#[tokio::test]
async fn rate_limit_window_honors_reset_hint() {
    let h = harness(
        accounts(&["a", "b"]),
        vec![
            ScriptedCall::error(429, r#"{"error":{"message":"Rate limit reached","num":2}}"#),
            paris_stream(),
        ],
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    assert!(matches!(reply, GenerationReply::Sync(_)));

    let now = chrono::Utc::now().timestamp();
    match h.gateway.account_state("a").unwrap() {
        AccountState::RateLimited { until } => {
            assert!(until > now + 3600 && until <= now + 2 * 3600);
        }
        other => panic!("expected rate-limited state, got {:?}", other),
    }
}

#[tokio::test]
async fn all_accounts_rate_limited_is_a_recoverable_error() {
    let h = harness(
        accounts(&["a", "b"]),
        vec![
            ScriptedCall::error(429, "Rate limit exceeded"),
            ScriptedCall::error(429, "Rate limit exceeded"),
        ],
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    assert!(matches!(
        reply.error(),
        Some(GatewayError::RateLimited { .. })
    ));
    assert_eq!(h.queue.evaluations(), 2);
    // Both accounts recover when their windows lapse; nothing fatal happened.
    assert_eq!(h.shutdown.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verification_challenge_drains_sessions_and_reauthenticates_once() {
    let h = harness(
        accounts(&["a"]),
        vec![
            ScriptedCall::error(403, "Verification required: unusual activity detected"),
            paris_stream(),
        ],
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    assert!(matches!(
        reply.error(),
        Some(GatewayError::VerificationRequired)
    ));
    // Non-retryable: exactly one upstream call.
    assert_eq!(h.queue.evaluations(), 1);
    // The account itself is untouched; only sessions and the token went.
    assert_eq!(h.gateway.account_state("a"), Some(AccountState::Available));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.reauth.invocations.load(Ordering::SeqCst), 1);

    // The drained pool rebuilds a fresh handle for the next request.
    let reply = h.gateway.generate(text_request(Some("c-2"))).await;
    assert!(matches!(reply, GenerationReply::Sync(_)));
    assert_eq!(h.queue.navigations(), 2);
}

#[tokio::test]
async fn last_account_invalidated_is_fatal() {
    let h = harness(
        accounts(&["a"]),
        vec![ScriptedCall::error(401, "Unauthorized")],
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    assert!(matches!(reply.error(), Some(GatewayError::NoUsableAccounts)));
    assert_eq!(h.shutdown.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.shutdown.reason.lock().unwrap().as_deref(),
        Some("no usable accounts remain")
    );
}

#[tokio::test]
async fn no_upstream_call_when_every_account_is_excluded() {
    let excluded = ["a", "b"]
        .iter()
        .map(|id| Account {
            id: id.to_string(),
            token: format!("tok-{}", id),
            state: AccountState::Invalid,
        })
        .collect();
    let h = harness(excluded, Vec::new());

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    assert!(matches!(reply.error(), Some(GatewayError::NoUsableAccounts)));
    assert_eq!(h.shutdown.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(h.queue.evaluations(), 0);
    assert_eq!(h.queue.navigations(), 0);
}

#[tokio::test]
async fn account_without_token_fails_before_any_upstream_call() {
    let h = harness(
        vec![Account::new("a".to_string(), String::new())],
        Vec::new(),
    );

    let reply = h.gateway.generate(text_request(Some("c-1"))).await;
    match reply.error() {
        Some(GatewayError::Auth(message)) => assert!(message.contains("has no token")),
        other => panic!("expected auth error, got {:?}", other),
    }
    assert_eq!(h.queue.evaluations(), 0);
    assert_eq!(h.queue.navigations(), 0);
}

#[tokio::test]
async fn invalid_request_is_rejected_without_network() {
    let h = harness(accounts(&["a"]), Vec::new());

    let mut request = text_request(Some("c-1"));
    request.model = "imaginary".to_string();
    let reply = h.gateway.generate(request).await;
    assert!(matches!(reply.error(), Some(GatewayError::Validation(_))));
    assert_eq!(h.queue.evaluations(), 0);
}

#[tokio::test]
async fn missing_chat_id_creates_a_chat_first() {
    let h = harness(
        accounts(&["a"]),
        vec![
            ScriptedCall::ok_text(r#"{"data":{"id":"c-99"}}"#),
            paris_stream(),
        ],
    );

    let reply = h.gateway.generate(text_request(None)).await;
    match reply {
        GenerationReply::Sync(body) => assert_eq!(body.chat_id, "c-99"),
        other => panic!("expected sync reply, got {:?}", other),
    }
    assert_eq!(h.queue.evaluations(), 2);
}

#[tokio::test]
async fn blocking_video_polls_task_to_completion() {
    let h = harness(
        accounts(&["a"]),
        vec![
            ScriptedCall::ok_text(r#"{"data":{"task_id":"t-1"}}"#),
            ScriptedCall::ok_text(r#"{"data":{"status":"running"}}"#),
            ScriptedCall::ok_text(
                r#"{"data":{"status":"succeeded","video_url":"https://cdn.example/v.mp4"}}"#,
            ),
        ],
    );

    let reply = h.gateway.generate(video_request(Some("c-7"), true)).await;
    match reply {
        GenerationReply::TaskCompleted(body) => {
            assert_eq!(body.task_id, "t-1");
            assert_eq!(body.video_url, "https://cdn.example/v.mp4");
            assert_eq!(body.chat_id.as_deref(), Some("c-7"));
        }
        other => panic!("expected completed task, got {:?}", other),
    }
    assert_eq!(h.queue.evaluations(), 3);
}

#[tokio::test]
async fn nonblocking_video_returns_handle_then_status_resolves_it() {
    let h = harness(
        accounts(&["a"]),
        vec![
            ScriptedCall::ok_text(r#"{"data":{"task_id":"t-2"}}"#),
            ScriptedCall::ok_text(
                r#"{"data":{"status":"completed","video_url":"https://cdn.example/v2.mp4"}}"#,
            ),
            ScriptedCall::ok_text(r#"{"detail":"Task not found"}"#),
        ],
    );

    let reply = h.gateway.generate(video_request(Some("c-7"), false)).await;
    match reply {
        GenerationReply::TaskCreated(body) => {
            assert_eq!(body.task_id, "t-2");
            assert_eq!(body.status, "processing");
            assert_eq!(body.chat_id.as_deref(), Some("c-7"));
        }
        other => panic!("expected task handle, got {:?}", other),
    }

    // Out-of-band query resolves it with the registered chat context.
    let reply = h.gateway.task_status("t-2").await;
    match reply {
        GenerationReply::TaskCompleted(body) => {
            assert_eq!(body.chat_id.as_deref(), Some("c-7"));
        }
        other => panic!("expected completed task, got {:?}", other),
    }

    // Completion dropped the registration; upstream now reports it gone.
    let reply = h.gateway.task_status("t-2").await;
    assert!(matches!(reply.error(), Some(GatewayError::TaskNotFound(_))));
}

#[tokio::test]
async fn task_timeout_keeps_the_task_queryable() {
    let h = harness_with(
        accounts(&["a"]),
        vec![
            ScriptedCall::ok_text(r#"{"data":{"task_id":"t-3"}}"#),
            ScriptedCall::ok_text(r#"{"data":{"status":"running"}}"#),
            ScriptedCall::ok_text(r#"{"data":{"status":"running"}}"#),
            ScriptedCall::ok_text(
                r#"{"data":{"status":"succeeded","video_url":"https://cdn.example/v3.mp4"}}"#,
            ),
        ],
        |config| config.poll_max_attempts = 2,
    );

    let reply = h.gateway.generate(video_request(Some("c-7"), true)).await;
    match reply {
        GenerationReply::Error(body) => {
            assert!(matches!(body.error, GatewayError::TaskTimeout { .. }));
            assert_eq!(body.status.as_deref(), Some("timeout"));
        }
        other => panic!("expected timeout error, got {:?}", other),
    }

    // Registration survived, so a later query still carries chat context.
    let reply = h.gateway.task_status("t-3").await;
    match reply {
        GenerationReply::TaskCompleted(body) => {
            assert_eq!(body.chat_id.as_deref(), Some("c-7"));
        }
        other => panic!("expected completed task, got {:?}", other),
    }
    assert_eq!(h.queue.evaluations(), 4);
}

#[tokio::test]
async fn sequential_requests_reuse_one_session() {
    let h = harness(
        accounts(&["a"]),
        vec![paris_stream(), paris_stream()],
    );

    for chat in ["c-1", "c-2"] {
        let reply = h.gateway.generate(text_request(Some(chat))).await;
        assert!(matches!(reply, GenerationReply::Sync(_)));
    }
    assert_eq!(h.queue.navigations(), 1);
    assert_eq!(h.queue.evaluations(), 2);
}
