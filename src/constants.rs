// Upstream wire-level constants: endpoint paths, error-body markers, and the
// in-page fetch script. Marker matching is substring-based and depends on
// upstream wording; keep every marker here so classifier tests pin them down.

/// Default rate-limit lockout when the upstream body omits a reset-hours value.
pub const DEFAULT_RATE_LIMIT_HOURS: i64 = 24;

/// Substrings that identify an interactive-verification challenge body.
pub const VERIFICATION_MARKERS: [&str; 3] = [
    "verification required",
    "captcha",
    "unusual activity",
];

/// Substrings that identify an expired or rejected authorization body.
pub const AUTH_EXPIRED_MARKERS: [&str; 3] = [
    "authorization expired",
    "token expired",
    "please log in again",
];

/// Substrings that identify a per-account rate-limit body.
pub const RATE_LIMIT_MARKERS: [&str; 3] = [
    "rate limit",
    "too many requests",
    "reached the daily limit",
];

/// Upstream status strings treated as task success.
pub const TASK_SUCCESS_STATUSES: [&str; 4] = ["success", "succeeded", "completed", "finished"];

/// Upstream status strings treated as task failure.
pub const TASK_FAILED_STATUSES: [&str; 4] = ["failed", "error", "canceled", "cancelled"];

/// Substrings in a status-query body that mean the task id is unknown upstream.
pub const TASK_NOT_FOUND_MARKERS: [&str; 2] = ["task not found", "invalid task"];

/// Frame line prefix of the streamed response shape.
pub const SSE_DATA_PREFIX: &str = "data:";

/// Stream sentinel some upstream builds emit instead of a finished frame.
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Script evaluated inside the authenticated context to perform one upstream
/// round trip. Receives `[url, token, body, stream]`; resolves to
/// `{status, ok, text}` where `text` is the raw body (SSE text when streaming).
pub const FETCH_SCRIPT: &str = r#"
async ([url, token, body, stream]) => {
    const resp = await fetch(url, {
        method: 'POST',
        headers: {
            'Content-Type': 'application/json',
            'Authorization': 'Bearer ' + token,
            'Accept': stream ? 'text/event-stream' : 'application/json',
        },
        body: JSON.stringify(body),
    });
    const text = await resp.text();
    return { status: resp.status, ok: resp.ok, text };
}
"#;

/// Script evaluated to query a task's status. Receives `[url, token]`;
/// resolves to the same `{status, ok, text}` shape as `FETCH_SCRIPT`.
pub const TASK_QUERY_SCRIPT: &str = r#"
async ([url, token]) => {
    const resp = await fetch(url, {
        method: 'GET',
        headers: { 'Authorization': 'Bearer ' + token },
    });
    const text = await resp.text();
    return { status: resp.status, ok: resp.ok, text };
}
"#;
