use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{
    AUTH_EXPIRED_MARKERS, DEFAULT_RATE_LIMIT_HOURS, RATE_LIMIT_MARKERS, VERIFICATION_MARKERS,
};

/// Typed outcome of one failed upstream round trip. Ordering of the variants
/// mirrors classification precedence.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFailure {
    VerificationRequired,
    Unauthorized,
    RateLimited { hours: i64 },
    Generic { status: Option<u16>, body: String },
}

static RESET_HOURS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""num"\s*:\s*(\d+)"#).expect("invalid reset-hours regex"));

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

/// Embedded reset-hours value, either a structured `num` field or the same
/// key appearing in loose body text.
fn parse_reset_hours(body: &str) -> Option<i64> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body.trim()) {
        if let Some(num) = json.get("num").and_then(|v| v.as_i64()) {
            return Some(num);
        }
        if let Some(num) = json
            .get("error")
            .and_then(|e| e.get("num"))
            .and_then(|v| v.as_i64())
        {
            return Some(num);
        }
    }
    RESET_HOURS_REGEX
        .captures(body)
        .and_then(|caps| caps[1].parse().ok())
}

/// Single ordered classifier for semi-structured error bodies. Substring
/// matching is brittle by nature; the markers live in `constants` and are
/// pinned by the tests below rather than by the live service.
///
/// Precedence, first match wins: verification marker, then 401 or an
/// authorization-expired marker, then a rate-limit marker (with embedded
/// reset-hours when present), then generic.
pub fn classify_failure(status: Option<u16>, body: &str) -> UpstreamFailure {
    let lowered = body.to_lowercase();

    if contains_any(&lowered, &VERIFICATION_MARKERS) {
        return UpstreamFailure::VerificationRequired;
    }
    if status == Some(401) || contains_any(&lowered, &AUTH_EXPIRED_MARKERS) {
        return UpstreamFailure::Unauthorized;
    }
    if contains_any(&lowered, &RATE_LIMIT_MARKERS) {
        let hours = parse_reset_hours(body).unwrap_or(DEFAULT_RATE_LIMIT_HOURS);
        return UpstreamFailure::RateLimited { hours };
    }
    UpstreamFailure::Generic {
        status,
        body: body.to_string(),
    }
}
