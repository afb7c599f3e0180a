// ── Rate-limit accounting headers ──
//
// The cloud gateway reports quota usage on every response. We record
// what it says and leave interpretation to the caller; nothing here
// throttles requests.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;

const LIMIT_HEADERS: &[&str] = &["x-ratelimit-limit", "ratelimit-limit"];
const REMAINING_HEADERS: &[&str] = &["x-ratelimit-remaining", "ratelimit-remaining"];
const RESET_HEADERS: &[&str] = &["x-ratelimit-reset", "ratelimit-reset"];

/// Quota accounting fields observed on a cloud response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Seconds until the quota window resets, as reported by the gateway.
    pub reset_secs: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// Extract the accounting headers. Returns `None` when the response
    /// carries none of them.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = first_numeric(headers, LIMIT_HEADERS);
        let remaining = first_numeric(headers, REMAINING_HEADERS);
        let reset_secs = first_numeric(headers, RESET_HEADERS);

        if limit.is_none() && remaining.is_none() && reset_secs.is_none() {
            return None;
        }

        Some(Self {
            limit,
            remaining,
            reset_secs,
            observed_at: Utc::now(),
        })
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
pub(crate) fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    first_numeric(headers, &["retry-after"])
}

fn first_numeric(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            // Some gateways send a comma-separated list per window.
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<u64>().ok())
    })
}
