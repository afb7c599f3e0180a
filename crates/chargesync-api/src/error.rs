use thiserror::Error;

use crate::ratelimit::RateLimitSnapshot;

/// Top-level error type for the `chargesync-api` crate.
///
/// Covers both API surfaces: the quota-limited cloud API and the
/// per-device local HTTP API. `chargesync-core` classifies these into
/// the coordinator's retry taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// API key rejected by the cloud (HTTP 401/403).
    #[error("Invalid API key")]
    InvalidApiKey,

    // ── Quota ───────────────────────────────────────────────────────
    /// Daily quota exceeded (HTTP 429). Carries the server's retry hint
    /// and the accounting headers of the rejecting response, if any.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        snapshot: Option<RateLimitSnapshot>,
    },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Cloud ───────────────────────────────────────────────────────
    /// Non-success status from the cloud API.
    #[error("Cloud API error (HTTP {status}): {message}")]
    Cloud { status: u16, message: String },

    // ── Local ───────────────────────────────────────────────────────
    /// Non-success status from a charger's local endpoint.
    #[error("Local API error (HTTP {status}): {message}")]
    Local { status: u16, message: String },

    /// The local endpoint answered with nothing usable.
    #[error("Empty response from local endpoint {endpoint}")]
    EmptyPayload { endpoint: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the credentials were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::InvalidApiKey)
    }

    /// Returns `true` if the quota was exceeded.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::EmptyPayload { .. } => true,
            Self::Cloud { status, .. } | Self::Local { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if this error carries one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = Error::Cloud {
            status: 503,
            message: "unavailable".into(),
        };
        let client = Error::Cloud {
            status: 400,
            message: "bad request".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn rate_limit_exposes_retry_hint() {
        let err = Error::RateLimited {
            retry_after_secs: 60,
            snapshot: None,
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after_secs(), Some(60));
        assert!(!Error::InvalidApiKey.is_transient());
    }
}
