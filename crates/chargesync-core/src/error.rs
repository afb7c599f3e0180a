// ── Core error types ──
//
// Errors surfaced by the coordinator. Consumers never see raw HTTP
// status codes; the `From<chargesync_api::Error>` impl folds transport
// failures into the four retry classes the pollers act on.

use serde::Serialize;
use thiserror::Error;

use crate::model::DeviceId;

/// Retry classification shared by both pollers and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// Credentials rejected. Never retried.
    Auth,
    /// Cloud quota exceeded.
    RateLimit,
    /// Network, timeout or unexpected HTTP failure.
    Transport,
    /// The charger's LAN endpoint could not be reached.
    LocalUnavailable,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Classified transport failures ────────────────────────────────
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Cloud quota exceeded -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Cloud request failed: {message}")]
    Transport { message: String, timeout: bool },

    #[error("Local endpoint for {device} unavailable: {reason}")]
    LocalUnavailable { device: DeviceId, reason: String },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Device not found: {device}")]
    DeviceNotFound { device: DeviceId },

    #[error("Unknown field: {name}")]
    UnknownField { name: String },

    #[error("Field {field} is read-only")]
    ReadOnlyField { field: String },

    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Coordinator is not running")]
    CoordinatorStopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The retry class of this error, if it came from a transport.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Auth { .. } => Some(ErrorClass::Auth),
            Self::RateLimited { .. } => Some(ErrorClass::RateLimit),
            Self::Transport { .. } => Some(ErrorClass::Transport),
            Self::LocalUnavailable { .. } => Some(ErrorClass::LocalUnavailable),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after_secs } if *retry_after_secs > 0 => {
                Some(std::time::Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }

    /// Wrap any local-path failure for `device`.
    pub(crate) fn local(device: &DeviceId, err: impl std::fmt::Display) -> Self {
        Self::LocalUnavailable {
            device: device.clone(),
            reason: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<chargesync_api::Error> for CoreError {
    fn from(err: chargesync_api::Error) -> Self {
        use chargesync_api::Error as Api;

        match err {
            Api::InvalidApiKey => CoreError::Auth {
                message: "API key rejected by the cloud".into(),
            },
            Api::RateLimited {
                retry_after_secs, ..
            } => CoreError::RateLimited { retry_after_secs },
            Api::Timeout { timeout_secs } => CoreError::Transport {
                message: format!("request timed out after {timeout_secs}s"),
                timeout: true,
            },
            Api::Transport(ref e) => CoreError::Transport {
                message: e.to_string(),
                timeout: e.is_timeout(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Cloud { status, message } | Api::Local { status, message } => {
                CoreError::Transport {
                    message: format!("HTTP {status}: {message}"),
                    timeout: false,
                }
            }
            Api::EmptyPayload { endpoint } => CoreError::Transport {
                message: format!("empty response from {endpoint}"),
                timeout: false,
            },
            Api::Deserialization { message, .. } => CoreError::Transport {
                message: format!("unexpected response: {message}"),
                timeout: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_to_retry_classes() {
        let auth = CoreError::from(chargesync_api::Error::InvalidApiKey);
        assert_eq!(auth.class(), Some(ErrorClass::Auth));

        let limited = CoreError::from(chargesync_api::Error::RateLimited {
            retry_after_secs: 30,
            snapshot: None,
        });
        assert_eq!(limited.class(), Some(ErrorClass::RateLimit));
        assert_eq!(
            limited.retry_after(),
            Some(std::time::Duration::from_secs(30))
        );

        let timeout = CoreError::from(chargesync_api::Error::Timeout { timeout_secs: 10 });
        assert!(matches!(timeout, CoreError::Transport { timeout: true, .. }));
    }

    #[test]
    fn request_errors_are_unclassified() {
        let err = CoreError::UnknownField {
            name: "colour".into(),
        };
        assert_eq!(err.class(), None);
    }
}
