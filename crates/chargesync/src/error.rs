//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use chargesync_config::ConfigError;
use chargesync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {target}")]
    #[diagnostic(
        code(chargesync::connection_failed),
        help(
            "{reason}\n\
             Check network access, or the charger's LAN address in your profile."
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Cloud quota exhausted")]
    #[diagnostic(
        code(chargesync::rate_limited),
        help(
            "The cloud asked to wait {retry_after_secs}s before the next call.\n\
             Lower polling.daily_budget if this happens regularly."
        )
    )]
    RateLimited { retry_after_secs: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(chargesync::auth_failed),
        help(
            "Verify the API key of this profile.\n\
             Run: chargesync config init --key <KEY>"
        )
    )]
    AuthFailed { message: String },

    #[error("No API key configured for profile '{profile}'")]
    #[diagnostic(
        code(chargesync::no_credentials),
        help(
            "Configure one with: chargesync config init --key <KEY>\n\
             Or set the CHARGESYNC_API_KEY environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(chargesync::not_found),
        help("Run: chargesync {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Unknown field '{name}'")]
    #[diagnostic(
        code(chargesync::unknown_field),
        help("Run: chargesync fields to list every field and whether it is writable")
    )]
    UnknownField { name: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(chargesync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(chargesync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: chargesync config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration could not be loaded")]
    #[diagnostic(code(chargesync::config), help("{message}"))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out")]
    #[diagnostic(
        code(chargesync::timeout),
        help("{message}\nIncrease the timeout with --timeout.")
    )]
    Timeout { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Coordinator stopped before the request completed")]
    #[diagnostic(code(chargesync::stopped))]
    Stopped,

    #[error("Internal error: {0}")]
    #[diagnostic(code(chargesync::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::UnknownField { .. } => exit_code::USAGE,
            Self::RateLimited { .. }
            | Self::Config { .. }
            | Self::Stopped
            | Self::Internal(_)
            | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth { message } => Self::AuthFailed { message },
            CoreError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            CoreError::Transport {
                message,
                timeout: true,
            } => Self::Timeout { message },
            CoreError::Transport { message, .. } => Self::ConnectionFailed {
                target: "the cloud API".into(),
                reason: message,
            },
            CoreError::LocalUnavailable { device, reason } => Self::ConnectionFailed {
                target: format!("charger {device} on the LAN"),
                reason,
            },
            CoreError::DeviceNotFound { device } => Self::NotFound {
                resource_type: "charger".into(),
                identifier: device.to_string(),
                list_command: "devices".into(),
            },
            CoreError::UnknownField { name } => Self::UnknownField { name },
            CoreError::ReadOnlyField { field } => Self::Validation {
                field,
                reason: "field is read-only".into(),
            },
            CoreError::Validation { field, message } => Self::Validation {
                field,
                reason: message,
            },
            CoreError::CoordinatorStopped => Self::Stopped,
            CoreError::Config { message } => Self::Config { message },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargesync_core::DeviceId;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::Auth {
                    message: "bad key".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::DeviceNotFound {
                    device: DeviceId::from("X1"),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::Transport {
                    message: "timed out".into(),
                    timeout: true,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::LocalUnavailable {
                    device: DeviceId::from("X1"),
                    reason: "no address".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::UnknownField {
                    name: "colour".into(),
                },
                exit_code::USAGE,
            ),
            (CoreError::CoordinatorStopped, exit_code::GENERAL),
        ];
        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn missing_credentials_is_an_auth_failure() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "home".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
