//! Shared configuration for the chargesync host.
//!
//! TOML profiles, API-key resolution (env + keyring + plaintext), and
//! translation to `chargesync_core::CoordinatorConfig`. Core never reads
//! files; everything on disk is handled here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chargesync_core::{CoordinatorConfig, DeviceId, Field, StaticDevice};

/// Keyring service name for stored API keys.
pub const KEYRING_SERVICE: &str = "chargesync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, falling back to the default profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::UnknownProfile { profile: name })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Cloud request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named cloud account plus polling policy.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// API key (plaintext; prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Cloud API base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Override the cloud timeout, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Static device list. Empty means discover from pairings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceEntry>,

    #[serde(default)]
    pub polling: Polling,
}

/// A statically configured charger.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// LAN address (host or host:port).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Polling and write tuning. Every key is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Polling {
    /// Cloud calls per day reserved for status polling.
    pub daily_budget: u32,
    pub min_interval_secs: u64,
    /// Baseline cloud interval; 0 disables it.
    pub policy_interval_secs: u64,
    pub local_interval_secs: u64,
    pub local_timeout_secs: u64,
    pub override_window_secs: u64,
    pub slow_confirm_fields: Vec<String>,
    pub slow_confirm_delay_secs: u64,
}

impl Default for Polling {
    fn default() -> Self {
        let core = CoordinatorConfig::default();
        Self {
            daily_budget: core.budget.daily_budget,
            min_interval_secs: core.budget.min_interval.as_secs(),
            policy_interval_secs: core.budget.policy_interval.map_or(0, |d| d.as_secs()),
            local_interval_secs: core.local.poll_interval.as_secs(),
            local_timeout_secs: core.local.timeout.as_secs(),
            override_window_secs: core.writes.override_window.as_secs(),
            slow_confirm_fields: core
                .writes
                .slow_confirm_fields
                .iter()
                .map(ToString::to_string)
                .collect(),
            slow_confirm_delay_secs: core.writes.slow_confirm_delay.as_secs(),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "chargesync", "chargesync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("chargesync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + `CHARGESYNC_` environment variables. Nested keys
/// use a double underscore (`CHARGESYNC_DEFAULTS__OUTPUT=json`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CHARGESYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the API key: profile env var, then keyring, then plaintext.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store an API key in the system keyring.
pub fn store_api_key(profile_name: &str, key: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
        .and_then(|entry| entry.set_password(key))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation to core config ──────────────────────────────────────

/// Build a `CoordinatorConfig` from a profile and an already-resolved key.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    defaults: &Defaults,
    api_key: SecretString,
) -> Result<CoordinatorConfig, ConfigError> {
    let mut config = CoordinatorConfig::new(api_key);

    if let Some(ref raw) = profile.base_url {
        let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {raw}"),
        })?;
        config.base_url = Some(url);
    }
    config.cloud_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    config.devices = profile
        .devices
        .iter()
        .map(|d| {
            if d.id.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: "devices.id".into(),
                    reason: "device id must not be empty".into(),
                });
            }
            Ok(StaticDevice {
                id: DeviceId::from(d.id.as_str()),
                label: d.label.clone(),
                address: d.address.clone().filter(|a| !a.trim().is_empty()),
            })
        })
        .collect::<Result<_, _>>()?;

    let polling = &profile.polling;
    if polling.daily_budget == 0 {
        return Err(ConfigError::Validation {
            field: "polling.daily_budget".into(),
            reason: "must be greater than zero".into(),
        });
    }
    config.budget.daily_budget = polling.daily_budget;
    config.budget.min_interval = Duration::from_secs(polling.min_interval_secs.max(1));
    config.budget.policy_interval =
        (polling.policy_interval_secs > 0).then(|| Duration::from_secs(polling.policy_interval_secs));
    config.local.poll_interval = Duration::from_secs(polling.local_interval_secs.max(1));
    config.local.timeout = Duration::from_secs(polling.local_timeout_secs.max(1));
    config.writes.override_window = Duration::from_secs(polling.override_window_secs.max(1));
    config.writes.slow_confirm_delay = Duration::from_secs(polling.slow_confirm_delay_secs);
    config.writes.slow_confirm_fields = polling
        .slow_confirm_fields
        .iter()
        .map(|name| {
            Field::parse(name).map_err(|_| ConfigError::Validation {
                field: "polling.slow_confirm_fields".into(),
                reason: format!("unknown field '{name}'"),
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(config)
}
