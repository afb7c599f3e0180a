//! Profile resolution with CLI flag overrides.
//!
//! Re-exports the shared config crate and layers `GlobalOpts` on top:
//! flags beat environment variables, which beat the profile.

use std::path::PathBuf;

use secrecy::SecretString;

pub use chargesync_config::{Config, DeviceEntry, Profile, config_path, save_config_to};
use chargesync_core::CoordinatorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` or the platform default.
pub fn effective_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(chargesync_config::load_config_from(&effective_path(global))?)
}

pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the coordinator config for the active profile.
///
/// With no matching profile, `--api-key` alone is enough to run with
/// default polling settings and pairing discovery.
pub fn resolve(global: &GlobalOpts) -> Result<(String, CoordinatorConfig), CliError> {
    let cfg = load(global)?;
    let name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&name) {
        Some(p) => p.clone(),
        None if global.api_key.is_some() => Profile::default(),
        None if cfg.profiles.is_empty() => {
            return Err(CliError::NoCredentials { profile: name });
        }
        None => {
            let available = cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
            return Err(CliError::ProfileNotFound { name, available });
        }
    };

    if let Some(ref url) = global.base_url {
        profile.base_url = Some(url.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let api_key = resolve_api_key_with_flag(&profile, &name, global)?;
    let config = chargesync_config::profile_to_coordinator_config(&profile, &cfg.defaults, api_key)?;
    Ok((name, config))
}

/// Resolve the API key with the CLI flag first, then the shared chain.
fn resolve_api_key_with_flag(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<SecretString, CliError> {
    if let Some(ref key) = global.api_key {
        return Ok(SecretString::from(key.clone()));
    }
    Ok(chargesync_config::resolve_api_key(profile, profile_name)?)
}
