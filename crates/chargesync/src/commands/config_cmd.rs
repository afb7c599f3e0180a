//! Config subcommand handlers.

use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts, OutputFormat};
use crate::config::{self, Config, DeviceEntry};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => show(global),
        ConfigCommand::Init(init_args) => init(init_args, global),
        ConfigCommand::Path => {
            output::print_output(&config::effective_path(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}

// ── show ─────────────────────────────────────────────────────────────

/// Copy of `cfg` with plaintext keys masked.
fn redacted(cfg: &Config) -> Config {
    let mut out = cfg.clone();
    for profile in out.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(MASK.into());
        }
    }
    out
}

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = redacted(&config::load(global)?);
    let rendered = match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            let body = toml::to_string_pretty(&cfg).map_err(|e| CliError::Config {
                message: e.to_string(),
            })?;
            format!("# {}\n{body}", config::effective_path(global).display())
        }
        _ => output::render_single(&global.output, &cfg, |_| String::new(), |_| String::new()),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

// ── init ─────────────────────────────────────────────────────────────

/// Parse `ID[=ADDRESS]`.
fn parse_device(raw: &str) -> Result<DeviceEntry, CliError> {
    let (id, address) = match raw.split_once('=') {
        Some((id, addr)) => (id.trim(), Some(addr.trim().to_owned())),
        None => (raw.trim(), None),
    };
    if id.is_empty() {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: format!("expected ID[=ADDRESS], got '{raw}'"),
        });
    }
    Ok(DeviceEntry {
        id: id.to_owned(),
        label: None,
        address: address.filter(|a| !a.is_empty()),
    })
}

fn init(args: ConfigInitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::effective_path(global);
    let mut cfg = config::load(global)?;

    let devices = args
        .devices
        .iter()
        .map(|d| parse_device(d))
        .collect::<Result<Vec<_>, _>>()?;

    let profile = cfg.profiles.entry(args.name.clone()).or_default();
    if let Some(env) = args.api_key_env {
        profile.api_key_env = Some(env);
        profile.api_key = None;
    }
    if let Some(key) = args.key {
        if args.keyring {
            chargesync_config::store_api_key(&args.name, &key)?;
            profile.api_key = None;
        } else {
            profile.api_key = Some(key);
        }
    }
    if let Some(url) = args.url {
        profile.base_url = Some(url);
    }
    if !devices.is_empty() {
        profile.devices = devices;
    }

    // Validate the profile the same way a run would, minus the key.
    chargesync_config::profile_to_coordinator_config(
        profile,
        &cfg.defaults,
        SecretString::from("unused"),
    )?;

    let default_missing = cfg
        .default_profile
        .as_ref()
        .is_none_or(|d| !cfg.profiles.contains_key(d));
    if args.set_default || default_missing {
        cfg.default_profile = Some(args.name.clone());
    }
    config::save_config_to(&cfg, &path)?;

    tracing::info!(profile = %args.name, path = %path.display(), "profile saved");
    output::print_output(
        &format!("Profile '{}' saved to {}", args.name, path.display()),
        global.quiet,
    );
    Ok(())
}
