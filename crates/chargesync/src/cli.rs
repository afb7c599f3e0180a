//! Clap derive structures for the `chargesync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// chargesync -- keep wallbox chargers in sync over cloud and LAN
#[derive(Debug, Parser)]
#[command(
    name = "chargesync",
    version,
    about = "Read and control wallbox chargers through the cloud and LAN APIs",
    long_about = "Runs the charger coordinator for one account profile.\n\n\
        Reads merge the optimistic write cache, the charger's LAN endpoint\n\
        and the quota-limited cloud API. Writes go local when possible.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "CHARGESYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "CHARGESYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Cloud API key (overrides the profile)
    #[arg(long, env = "CHARGESYNC_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Cloud base URL (overrides the profile)
    #[arg(long, env = "CHARGESYNC_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CHARGESYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Cloud request timeout in seconds (overrides the profile)
    #[arg(long, env = "CHARGESYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List chargers known to the coordinator
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Read one field of a charger
    Get(GetArgs),

    /// Show every field of a charger with the source that supplied it
    #[command(alias = "st")]
    State(StateArgs),

    /// Write a field of a charger
    Set(SetArgs),

    /// Print state changes until interrupted
    Watch(WatchArgs),

    /// Show quota usage, poller health and per-device freshness
    #[command(alias = "diagnostics")]
    Diag,

    /// List the field table (no connection needed)
    Fields,

    /// Manage configuration profiles
    Config(ConfigArgs),
}

// ── Device Commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Also poll every charger's LAN endpoint once before listing
    #[arg(long)]
    pub local: bool,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Charger id
    pub device: String,

    /// Field name (see `chargesync fields`)
    pub field: String,

    /// Skip the LAN poll and answer from the cloud view only
    #[arg(long)]
    pub cloud_only: bool,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Charger id
    pub device: String,

    /// Skip the LAN poll and answer from the cloud view only
    #[arg(long)]
    pub cloud_only: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Charger id
    pub device: String,

    /// Field name (see `chargesync fields`)
    pub field: String,

    /// New value: a number, true/false, on/off, yes/no or 1/0
    pub value: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print changes for this charger
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Fields to print (defaults to all)
    #[arg(long, short = 'f', value_delimiter = ',')]
    pub fields: Vec<String>,
}

// ── Config Commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration with secrets masked
    Show,

    /// Create or update a profile
    Init(ConfigInitArgs),

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Profile name to create or update
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Read the API key from this environment variable at runtime
    #[arg(long, conflicts_with = "key")]
    pub api_key_env: Option<String>,

    /// API key to store
    #[arg(long)]
    pub key: Option<String>,

    /// Store the key in the OS keyring instead of the config file
    #[arg(long, requires = "key")]
    pub keyring: bool,

    /// Cloud base URL override
    #[arg(long)]
    pub url: Option<String>,

    /// Static charger as ID[=ADDRESS]; repeat for several. Disables discovery.
    #[arg(long = "device")]
    pub devices: Vec<String>,

    /// Make this the default profile
    #[arg(long)]
    pub set_default: bool,
}
