//! Clap derive structures for the `landroid` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use landroid_core::Cloud;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// landroid -- talk to your robotic mower through the vendor cloud
#[derive(Debug, Parser)]
#[command(
    name = "landroid",
    version,
    about = "Control Worx, Kress, LandXcape and Ferrex robotic mowers from the command line",
    long_about = "Logs in to the mower vendor cloud, lists the account's devices, streams\n\
        live telemetry over MQTT and sends commands.",
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
    #[arg(long, short = 'p', env = "LANDROID_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Vendor cloud (overrides profile)
    #[arg(long, env = "LANDROID_CLOUD", global = true)]
    pub cloud: Option<Cloud>,

    /// Account e-mail (overrides profile)
    #[arg(long, short = 'e', env = "LANDROID_EMAIL", global = true)]
    pub email: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LANDROID_OUTPUT",
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

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// HTTP request timeout in seconds (overrides profile)
    #[arg(long, env = "LANDROID_TIMEOUT", global = true)]
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
    /// List the mowers registered on the account
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// Stream live telemetry; control lines are read from stdin
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send one command and wait for the device to answer
    Send(SendArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show telemetry from this serial number
    #[arg(long, short = 's')]
    pub serial: Option<String>,

    /// Do not read control lines from stdin
    #[arg(long)]
    pub no_input: bool,
}

// ── Send ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Device serial number, or `*` for every device
    pub target: String,

    /// `start`, `stop`, `pause`, `status`, or a JSON payload
    pub command: String,

    /// Seconds to wait for the acknowledgement (0 = don't wait)
    #[arg(long, short = 'w', default_value = "15")]
    pub wait: u64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// Set a value on the active profile
    Set {
        /// Profile key: cloud, email, password_env, app_name, timeout, language
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the account password in the system keyring
    SetPassword {
        /// Profile whose password to store (defaults to the active one)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
