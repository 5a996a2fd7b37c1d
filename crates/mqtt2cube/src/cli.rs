//! Clap derive structures for the `mqtt2cube` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// mqtt2cube -- bridge Tasmota MQTT devices into an eWeLink CUBE hub
#[derive(Debug, Parser)]
#[command(
    name = "mqtt2cube",
    version,
    about = "Bridge Tasmota MQTT devices into an eWeLink CUBE hub",
    long_about = "Discovers Tasmota switches over MQTT, mirrors them into the hub's\n\
        device directory and keeps power and availability in sync both ways.",
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
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "MQTT2CUBE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MQTT2CUBE_OUTPUT",
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

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
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

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    Run(RunArgs),

    /// List discovered devices and their hub sync state
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Create discovered devices in the hub
    Sync(SyncArgs),

    /// Remove a device from the hub
    Unsync(UnsyncArgs),

    /// Acquire a hub access token
    Token(TokenArgs),

    /// Show or change automatic syncing of new devices
    AutoSync(AutoSyncArgs),

    /// Show or change the MQTT broker
    Mqtt(MqttArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Bridge commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Development mode: short MQTT keepalive
    #[arg(long)]
    pub dev: bool,
}

/// How long one-shot commands listen for discovery before acting.
#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Seconds to collect discovery messages
    #[arg(long, default_value = "5")]
    pub discover_secs: u64,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(flatten)]
    pub discover: DiscoverArgs,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Device MAC (any common notation)
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub mac: Option<String>,

    /// Sync every supported device not yet in the hub
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub discover: DiscoverArgs,
}

#[derive(Debug, Args)]
pub struct UnsyncArgs {
    /// Device MAC (any common notation)
    pub mac: String,

    #[command(flatten)]
    pub discover: DiscoverArgs,
}

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Keep asking until the hub issues a token or `hub.token_wait_secs` elapses
    #[arg(long)]
    pub wait: bool,
}

// ── Settings commands ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AutoSyncArgs {
    /// New state; omit to show the current one
    pub state: Option<Toggle>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Args)]
pub struct MqttArgs {
    #[command(subcommand)]
    pub command: MqttCommand,
}

#[derive(Debug, Subcommand)]
pub enum MqttCommand {
    /// Show the stored broker settings
    Show,

    /// Connect to a broker and store its settings
    Set(MqttSetArgs),
}

#[derive(Debug, Args)]
pub struct MqttSetArgs {
    /// Broker host name or IP
    #[arg(long)]
    pub host: String,

    /// Broker port
    #[arg(long, default_value = "1883")]
    pub port: u16,

    /// Broker username
    #[arg(long)]
    pub username: Option<String>,

    /// Broker password
    #[arg(long, env = "MQTT2CUBE_MQTT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

// ── Config / completions ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
