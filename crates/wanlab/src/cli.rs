//! Clap derive structures for the `wanlab` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use wanlab_core::{Preset, PresetScope};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wanlab -- drive a WAN impairment lab from the command line
#[derive(Debug, Parser)]
#[command(
    name = "wanlab",
    version,
    about = "Shape, probe and watch emulated WAN links",
    long_about = "Controller for a network-impairment lab.\n\n\
        Discovers emulated ports, assigns delay/jitter/loss/rate profiles,\n\
        pushes them to the shaping backend and shows live link counters.",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "WANLAB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 'b', env = "WANLAB_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Bearer token
    #[arg(long, env = "WANLAB_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Directory for port profiles and snapshots (overrides profile)
    #[arg(long, env = "WANLAB_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WANLAB_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "WANLAB_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile; default 30)
    #[arg(long, env = "WANLAB_TIMEOUT", global = true)]
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
    /// List ports and manage their shaping profiles
    #[command(alias = "p")]
    Ports(PortsArgs),

    /// Create, tear down and inspect the lab topology
    Lab(LabArgs),

    /// Save and restore named sets of port profiles
    #[command(alias = "snap")]
    Snapshots(SnapshotsArgs),

    /// Write all port profiles to an export document
    Export(ExportArgs),

    /// Load port profiles from an export document
    Import(ImportArgs),

    /// Ping from a port to its peer on the same subnet
    Probe(ProbeArgs),

    /// Stream live link counters until interrupted
    Watch,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PORTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PortsArgs {
    #[command(subcommand)]
    pub command: PortsCommand,
}

#[derive(Debug, Subcommand)]
pub enum PortsCommand {
    /// List every known port with its profile
    #[command(alias = "ls")]
    List,

    /// Show one port
    Get {
        /// Port key (`name:iface`)
        key: String,
    },

    /// Register a port discovery does not report
    Add {
        /// Port key (`name:iface`)
        key: String,
    },

    /// Forget a port and its stored profile
    #[command(alias = "rm")]
    Remove {
        /// Port key (`name:iface`)
        key: String,
    },

    /// Change fields of a port's profile
    Edit(EditArgs),

    /// Push profiles to the backend in one batch
    Apply {
        /// Ports to apply; all ports when omitted
        keys: Vec<String>,
    },

    /// Paint a named preset onto ports and apply it
    Preset {
        /// Preset name (none, wifi_bad, mobile_3g, satellite_geo)
        #[arg(value_parser = parse_preset)]
        preset: Preset,

        /// Which ports to paint (all, clients, servers)
        #[arg(long, default_value = "all", value_parser = parse_scope)]
        scope: PresetScope,
    },
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Port key (`name:iface`)
    pub key: String,

    /// One-way delay in milliseconds
    #[arg(long)]
    pub delay: Option<u32>,

    /// Delay jitter in milliseconds
    #[arg(long)]
    pub jitter: Option<u32>,

    /// Packet loss percent (0-100)
    #[arg(long)]
    pub loss: Option<f64>,

    /// Bit-error rate percent (0-100)
    #[arg(long)]
    pub ber: Option<f64>,

    /// Rate limit (e.g. 20mbit); empty string removes the limit
    #[arg(long)]
    pub rate: Option<String>,

    /// Queue limit in packets; 0 removes it
    #[arg(long)]
    pub queue_limit: Option<u32>,

    /// Per-frame overhead in bytes; 0 removes it
    #[arg(long)]
    pub overhead: Option<u32>,

    /// Minimum packet unit in bytes
    #[arg(long)]
    pub mpu: Option<u32>,

    /// Apply the port right after editing
    #[arg(long)]
    pub apply: bool,
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    s.parse()
        .map_err(|_| format!("unknown preset '{s}' (none, wifi_bad, mobile_3g, satellite_geo)"))
}

fn parse_scope(s: &str) -> Result<PresetScope, String> {
    s.parse()
        .map_err(|_| format!("unknown scope '{s}' (all, clients, servers)"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  LAB
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LabArgs {
    #[command(subcommand)]
    pub command: LabCommand,
}

#[derive(Debug, Subcommand)]
pub enum LabCommand {
    /// Create a lab with one server and N clients
    Init {
        /// Number of client ports (1-32)
        #[arg(value_parser = clap::value_parser!(u32).range(1..=32))]
        ports: u32,

        /// Tear down an existing lab first
        #[arg(long)]
        recreate: bool,
    },

    /// Remove every lab container and network
    Destroy,

    /// Show the backend's view of the lab
    Status,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SNAPSHOTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SnapshotsArgs {
    #[command(subcommand)]
    pub command: SnapshotsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotsCommand {
    /// List saved snapshots
    #[command(alias = "ls")]
    List,

    /// Save the current profiles under a name
    Save {
        /// Snapshot name
        name: String,
    },

    /// Paint a snapshot onto matching ports
    Load {
        /// Snapshot name
        name: String,

        /// Also push the painted profiles to the backend
        #[arg(long)]
        apply: bool,
    },

    /// Delete a snapshot
    #[command(alias = "rm")]
    Delete {
        /// Snapshot name
        name: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  EXPORT / IMPORT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Output file; stdout when omitted or `-`
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Export document (`{meta, cfg}`) or bare key → profile mapping
    pub file: PathBuf,

    /// Re-create the lab at the document's size and apply the profiles
    #[arg(long)]
    pub restore: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROBE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Port to probe from (`name:iface`)
    pub key: String,

    /// Ping from the resolved peer back to this port instead
    #[arg(long, short = 'r')]
    pub reverse: bool,

    /// Number of echo requests (1-10)
    #[arg(long, short = 'c', default_value = "4", conflicts_with = "continuous")]
    pub count: u32,

    /// Ping once a second until interrupted
    #[arg(long)]
    pub continuous: bool,

    /// Write the log with a settings header to FILE (or into FILE if it
    /// is a directory)
    #[arg(long, value_name = "FILE")]
    pub save_log: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current configuration (secrets masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set a field on the active profile
    Set {
        /// Field name (backend, token_env, data_dir, timeout, poll_interval_ms,
        /// stream_enabled, ca_cert, insecure)
        key: String,
        /// New value
        value: String,
    },

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
