//! CLI argument parsing and command definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::entity::climate::{FanMode, HvacMode, Preset};

/// Poll a Nest thermostat and a Raspberry Pi sensor through shared caches
#[derive(Debug, Parser)]
#[command(
    name = "nestweb",
    author,
    version,
    about = "Poll a Nest thermostat and a Raspberry Pi sensor through shared caches",
    propagate_version = true,
    after_help = "Use 'nestweb <command> --help' for more information about a command."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub command: Command,
}

/// Global options available to all commands
#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Output format (json, yaml, table, auto)
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        global = true,
        conflicts_with = "json"
    )]
    pub output_format: Option<OutputFormat>,

    /// Output as JSON (shorthand for -o json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Nest gateway base URL
    #[arg(long, env = "NEST_URL", global = true)]
    pub nest_url: Option<String>,

    /// Nest gateway bearer token
    #[arg(long, env = "NEST_TOKEN", global = true, hide_env_values = true)]
    pub nest_token: Option<String>,

    /// Raspberry Pi sensor address (host:port)
    #[arg(long, env = "RPI_NET_LOC", global = true)]
    pub net_loc: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Skip SSL certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Override config file path
    #[arg(long, value_name = "PATH", env = "NESTWEB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase logging verbosity (stackable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable trace logging
    #[arg(long, global = true)]
    pub trace: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Hide table headers
    #[arg(long, global = true)]
    pub no_headers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[non_exhaustive]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
    Auto,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set up the configured integrations and show every entity state
    Entities {
        /// Only show entities whose id contains this text
        filter: Option<String>,
    },

    /// Poll all entities on the scan interval and print state changes
    Poll {
        /// Scan interval (e.g. "30s", "1m"); defaults to poll.scan_interval
        #[arg(long, value_name = "DURATION")]
        interval: Option<String>,

        /// Stop after this many poll ticks
        #[arg(long, value_name = "N")]
        count: Option<u64>,
    },

    /// Raspberry Pi sensor
    Rpi {
        #[command(subcommand)]
        command: RpiCommand,
    },

    /// Nest web service
    Nest {
        #[command(subcommand)]
        command: NestCommand,
    },

    /// Inspect and control thermostats
    Climate {
        #[command(subcommand)]
        command: ClimateCommand,
    },

    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum RpiCommand {
    /// Fetch the current reading
    Read,

    /// Show the refresh status of the sensor cache
    Status,
}

#[derive(Debug, Subcommand)]
pub enum NestCommand {
    /// List structures included by the allow-list
    Structures,

    /// List thermostats of the included structures
    Thermostats,

    /// Show the refresh status of the Nest cache
    Status,
}

#[derive(Debug, Subcommand)]
pub enum ClimateCommand {
    /// Show thermostat state
    Show {
        /// Thermostat serial (all thermostats when omitted)
        serial: Option<String>,
    },

    /// Set the target temperature, or the low/high range in auto mode
    SetTemp {
        /// Thermostat serial
        serial: String,

        /// Target temperature
        #[arg(required_unless_present_all = ["low", "high"])]
        temperature: Option<f64>,

        /// Lower bound of the range
        #[arg(long, requires = "high")]
        low: Option<f64>,

        /// Upper bound of the range
        #[arg(long, requires = "low")]
        high: Option<f64>,
    },

    /// Set the hvac mode
    SetMode {
        /// Thermostat serial
        serial: String,

        #[arg(value_enum)]
        mode: HvacMode,
    },

    /// Set the preset (away or none)
    SetPreset {
        /// Thermostat serial
        serial: String,

        #[arg(value_enum)]
        preset: Preset,
    },

    /// Set the fan mode
    SetFan {
        /// Thermostat serial
        serial: String,

        #[arg(value_enum)]
        fan: FanMode,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show effective configuration
    Show,

    /// Print config file path
    Path,

    /// Get a specific configuration value
    Get {
        /// Configuration key (dot-separated path)
        key: Option<String>,
    },

    /// Reset configuration to defaults
    Reset,
}
