//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use crate::domain::{DeviceSelector, FanCurvePoint, FanPolicy};
use crate::error::DomainError;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// NVML-based GPU governor
///
/// Holds NVIDIA GPU fan speeds, power limits, and acoustic temperature
/// thresholds at their configured targets.
#[derive(Parser, Debug)]
#[command(name = "nvgov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NVGOV_CONFIG")]
    pub config: Option<String>,

    /// Target GPU by index (0-based)
    #[arg(long, global = true)]
    pub gpu: Option<u32>,

    /// Target GPU by exact name
    #[arg(long, global = true)]
    pub gpu_name: Option<String>,

    /// Target GPU by UUID
    #[arg(long, global = true)]
    pub gpu_uuid: Option<String>,

    /// Dry run mode - don't actually apply changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The GPU selected on the command line, UUID taking precedence
    pub fn selector(&self) -> Option<DeviceSelector> {
        DeviceSelector::from_parts(self.gpu_uuid.clone(), self.gpu_name.clone(), self.gpu)
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all detected GPUs
    List,

    /// Show GPU information
    Info(InfoArgs),

    /// Show fan status or change the fan control policy
    Fan(FanArgs),

    /// Start the control loop
    Control(ControlArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the info command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Show all information
    #[arg(short, long)]
    pub all: bool,

    /// Show fan information
    #[arg(long)]
    pub fan: bool,

    /// Show power information
    #[arg(long)]
    pub power: bool,

    /// Show thermal information
    #[arg(long)]
    pub thermal: bool,
}

impl InfoArgs {
    /// Sections to show; no flags means everything
    pub fn sections(&self) -> (bool, bool, bool) {
        if self.all || !(self.fan || self.power || self.thermal) {
            return (true, true, true);
        }
        (self.fan, self.power, self.thermal)
    }
}

/// Arguments for fan commands
#[derive(Parser, Debug)]
pub struct FanArgs {
    #[command(subcommand)]
    pub command: FanCommands,
}

/// Fan subcommands
#[derive(Subcommand, Debug)]
pub enum FanCommands {
    /// Show current fan status
    Status,

    /// Set fan control policy
    Policy {
        /// Policy to set
        #[arg(value_enum)]
        policy: FanPolicyArg,
    },
}

/// Fan policy argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FanPolicyArg {
    /// Automatic fan control (GPU-controlled)
    Auto,
    /// Manual fan control
    Manual,
}

impl From<FanPolicyArg> for FanPolicy {
    fn from(arg: FanPolicyArg) -> Self {
        match arg {
            FanPolicyArg::Auto => FanPolicy::Auto,
            FanPolicyArg::Manual => FanPolicy::Manual,
        }
    }
}

/// Arguments for the control loop command
///
/// Unset options fall back to the configuration file. Each of
/// `--speed-pair`/`--default-speed`, `--power-limit` and `--acoustic-limit`
/// activates its control domain.
#[derive(Parser, Debug)]
pub struct ControlArgs {
    /// Fan curve speed pairs (TEMP:SPEED, repeatable or comma-separated)
    #[arg(long = "speed-pair", value_name = "TEMP:SPEED", value_delimiter = ',')]
    pub speed_pairs: Vec<String>,

    /// Fan speed used below the lowest curve point
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub default_speed: Option<u8>,

    /// Power limit in watts
    #[arg(long)]
    pub power_limit: Option<u32>,

    /// Acoustic temperature limit in Celsius (GPU throttles to stay below it)
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..=150))]
    pub acoustic_limit: Option<i32>,

    /// Control loop interval in seconds
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// Seconds to wait before restarting after a failure
    #[arg(long)]
    pub retry_interval: Option<f64>,

    /// Exit on the first failure instead of restarting
    #[arg(long)]
    pub no_retry: bool,

    /// Run one control tick and exit
    #[arg(long)]
    pub single_use: bool,
}

impl ControlArgs {
    /// Parse the speed pairs into curve points
    pub fn curve_points(&self) -> Result<Vec<FanCurvePoint>, DomainError> {
        self.speed_pairs
            .iter()
            .filter(|pair| !pair.trim().is_empty())
            .map(|pair| FanCurvePoint::parse(pair))
            .collect()
    }
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
