//! CLI argument parsing using clap.
//!
//! Defines the command-line interface with all options and subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::network::PlatformKind;

/// vlan-isolate: VLAN configuration and isolation checks
///
/// Applies VLAN-tagged interfaces, container networks or cluster attachments
/// described in a scenario file, then verifies that endpoints on the same
/// VLAN reach each other and endpoints on different VLANs do not.
#[derive(Debug, Parser)]
#[command(name = "vlan-isolate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Subcommands for vlan-isolate
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a commented scenario file
    Init {
        /// Output path for the scenario file
        #[arg(long, short, default_value = super::defaults::SCENARIO_FILE)]
        output: PathBuf,
    },

    /// Detect the CNI plugins installed in the configured cluster
    Detect(ScenarioArgs),

    /// Apply every endpoint of a scenario and run its test matrix
    Apply {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Leave the applied objects in place instead of tearing them down
        #[arg(long)]
        keep: bool,
    },

    /// Remove the objects recorded in a state file
    Teardown(ScenarioArgs),
}

/// Options shared by every command that reads a scenario.
#[derive(Debug, Clone, Default, Args)]
pub struct ScenarioArgs {
    /// Path to the scenario file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Target platform (overrides engine.platform)
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,

    /// Path to the state file recording applied objects
    #[arg(long = "state-file")]
    pub state_file: Option<PathBuf>,

    /// Per-backend-call timeout in seconds
    #[arg(long = "call-timeout")]
    pub call_timeout: Option<u64>,

    /// Probe attempts per check
    #[arg(long = "probe-attempts")]
    pub probe_attempts: Option<u32>,
}

/// Platform argument for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    /// Linux host (`ip link` sub-interfaces)
    Linux,
    /// Windows host (address binding only)
    Windows,
    /// Docker or Podman MACVLAN networks
    Container,
    /// Kubernetes CNI attachments
    Kubernetes,
}

impl From<PlatformArg> for PlatformKind {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Linux => Self::Linux,
            PlatformArg::Windows => Self::Windows,
            PlatformArg::Container => Self::Container,
            PlatformArg::Kubernetes => Self::Kubernetes,
        }
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parses CLI arguments from an iterator (useful for testing).
    pub fn parse_from_iter<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(iter)
    }

    /// Returns the scenario options of the chosen command, if it has any.
    #[must_use]
    pub const fn scenario_args(&self) -> Option<&ScenarioArgs> {
        match &self.command {
            Command::Init { .. } => None,
            Command::Detect(args) | Command::Teardown(args) => Some(args),
            Command::Apply { scenario, .. } => Some(scenario),
        }
    }
}
