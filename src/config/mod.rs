//! Scenario configuration for the `vlan-isolate` binary.
//!
//! This module provides:
//! - CLI argument parsing ([`Cli`], [`Command`])
//! - TOML scenario file parsing ([`ScenarioFile`])
//! - Validated scenario ([`ValidatedScenario`])
//! - Scenario template generation ([`write_default_scenario`])
//! - Default values ([`defaults`])
//!
//! # Priority
//!
//! Values are resolved with the following priority (highest to lowest):
//!
//! 1. **Explicit CLI arguments** (`--platform`, `--state-file`,
//!    `--call-timeout`, `--probe-attempts`)
//! 2. **TOML scenario file**
//! 3. **Built-in defaults**
//!
//! Endpoints and the test matrix come from the scenario file only.
//!
//! # Test expectations
//!
//! A `[[tests]]` entry without `expect` expects `reachable` when source and
//! target share a VLAN id and `isolated` otherwise.

mod cli;
pub mod defaults;
mod error;
mod toml;
mod validated;


pub use cli::{Cli, Command, PlatformArg, ScenarioArgs};
pub use error::{ConfigError, field};
pub use toml::{ScenarioFile, default_scenario_template};
pub use validated::{
    Expectation, KubernetesSettings, ProbeFrom, ScenarioEndpoint, ScenarioTest,
    ValidatedScenario, write_default_scenario,
};
