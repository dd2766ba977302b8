//! vlan-isolate: VLAN isolation engine
//!
//! Entry point for the vlan-isolate application.

use std::process::ExitCode;

use vlan_isolate::config::{Cli, Command, ScenarioArgs, ValidatedScenario, write_default_scenario};

mod app;
mod run;

use app::{exit_code, print_config_hint, setup_tracing};
use run::RunError;

/// Main entry point.
///
/// Excluded from coverage as it's the thin wrapper around testable components.
#[cfg(not(tarpaulin_include))]
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let (args, job) = match &cli.command {
        Command::Init { output } => return handle_init(output),
        Command::Detect(args) => (args, Job::Detect),
        Command::Apply { scenario, keep } => (scenario, Job::Apply { keep: *keep }),
        Command::Teardown(args) => (args, Job::Teardown),
    };

    let scenario = match load_scenario(args) {
        Ok(scenario) => scenario,
        Err(code) => return code,
    };

    setup_tracing(cli.verbose);
    tracing::info!("{scenario}");

    run_job(&scenario, job)
}

/// Subcommands that need a runtime.
#[derive(Debug, Clone, Copy)]
enum Job {
    Detect,
    Apply { keep: bool },
    Teardown,
}

/// Handles the `init` subcommand.
fn handle_init(output: &std::path::Path) -> ExitCode {
    match write_default_scenario(output) {
        Ok(()) => {
            println!("Scenario template written to: {}", output.display());
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code::CONFIG_ERROR
        }
    }
}

/// Loads and validates the scenario, printing errors to stderr.
fn load_scenario(args: &ScenarioArgs) -> Result<ValidatedScenario, ExitCode> {
    ValidatedScenario::load(args).map_err(|e| {
        eprintln!("Configuration error: {e}");
        print_config_hint(&e);
        exit_code::CONFIG_ERROR
    })
}

/// Runs a subcommand on a fresh runtime.
///
/// Excluded from coverage - requires async runtime.
#[cfg(not(tarpaulin_include))]
fn run_job(scenario: &ValidatedScenario, job: Job) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return exit_code::runtime_error();
        }
    };

    let result = runtime.block_on(async {
        match job {
            Job::Detect => run::execute_detect(scenario).await,
            Job::Apply { keep } => run::execute_apply(scenario, keep).await,
            Job::Teardown => run::execute_teardown(scenario).await,
        }
    });

    match result {
        Ok(()) => exit_code::SUCCESS,
        Err(RunError::Config(e)) => {
            eprintln!("Configuration error: {e}");
            print_config_hint(&e);
            exit_code::CONFIG_ERROR
        }
        Err(e) => {
            tracing::error!("{e}");
            exit_code::runtime_error()
        }
    }
}
