//! Subcommand execution.
//!
//! Wires the library pieces to the real command executor and `kubectl`,
//! runs a scenario or a teardown and keeps the state file in step with
//! what is actually left on the hosts and cluster.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use vlan_isolate::backend::{
    AppliedObject, ContainerBackend, KubernetesBackend, LinuxBackend, PlatformBackend,
    WindowsBackend,
};
use vlan_isolate::cni::{CapabilityCache, CniCapabilitySet, detect};
use vlan_isolate::config::{ConfigError, ValidatedScenario, field};
use vlan_isolate::engine::{ApplyResult, NetworkEngine};
use vlan_isolate::exec::{KubectlCluster, LocalExecutor};
use vlan_isolate::network::PlatformKind;
use vlan_isolate::scenario::{ScenarioReport, apply_scenario};
use vlan_isolate::state::{
    ApplyRecord, FileStateStore, LoadResult, StateError, StateStore, applied_objects,
};
use vlan_isolate::verify::{ExecProber, IsolationVerifier};

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

type AppCluster = KubectlCluster<LocalExecutor>;
type AppBackend = PlatformBackend<LocalExecutor, AppCluster>;
type AppEngine = NetworkEngine<AppBackend, IsolationVerifier<ExecProber<LocalExecutor>>>;

/// Error type for runtime execution failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The scenario is missing something this subcommand needs.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to save the state file.
    #[error("Failed to save state: {0}")]
    StateSave(#[source] StateError),

    /// The state file exists but cannot be used.
    #[error("State file is unusable: {reason}")]
    StateCorrupted { reason: String },

    /// Failed to render the report.
    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),

    /// An endpoint or a check failed.
    #[error("Scenario failed: {applied} of {total} endpoints applied, {failed_checks} checks failed")]
    ScenarioFailed {
        applied: usize,
        total: usize,
        failed_checks: usize,
    },

    /// Some objects could not be removed; they stay in the state file.
    #[error("Teardown incomplete: {remaining} objects remain")]
    TeardownIncomplete { remaining: usize },
}

/// What `apply` prints on stdout.
#[derive(Debug, Serialize)]
struct ApplySummary<'a> {
    success: bool,
    #[serde(flatten)]
    report: &'a ScenarioReport,
}

/// Resolves the platform an `apply` targets.
fn require_platform(scenario: &ValidatedScenario) -> Result<PlatformKind, ConfigError> {
    scenario.platform.ok_or_else(|| {
        ConfigError::missing(
            field::PLATFORM,
            "Use --platform or set 'platform' in the [engine] section.",
        )
    })
}

/// Returns the state store, which `teardown` cannot work without.
fn require_state_store(scenario: &ValidatedScenario) -> Result<FileStateStore, ConfigError> {
    scenario
        .state_file
        .as_ref()
        .map(FileStateStore::new)
        .ok_or_else(|| {
            ConfigError::missing(
                field::STATE_FILE,
                "Use --state-file or set 'state_file' in the [engine] section.",
            )
        })
}

fn kubectl(scenario: &ValidatedScenario) -> AppCluster {
    let settings = &scenario.kubernetes;
    let mut cluster = KubectlCluster::new(LocalExecutor).with_binary(&settings.kubectl);
    if let Some(context) = &settings.context {
        cluster = cluster.with_context(context);
    }
    if let Some(path) = &settings.kubeconfig {
        cluster = cluster.with_kubeconfig(path);
    }
    cluster
}

/// Builds an engine with one backend per platform.
fn build_engine(scenario: &ValidatedScenario) -> AppEngine {
    let cluster = kubectl(scenario);
    let prober = ExecProber::new(LocalExecutor).with_kubectl(cluster.base_command());
    let verifier = IsolationVerifier::new(prober).with_policy(scenario.probe);

    let mut linux = LinuxBackend::new(LocalExecutor);
    if scenario.linux_sudo {
        linux = linux.with_sudo();
    }
    let mut kubernetes = KubernetesBackend::new(cluster, &scenario.kubernetes.namespace)
        .with_reuse_existing(scenario.kubernetes.reuse_existing);
    if scenario.kubernetes.cache_capabilities {
        kubernetes = kubernetes.with_capability_cache(Arc::new(CapabilityCache::new()));
    }

    NetworkEngine::new(verifier)
        .with_options(scenario.engine)
        .with_backend(PlatformBackend::Linux(linux))
        .with_backend(PlatformBackend::Windows(
            WindowsBackend::new(LocalExecutor).with_shell(&scenario.windows_shell),
        ))
        .with_backend(PlatformBackend::Container(ContainerBackend::new(
            LocalExecutor,
            scenario.runtime,
        )))
        .with_backend(PlatformBackend::Kubernetes(kubernetes))
}

/// Reads saved records; a missing file means nothing was applied yet.
fn load_records(store: &impl StateStore) -> Result<Vec<ApplyRecord>, RunError> {
    match store.load() {
        LoadResult::Loaded(records) => Ok(records),
        LoadResult::NotFound => {
            tracing::debug!("No previous state found");
            Ok(Vec::new())
        }
        LoadResult::Corrupted { reason } => Err(RunError::StateCorrupted { reason }),
    }
}

/// Narrows records to the objects a teardown left behind.
///
/// Records with nothing left are dropped.
fn remaining_records(records: Vec<ApplyRecord>, leftovers: &[AppliedObject]) -> Vec<ApplyRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            record
                .result
                .applied_objects
                .retain(|object| leftovers.contains(object));
            (!record.result.applied_objects.is_empty()).then_some(record)
        })
        .collect()
}

fn render_summary(report: &ScenarioReport, expected_records: usize) -> Result<String, RunError> {
    let summary = ApplySummary {
        success: report.success(expected_records),
        report,
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

fn scenario_outcome(report: &ScenarioReport, total: usize) -> Result<(), RunError> {
    if report.success(total) {
        return Ok(());
    }
    Err(RunError::ScenarioFailed {
        applied: report.records.iter().filter(|r| r.result.success).count(),
        total,
        failed_checks: report.checks.iter().filter(|c| !c.passed).count(),
    })
}

/// Tears down everything `records` still hold and returns what is left.
async fn teardown_records(
    engine: &AppEngine,
    records: Vec<ApplyRecord>,
) -> (Vec<ApplyRecord>, Option<ApplyResult>) {
    let objects = applied_objects(&records);
    if objects.is_empty() {
        tracing::info!("Nothing to tear down");
        return (Vec::new(), None);
    }
    let result = engine.teardown(&objects).await;
    let remaining = remaining_records(records, &result.applied_objects);
    (remaining, Some(result))
}

async fn save(store: Option<&FileStateStore>, records: &[ApplyRecord]) -> Result<(), RunError> {
    if let Some(store) = store {
        store.save(records).await.map_err(RunError::StateSave)?;
        tracing::debug!(records = records.len(), path = %store.path().display(), "State saved");
    }
    Ok(())
}

/// Applies the scenario, reports it and, unless `keep` is set, removes
/// what it created.
///
/// # Errors
///
/// Returns an error if the scenario lacks a platform or endpoints, if the
/// state file cannot be read or written, if any endpoint or check failed
/// or if teardown left objects behind.
///
/// Excluded from coverage - runs real commands and installs a signal handler.
#[cfg(not(tarpaulin_include))]
pub async fn execute_apply(scenario: &ValidatedScenario, keep: bool) -> Result<(), RunError> {
    let platform = require_platform(scenario)?;
    if scenario.endpoints.is_empty() {
        return Err(
            ConfigError::missing(field::ENDPOINTS, "Add at least one [[endpoints]] entry.").into(),
        );
    }
    let engine = build_engine(scenario);
    let store = scenario.state_file.as_ref().map(FileStateStore::new);
    let previous = store.as_ref().map(load_records).transpose()?.unwrap_or_default();

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_shutdown(cancel.clone()));
    let report = apply_scenario(&engine, scenario, platform, &cancel).await;
    watcher.abort();

    let mut tracked = previous.clone();
    tracked.extend(report.records.iter().cloned());
    save(store.as_ref(), &tracked).await?;
    println!("{}", render_summary(&report, scenario.endpoints.len())?);

    if keep {
        tracing::info!("Keeping applied objects; run 'vlan-isolate teardown' to remove them");
    } else {
        let (remaining, result) = teardown_records(&engine, report.records.clone()).await;
        let mut tracked = previous;
        tracked.extend(remaining.iter().cloned());
        save(store.as_ref(), &tracked).await?;
        if result.is_some_and(|r| !r.success) {
            return Err(RunError::TeardownIncomplete {
                remaining: applied_objects(&remaining).len(),
            });
        }
    }

    scenario_outcome(&report, scenario.endpoints.len())
}

/// Removes every object recorded in the state file.
///
/// # Errors
///
/// Returns an error if no state file is configured or it cannot be used,
/// or if some objects could not be removed.
///
/// Excluded from coverage - runs real commands.
#[cfg(not(tarpaulin_include))]
pub async fn execute_teardown(scenario: &ValidatedScenario) -> Result<(), RunError> {
    let store = require_state_store(scenario)?;
    let records = load_records(&store)?;
    let engine = build_engine(scenario);

    let (remaining, result) = teardown_records(&engine, records).await;
    save(Some(&store), &remaining).await?;
    if let Some(result) = result {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    if remaining.is_empty() {
        Ok(())
    } else {
        Err(RunError::TeardownIncomplete {
            remaining: applied_objects(&remaining).len(),
        })
    }
}

/// Prints the cluster's CNI capabilities.
///
/// # Errors
///
/// Returns an error if the capabilities cannot be rendered.
///
/// Excluded from coverage - runs real `kubectl`.
#[cfg(not(tarpaulin_include))]
pub async fn execute_detect(scenario: &ValidatedScenario) -> Result<(), RunError> {
    let caps: CniCapabilitySet = detect(&kubectl(scenario)).await;
    tracing::info!(plugins = %caps.plugin_names(), "Detected CNI plugins");
    println!("{}", serde_json::to_string_pretty(&caps)?);
    Ok(())
}

/// Cancels `token` on Ctrl+C or SIGTERM.
///
/// Excluded from coverage - requires OS signal handling.
#[cfg(not(tarpaulin_include))]
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::warn!("Shutdown signal received, rolling back the current endpoint");
    token.cancel();
}
