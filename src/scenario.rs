//! Runs a validated scenario against a [`NetworkEngine`].
//!
//! Endpoints are applied in order. Each apply probes the new endpoint against
//! the first earlier endpoint on the same VLAN (reachability) and the first
//! earlier endpoint on a different VLAN (isolation). The first failed apply
//! stops the run; once every endpoint is in place the `[[tests]]` matrix is
//! checked with the engine's verifier.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::config::{Expectation, ValidatedScenario};
use crate::engine::{ApplyRequest, NetworkEngine, ProbePlan};
use crate::network::PlatformKind;
use crate::state::ApplyRecord;
use crate::verify::Verifier;

/// Result of one `[[tests]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub source: String,
    pub target: String,
    pub expect: Expectation,
    pub passed: bool,
}

/// Everything one scenario run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioReport {
    /// One record per endpoint the engine was invoked for.
    pub records: Vec<ApplyRecord>,
    /// Test matrix results; empty unless every endpoint applied.
    pub checks: Vec<CheckOutcome>,
    /// The run stopped because of cancellation.
    pub cancelled: bool,
}

impl ScenarioReport {
    /// True if every endpoint applied and every check passed.
    #[must_use]
    pub fn success(&self, expected_records: usize) -> bool {
        !self.cancelled
            && self.records.len() == expected_records
            && self.records.iter().all(|r| r.result.success)
            && self.checks.iter().all(|c| c.passed)
    }
}

/// Picks the endpoints the engine probes right after applying endpoint
/// `index`. Only earlier endpoints are considered since later ones do not
/// exist yet.
#[must_use]
pub fn probe_plan(scenario: &ValidatedScenario, index: usize) -> ProbePlan {
    let Some(local) = scenario.probe_endpoint(index) else {
        return ProbePlan::default();
    };
    let earlier = || (0..index).filter_map(|j| scenario.probe_endpoint(j));
    ProbePlan {
        peer: earlier().find(|e| e.vlan_id == local.vlan_id),
        contrast: earlier().find(|e| e.vlan_id != local.vlan_id),
        local: Some(local),
    }
}

/// Applies every endpoint, then runs the test matrix.
pub async fn apply_scenario<B: Backend, V: Verifier>(
    engine: &NetworkEngine<B, V>,
    scenario: &ValidatedScenario,
    platform: PlatformKind,
    cancel: &CancellationToken,
) -> ScenarioReport {
    let mut report = ScenarioReport::default();

    for (index, endpoint) in scenario.endpoints.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(remaining = scenario.endpoints.len() - index, "Cancelled, not applying further endpoints");
            report.cancelled = true;
            return report;
        }

        let request = ApplyRequest::new(endpoint.config.clone(), platform)
            .with_probes(probe_plan(scenario, index))
            .with_cancel(cancel.clone());
        let result = engine.apply_with(request).await;

        let applied = result.success;
        if applied {
            info!(
                endpoint = %endpoint.name,
                objects = result.applied_objects.len(),
                verification = %result.verification,
                "Endpoint applied"
            );
        } else if let Some(failure) = &result.error {
            error!(endpoint = %endpoint.name, error = %failure, "Endpoint failed");
        }
        report
            .records
            .push(ApplyRecord::new(&endpoint.name, platform, result));
        if !applied {
            report.cancelled = cancel.is_cancelled();
            return report;
        }
    }

    report.checks = run_checks(engine.verifier(), scenario).await;
    report
}

/// Runs the `[[tests]]` matrix.
pub async fn run_checks<V: Verifier>(verifier: &V, scenario: &ValidatedScenario) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::with_capacity(scenario.tests.len());
    for test in &scenario.tests {
        let source = &scenario.endpoints[test.source].name;
        let target = &scenario.endpoints[test.target].name;
        let passed = match (
            scenario.probe_endpoint(test.source),
            scenario.probe_endpoint(test.target),
        ) {
            (Some(a), Some(b)) => match test.expect {
                Expectation::Reachable => verifier.verify_same(&a, &b).await,
                Expectation::Isolated => verifier.verify_isolated(&a, &b).await,
            },
            _ => false,
        };
        if passed {
            info!(%source, %target, expect = %test.expect, "Check passed");
        } else {
            error!(%source, %target, expect = %test.expect, "Check failed");
        }
        outcomes.push(CheckOutcome {
            source: source.clone(),
            target: target.clone(),
            expect: test.expect,
            passed,
        });
    }
    outcomes
}

#[cfg(test)]
#[path = "scenario_tests.rs"]
mod tests;
