//! The orchestrator every caller talks to.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::result::{
    REASON_FLAT_NETWORK, REASON_LABEL_ONLY, REASON_NO_PROBE_ENDPOINTS, REASON_NOT_APPLIED,
    REASON_TEARDOWN,
};
use super::{
    ApplyRequest, ApplyResult, EngineError, EngineOptions, EngineState, ErrorCode, ErrorReport,
    ProbePlan, StateMachine, TargetLocks, Verification,
};
use crate::backend::{
    AppliedObject, Backend, BackendError, BackendHandle, BuildPlan, IsolationSupport,
    ObjectRecorder,
};
use crate::network::{NetworkConfig, PlatformKind};
use crate::verify::Verifier;

/// Mutable bookkeeping of one invocation.
struct Invocation {
    machine: StateMachine,
    objects: Vec<AppliedObject>,
    warnings: Vec<ErrorReport>,
}

impl Invocation {
    fn new() -> Self {
        Self {
            machine: StateMachine::new(),
            objects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, next: EngineState) {
        debug_assert!(
            self.machine.current().can_advance_to(next),
            "{} -> {next}",
            self.machine.current()
        );
        if let Err(e) = self.machine.advance(next) {
            error!(error = %e, "Engine state machine violated");
        }
    }

    fn finish(
        self,
        verification: Verification,
        error: Option<&EngineError>,
    ) -> ApplyResult {
        let state = self.machine.current();
        ApplyResult {
            success: state == EngineState::Done && error.is_none(),
            state,
            applied_objects: self.objects,
            verification,
            error: error.map(EngineError::report),
            warnings: self.warnings,
            transitions: self.machine.into_visited(),
        }
    }
}

fn checkpoint(cancel: &CancellationToken, stage: EngineState) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled { stage });
    }
    Ok(())
}

/// Drives backends and the verifier through the invocation state machine.
///
/// One backend is registered per [`PlatformKind`]. Every `apply` either ends
/// `done` with its objects in place, or `failed` with every object it
/// created torn down again (anything rollback could not remove stays listed
/// in the result and is reported as a warning).
pub struct NetworkEngine<B, V> {
    backends: BTreeMap<PlatformKind, B>,
    verifier: V,
    options: EngineOptions,
    locks: TargetLocks,
}

impl<B: Backend, V: Verifier> NetworkEngine<B, V> {
    /// Creates an engine with no backends.
    pub fn new(verifier: V) -> Self {
        Self {
            backends: BTreeMap::new(),
            verifier,
            options: EngineOptions::default(),
            locks: TargetLocks::new(),
        }
    }

    /// Registers `backend` for the platform it reports.
    #[must_use]
    pub fn with_backend(mut self, backend: B) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    #[must_use]
    pub const fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn backend(&self, platform: PlatformKind) -> Option<&B> {
        self.backends.get(&platform)
    }

    fn backend_for(&self, platform: PlatformKind) -> Result<&B, BackendError> {
        self.backends
            .get(&platform)
            .ok_or(BackendError::NotConfigured { platform })
    }

    /// Applies `config` on `platform` without probes.
    pub async fn apply(&self, config: &NetworkConfig, platform: PlatformKind) -> ApplyResult {
        self.apply_with(ApplyRequest::new(config.clone(), platform))
            .await
    }

    /// Applies a request, verifying against its probe plan.
    pub async fn apply_with(&self, request: ApplyRequest) -> ApplyResult {
        let span = info_span!(
            "apply",
            platform = %request.platform,
            interface = request.config.interface(),
            vlan = %request.config.vlan_id()
        );
        self.run_apply(request).instrument(span).await
    }

    /// Removes `objects` in reverse order. Already-absent objects count as
    /// removed, so tearing down the same list twice succeeds both times.
    pub async fn teardown(&self, objects: &[AppliedObject]) -> ApplyResult {
        let span = info_span!("teardown", objects = objects.len());
        async {
            let mut run = Invocation::new();
            run.enter(EngineState::RollingBack);
            let keys: Vec<_> = objects
                .iter()
                .map(|o| (o.platform(), o.interface.clone()))
                .collect();
            let _guards = self.locks.acquire_all(&keys).await;

            run.objects = objects.to_vec();
            self.remove_all(&mut run).await;

            if run.objects.is_empty() {
                run.enter(EngineState::Done);
                info!("Teardown complete");
                return run.finish(Verification::skipped(REASON_TEARDOWN), None);
            }
            run.enter(EngineState::Failed);
            let report = ErrorReport {
                code: ErrorCode::RollbackPartialFailure,
                message: format!(
                    "{} of {} objects could not be removed",
                    run.objects.len(),
                    objects.len()
                ),
            };
            warn!(%report, "Teardown incomplete");
            let mut result = run.finish(Verification::skipped(REASON_TEARDOWN), None);
            result.error = Some(report);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_apply(&self, request: ApplyRequest) -> ApplyResult {
        let ApplyRequest {
            config,
            platform,
            probes,
            cancel,
        } = request;
        let mut run = Invocation::new();
        let key = (platform, config.interface().to_string());

        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            guard = self.locks.acquire(&key) => Some(guard),
        };

        run.enter(EngineState::Building);
        let plan = match self.build_stage(&config, platform, &cancel).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, code = %e.code(), "Build failed, nothing applied");
                run.enter(EngineState::Failed);
                return run.finish(Verification::skipped(REASON_NOT_APPLIED), Some(&e));
            }
        };

        run.enter(EngineState::Applying);
        if let Err(e) = self.apply_stage(&mut run, &config, platform, &plan, &cancel).await {
            return self
                .roll_back(run, e, Verification::skipped(REASON_NOT_APPLIED))
                .await;
        }

        if !config.vlan_id().is_tagged() {
            info!("Flat network, skipping isolation verification");
            run.enter(EngineState::Confirmed);
            run.enter(EngineState::Done);
            return run.finish(Verification::skipped(REASON_FLAT_NETWORK), None);
        }

        run.enter(EngineState::Verifying);
        let verified = match checkpoint(&cancel, EngineState::Verifying) {
            Ok(()) => self.verify_stage(&run, platform, &plan, &probes).await,
            Err(e) => Err(e),
        };
        match verified {
            Ok(verification) => {
                info!(%verification, objects = run.objects.len(), "Applied");
                run.enter(EngineState::Confirmed);
                run.enter(EngineState::Done);
                run.finish(verification, None)
            }
            Err(e) => {
                let verification = match &e {
                    EngineError::VerificationFailure { reason } => Verification::Fail {
                        reason: reason.clone(),
                    },
                    _ => Verification::skipped(e.code().as_str()),
                };
                self.roll_back(run, e, verification).await
            }
        }
    }

    async fn build_stage(
        &self,
        config: &NetworkConfig,
        platform: PlatformKind,
        cancel: &CancellationToken,
    ) -> Result<BuildPlan, EngineError> {
        checkpoint(cancel, EngineState::Building)?;
        let backend = self.backend_for(platform).map_err(|e| EngineError::InvalidConfig {
            reason: e.to_string(),
            source: Some(e),
        })?;
        let after = self.options.call_timeout;
        let plan = tokio::time::timeout(after, backend.build(config))
            .await
            .map_err(|_| EngineError::Timeout {
                operation: format!("build on {platform}"),
                after,
            })?
            .map_err(EngineError::from_build)?;
        debug!(objects = plan.objects.len(), isolation = ?plan.isolation, "Plan built");
        Ok(plan)
    }

    async fn apply_stage(
        &self,
        run: &mut Invocation,
        config: &NetworkConfig,
        platform: PlatformKind,
        plan: &BuildPlan,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let backend = self.backend_for(platform).map_err(|e| EngineError::InvalidConfig {
            reason: e.to_string(),
            source: Some(e),
        })?;
        let after = self.options.call_timeout;
        for spec in &plan.objects {
            checkpoint(cancel, EngineState::Applying)?;
            debug!(object = %spec, "Applying");
            let mut recorder = ObjectRecorder::new(config.interface(), &mut run.objects);
            match tokio::time::timeout(after, backend.apply_one(spec, &mut recorder)).await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    return Err(EngineError::BackendApplyFailure {
                        object: spec.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(EngineError::Timeout {
                        operation: format!("apply {spec}"),
                        after,
                    });
                }
            }
        }
        Ok(())
    }

    async fn verify_stage(
        &self,
        run: &Invocation,
        platform: PlatformKind,
        plan: &BuildPlan,
        probes: &ProbePlan,
    ) -> Result<Verification, EngineError> {
        let backend = self.backend_for(platform).map_err(|e| EngineError::InvalidConfig {
            reason: e.to_string(),
            source: Some(e),
        })?;
        let handles: Vec<BackendHandle> = run.objects.iter().map(|o| o.handle.clone()).collect();
        let after = self.options.call_timeout;
        let present = tokio::time::timeout(after, backend.verify(&handles))
            .await
            .map_err(|_| EngineError::Timeout {
                operation: "verify applied objects".to_string(),
                after,
            })?
            .map_err(|e| EngineError::VerificationFailure {
                reason: format!("could not inspect applied objects: {e}"),
            })?;
        if !present {
            return Err(EngineError::VerificationFailure {
                reason: "applied objects are missing from the target".to_string(),
            });
        }

        let label_only = match plan.isolation {
            IsolationSupport::Unsupported { reason } => {
                warn!(reason, "Isolation cannot be verified on this platform");
                return Ok(Verification::skipped(reason));
            }
            IsolationSupport::Enforced => false,
            IsolationSupport::LabelOnly => true,
        };

        if !probes.has_checks() {
            return Ok(if label_only {
                Verification::Degraded {
                    reason: REASON_LABEL_ONLY.to_string(),
                }
            } else {
                Verification::skipped(REASON_NO_PROBE_ENDPOINTS)
            });
        }
        self.probe(probes).await?;

        Ok(if label_only {
            Verification::Degraded {
                reason: REASON_LABEL_ONLY.to_string(),
            }
        } else {
            Verification::Pass
        })
    }

    async fn probe(&self, probes: &ProbePlan) -> Result<(), EngineError> {
        let Some(local) = &probes.local else {
            return Ok(());
        };
        if let Some(peer) = &probes.peer {
            if !self.verifier.verify_same(local, peer).await {
                return Err(EngineError::VerificationFailure {
                    reason: format!("{local} cannot reach same-VLAN peer {peer}"),
                });
            }
        }
        if let Some(contrast) = &probes.contrast {
            if !self.verifier.verify_isolated(local, contrast).await {
                return Err(EngineError::VerificationFailure {
                    reason: format!("{local} is not isolated from {contrast}"),
                });
            }
        }
        Ok(())
    }

    async fn roll_back(
        &self,
        mut run: Invocation,
        cause: EngineError,
        verification: Verification,
    ) -> ApplyResult {
        error!(error = %cause, code = %cause.code(), objects = run.objects.len(), "Rolling back");
        run.enter(EngineState::RollingBack);
        self.remove_all(&mut run).await;
        run.enter(EngineState::Failed);
        run.finish(verification, Some(&cause))
    }

    /// Tears down `run.objects` newest first, leaving only what could not be
    /// removed and recording a warning for each.
    async fn remove_all(&self, run: &mut Invocation) {
        let after = self.options.call_timeout;
        let mut remaining = Vec::new();
        for object in std::mem::take(&mut run.objects).into_iter().rev() {
            let outcome = match self.backend_for(object.platform()) {
                Ok(backend) => tokio::time::timeout(after, backend.teardown_one(&object.handle))
                    .await
                    .unwrap_or_else(|_| {
                        Err(BackendError::CommandFailed {
                            command: format!("teardown {}", object.handle),
                            exit_code: -1,
                            stderr: format!("timed out after {after:?}"),
                        })
                    }),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => debug!(object = %object.handle, "Removed"),
                Err(source) => {
                    let warning = EngineError::RollbackPartialFailure {
                        object: object.handle.to_string(),
                        source,
                    };
                    warn!(error = %warning, "Could not remove object");
                    run.warnings.push(warning.report());
                    remaining.push(object);
                }
            }
        }
        remaining.reverse();
        run.objects = remaining;
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
