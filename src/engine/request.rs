//! Invocation inputs.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::network::{NetworkConfig, PlatformKind};
use crate::verify::Endpoint;

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Limit for each individual backend call.
    pub call_timeout: Duration,
}

impl EngineOptions {
    /// Default per-call timeout (30 seconds).
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub const fn new() -> Self {
        Self {
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Endpoints the verifier probes after an apply.
///
/// `local` is the endpoint the applied configuration creates. With a `peer`
/// on the same VLAN the engine checks reachability; with a `contrast` on a
/// different VLAN it checks isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbePlan {
    pub local: Option<Endpoint>,
    pub peer: Option<Endpoint>,
    pub contrast: Option<Endpoint>,
}

impl ProbePlan {
    /// Returns true if there is at least one check to run.
    #[must_use]
    pub const fn has_checks(&self) -> bool {
        self.local.is_some() && (self.peer.is_some() || self.contrast.is_some())
    }
}

/// Everything one `apply_with` call needs.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub config: NetworkConfig,
    pub platform: PlatformKind,
    pub probes: ProbePlan,
    /// Checked between stages; cancelling stops the invocation and rolls
    /// back whatever was applied.
    pub cancel: CancellationToken,
}

impl ApplyRequest {
    /// Creates a request with no probes and a token that is never cancelled.
    pub fn new(config: NetworkConfig, platform: PlatformKind) -> Self {
        Self {
            config,
            platform,
            probes: ProbePlan::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_probes(mut self, probes: ProbePlan) -> Self {
        self.probes = probes;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
