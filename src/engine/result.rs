//! Invocation outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EngineState, ErrorReport};
use crate::backend::AppliedObject;

/// Reason: untagged configurations have nothing to isolate.
pub const REASON_FLAT_NETWORK: &str = "flat_network";
/// Reason: no peer or contrast endpoint was supplied.
pub const REASON_NO_PROBE_ENDPOINTS: &str = "no_probe_endpoints";
/// Reason: isolation depends on label policies only.
pub const REASON_LABEL_ONLY: &str = "label_only";
/// Reason: verification never ran because applying failed.
pub const REASON_NOT_APPLIED: &str = "not_applied";
/// Reason: the result comes from a teardown.
pub const REASON_TEARDOWN: &str = "teardown";

/// What verification concluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    /// Isolation confirmed by probes.
    Pass,
    /// Probes contradicted the expected isolation.
    Fail {
        reason: String,
    },
    /// Verification did not run.
    Skipped {
        reason: String,
    },
    /// Probes agreed, but isolation is not enforced by the datapath.
    Degraded {
        reason: String,
    },
}

impl Verification {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Returns true for [`Verification::Pass`].
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail { reason } => write!(f, "fail ({reason})"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Degraded { reason } => write!(f, "degraded ({reason})"),
        }
    }
}

/// Outcome of one `apply` or `teardown`.
///
/// `applied_objects` lists what exists on the target after the invocation:
/// everything created on success, nothing after a complete rollback, and
/// whatever rollback could not remove otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub success: bool,
    /// Final state, `done` or `failed`.
    pub state: EngineState,
    pub applied_objects: Vec<AppliedObject>,
    pub verification: Verification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    /// Rollback and teardown problems that did not change the outcome.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ErrorReport>,
    /// States visited, in order.
    pub transitions: Vec<EngineState>,
}

impl ApplyResult {
    /// Returns the error code, if the invocation failed.
    #[must_use]
    pub fn error_code(&self) -> Option<super::ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
