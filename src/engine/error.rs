//! Engine error taxonomy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EngineState;
use crate::backend::BackendError;
use crate::cni::CniError;
use crate::network::NetworkConfigError;

/// Machine-readable failure class reported in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Rejected before any backend call.
    InvalidConfig,
    /// A kernel facility is missing; nothing was applied.
    MissingKernelCapability,
    /// No detected plugin can isolate the VLAN; nothing was applied.
    UnsupportedPlatformCapability,
    /// Creating an object failed or timed out; prior objects rolled back.
    BackendApplyFailure,
    /// Objects were created but isolation could not be confirmed.
    VerificationFailure,
    /// An object could not be removed during rollback or teardown.
    RollbackPartialFailure,
    /// The caller aborted the invocation.
    Cancelled,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfig => "invalid_config",
            Self::MissingKernelCapability => "missing_kernel_capability",
            Self::UnsupportedPlatformCapability => "unsupported_platform_capability",
            Self::BackendApplyFailure => "backend_apply_failure",
            Self::VerificationFailure => "verification_failure",
            Self::RollbackPartialFailure => "rollback_partial_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized form of an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Error type for engine invocations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration cannot be used on the target platform.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BackendError>,
    },

    /// A kernel module is missing on the host.
    #[error("missing kernel capability: {source}")]
    MissingKernelCapability {
        #[source]
        source: BackendError,
    },

    /// The cluster's CNI plugins cannot isolate the VLAN.
    #[error("unsupported platform capability: {source}")]
    UnsupportedPlatformCapability {
        #[source]
        source: BackendError,
    },

    /// Creating an object failed.
    #[error("failed to apply {object}: {source}")]
    BackendApplyFailure {
        /// The object being created.
        object: String,
        #[source]
        source: BackendError,
    },

    /// A backend call did not return in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The call that timed out.
        operation: String,
        /// The configured limit.
        after: Duration,
    },

    /// Isolation could not be confirmed.
    #[error("verification failed: {reason}")]
    VerificationFailure {
        /// What did not hold.
        reason: String,
    },

    /// An object could not be removed.
    #[error("failed to tear down {object}: {source}")]
    RollbackPartialFailure {
        /// The object left behind.
        object: String,
        #[source]
        source: BackendError,
    },

    /// The invocation was cancelled.
    #[error("cancelled before {stage}")]
    Cancelled {
        /// The stage that was about to run.
        stage: EngineState,
    },
}

impl EngineError {
    /// Classifies a failure from a backend's build step.
    ///
    /// Collaborator failures while probing the target (a command that cannot
    /// start, an unreachable cluster) are apply failures with nothing applied.
    #[must_use]
    pub fn from_build(source: BackendError) -> Self {
        match source {
            BackendError::MissingKernelCapability { .. } => {
                Self::MissingKernelCapability { source }
            }
            BackendError::Cni(CniError::UnsupportedPlatformCapability { .. }) => {
                Self::UnsupportedPlatformCapability { source }
            }
            BackendError::InvalidConfig { ref reason } => Self::InvalidConfig {
                reason: reason.clone(),
                source: Some(source),
            },
            BackendError::Cni(_) | BackendError::UnexpectedObject { .. } => Self::InvalidConfig {
                reason: source.to_string(),
                source: Some(source),
            },
            other => Self::BackendApplyFailure {
                object: "build plan".to_string(),
                source: other,
            },
        }
    }

    /// The taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::MissingKernelCapability { .. } => ErrorCode::MissingKernelCapability,
            Self::UnsupportedPlatformCapability { .. } => ErrorCode::UnsupportedPlatformCapability,
            Self::BackendApplyFailure { .. } | Self::Timeout { .. } => {
                ErrorCode::BackendApplyFailure
            }
            Self::VerificationFailure { .. } => ErrorCode::VerificationFailure,
            Self::RollbackPartialFailure { .. } => ErrorCode::RollbackPartialFailure,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// The serializable report for this error.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<NetworkConfigError> for EngineError {
    fn from(source: NetworkConfigError) -> Self {
        Self::InvalidConfig {
            reason: source.to_string(),
            source: None,
        }
    }
}
