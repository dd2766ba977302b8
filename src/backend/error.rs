//! Error types for platform backends.

use thiserror::Error;

use crate::cni::CniError;
use crate::exec::{ClusterError, ExecError};
use crate::network::PlatformKind;

/// Error type for backend operations.
///
/// Describes what went wrong; the engine decides which taxonomy code it
/// maps to based on the stage it happened in.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The configuration cannot be realized on this platform.
    #[error("invalid configuration for this platform: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A kernel facility the platform needs is unavailable.
    #[error("kernel module '{module}' is not available: {detail}")]
    MissingKernelCapability {
        /// The missing module.
        module: &'static str,
        /// What the probe reported.
        detail: String,
    },

    /// Attachment building failed.
    #[error(transparent)]
    Cni(#[from] CniError),

    /// A command ran but exited non-zero.
    #[error("'{command}' exited with {exit_code}: {stderr}")]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// Its exit code.
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },

    /// A command could not be run at all.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// A cluster API call failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A spec or handle of another platform was passed to this backend.
    #[error("{platform} backend cannot handle {object}")]
    UnexpectedObject {
        /// The backend that received it.
        platform: PlatformKind,
        /// Description of the foreign object.
        object: String,
    },

    /// No backend is registered for the platform.
    #[error("no backend is configured for platform {platform}")]
    NotConfigured {
        /// The requested platform.
        platform: PlatformKind,
    },
}
