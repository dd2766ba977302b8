use thiserror::Error;

use crate::exec::ExecError;

/// Error type for a single reachability probe.
///
/// A probe error means the attempt was inconclusive: nothing is known about
/// reachability, as opposed to a probe that ran and got no reply.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe command could not be run.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The probe ran but failed for a reason other than "no reply".
    #[error("probe '{command}' failed with {exit_code}: {stderr}")]
    Failed {
        /// Rendered probe command.
        command: String,
        /// Exit code.
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },
}
