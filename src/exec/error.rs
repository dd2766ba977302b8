//! Error types for command execution and cluster access.

use thiserror::Error;

use super::ObjectRef;

/// Error type for running commands and moving files.
///
/// Describes what went wrong without dictating recovery strategy. A command
/// that runs and exits non-zero is not an error at this layer; callers
/// inspect [`CommandOutput::success`](super::CommandOutput::success).
#[derive(Debug, Error)]
pub enum ExecError {
    /// The program could not be started.
    ///
    /// Typically the binary is missing from `PATH` or is not executable.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failed while talking to a running process.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What was being done.
        context: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file transfer failed.
    #[error("Failed to transfer '{from}' to '{to}': {source}")]
    Transfer {
        /// Source path.
        from: String,
        /// Destination path.
        to: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Error type for cluster API operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// An object with the same name already exists.
    #[error("{reference} already exists")]
    AlreadyExists {
        /// The conflicting object.
        reference: ObjectRef,
    },

    /// The API server rejected the request.
    #[error("Cluster {operation} failed: {message}")]
    Api {
        /// Which operation failed (create, get, list, delete).
        operation: &'static str,
        /// The server's message.
        message: String,
    },

    /// The API response could not be decoded.
    #[error("Failed to decode {operation} response: {source}")]
    Decode {
        /// Which operation produced the response.
        operation: &'static str,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The client process itself failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}
