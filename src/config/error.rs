//! Error types for scenario parsing and validation.

use std::path::PathBuf;

use thiserror::Error;

use crate::network::NetworkConfigError;

/// Error type for configuration operations.
///
/// Covers errors from parsing, validation, and file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the scenario file.
    #[error("Failed to read scenario file '{}': {source}", path.display())]
    FileRead {
        /// Path to the scenario file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the TOML scenario.
    #[error("Failed to parse TOML scenario: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to write the scenario file (for init command).
    #[error("Failed to write scenario file '{}': {source}", path.display())]
    FileWrite {
        /// Path to the scenario file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Missing required field that must be provided by CLI or scenario file.
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired {
        /// Name of the missing field
        field: &'static str,
        /// Hint for how to provide the value
        hint: &'static str,
    },

    /// A field holds a value that cannot be parsed.
    #[error("Invalid {field} '{value}': {reason}")]
    InvalidValue {
        /// Name of the field
        field: &'static str,
        /// The offending value
        value: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Invalid duration value (zero).
    #[error("Invalid duration for {field}: {reason}")]
    InvalidDuration {
        /// Name of the field
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// An endpoint does not form a valid network configuration.
    #[error("Invalid endpoint '{name}': {source}")]
    InvalidEndpoint {
        /// Endpoint name
        name: String,
        /// Underlying validation error
        #[source]
        source: NetworkConfigError,
    },

    /// Two endpoints share a name.
    #[error("Duplicate endpoint name '{name}'")]
    DuplicateEndpoint {
        /// The repeated name
        name: String,
    },

    /// A test references an endpoint that cannot be probed.
    #[error("Test {index} references endpoint '{name}': {reason}")]
    InvalidTest {
        /// Zero-based position in the test list
        index: usize,
        /// Referenced endpoint name
        name: String,
        /// Why the reference is unusable
        reason: &'static str,
    },
}

/// Well-known field names for `MissingRequired` errors.
pub mod field {
    /// The target platform.
    pub const PLATFORM: &str = "platform";
    /// The endpoint list.
    pub const ENDPOINTS: &str = "endpoints";
    /// The state file path.
    pub const STATE_FILE: &str = "state_file";
}

impl ConfigError {
    /// Creates a `MissingRequired` error for a required field.
    #[must_use]
    pub const fn missing(field: &'static str, hint: &'static str) -> Self {
        Self::MissingRequired { field, hint }
    }

    pub(crate) fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
