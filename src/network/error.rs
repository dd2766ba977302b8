//! Validation errors for network configuration values.

use thiserror::Error;

/// Error raised when a [`NetworkConfig`](super::NetworkConfig) or one of its
/// component values fails validation.
///
/// Every variant maps to the `InvalidConfig` error code at the engine level.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkConfigError {
    /// VLAN identifier outside `0..=4094`.
    #[error("VLAN id {value} is out of range (expected 0..=4094)")]
    VlanOutOfRange {
        /// The rejected value.
        value: u32,
    },

    /// Netmask that is neither a prefix length nor a contiguous dotted mask.
    #[error("invalid netmask '{value}': {reason}")]
    InvalidNetmask {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Address text that does not parse.
    #[error("invalid {field} '{value}'")]
    InvalidAddress {
        /// Which field held the address.
        field: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A field required by the chosen address mode is missing.
    #[error("{field} is required for {mode} addressing")]
    MissingField {
        /// The missing field.
        field: &'static str,
        /// The address mode that requires it.
        mode: &'static str,
    },

    /// Gateway that lies outside the configured subnet.
    #[error("gateway {gateway} is not inside subnet {subnet}")]
    GatewayOutsideSubnet {
        /// The configured gateway.
        gateway: String,
        /// The configured subnet.
        subnet: String,
    },

    /// Name that does not satisfy the naming rules for its kind.
    #[error("invalid {kind} name '{value}': {reason}")]
    InvalidName {
        /// What kind of name (interface, workload, object).
        kind: &'static str,
        /// The rejected name.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// MTU outside the accepted range.
    #[error("MTU {value} is out of range ({min}..={max})")]
    InvalidMtu {
        /// The rejected value.
        value: u32,
        /// Minimum accepted MTU.
        min: u32,
        /// Maximum accepted MTU.
        max: u32,
    },

    /// Quality-of-service limits that cannot be rendered.
    #[error("invalid QoS: {reason}")]
    InvalidQos {
        /// Why the limits were rejected.
        reason: &'static str,
    },
}
