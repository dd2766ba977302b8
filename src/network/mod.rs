//! Platform-neutral network configuration types.
//!
//! This module provides:
//! - The validated configuration value ([`NetworkConfig`])
//! - VLAN identifiers and netmask parsing ([`VlanId`], [`Netmask`])
//! - Target platform identifiers ([`PlatformKind`])
//! - Name validation helpers ([`names`])

mod config;
mod error;
pub mod names;
mod platform;
mod vlan;

pub use config::{
    AddressMode, AttachmentHints, MAX_MTU, MIN_MTU, NetworkConfig, NetworkConfigBuilder,
};
pub use error::NetworkConfigError;
pub use platform::PlatformKind;
pub use vlan::{MAX_VLAN_ID, Netmask, VlanId};
