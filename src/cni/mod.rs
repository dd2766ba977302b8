//! CNI plugin detection and attachment building for Kubernetes.
//!
//! This module provides:
//! - Plugin detection against a cluster ([`detect`], [`CniCapabilitySet`])
//! - An explicitly passed capability cache ([`CapabilityCache`])
//! - Attachment selection and rendering ([`AttachmentBuilder`],
//!   [`CniAttachmentSpec`])
//! - Isolation policies ([`IsolationPolicy`])

mod attachment;
mod builder;
mod capability;
mod detect;
mod error;
mod policy;

pub use attachment::{
    AddressRange, AttachmentKind, CNI_VERSION, CniAttachmentSpec, Ipam, IpamKind, IsolationMode,
    PluginType, Qos,
};
pub use builder::AttachmentBuilder;
pub use capability::{CapabilityCache, CniCapabilitySet, CniPlugin};
pub use detect::{detect, detect_cached};
pub use error::CniError;
pub use policy::IsolationPolicy;
