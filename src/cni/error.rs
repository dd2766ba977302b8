//! Error types for attachment building.

use thiserror::Error;

use crate::network::VlanId;

/// Error raised while turning a configuration into an attachment.
#[derive(Debug, Error)]
pub enum CniError {
    /// No detected plugin can tag or label-isolate a VLAN.
    #[error(
        "no detected CNI plugin can isolate VLAN {vlan_id} (detected: {detected}); \
         install Multus or a policy-enforcing CNI"
    )]
    UnsupportedPlatformCapability {
        /// The VLAN that could not be isolated.
        vlan_id: VlanId,
        /// Comma-separated names of detected plugins.
        detected: String,
    },

    /// The chosen isolation mode needs a subnet the configuration lacks.
    #[error("{mode} isolation for VLAN {vlan_id} needs a static address to derive the subnet")]
    MissingSubnet {
        /// The VLAN being built.
        vlan_id: VlanId,
        /// The isolation mode that needs the subnet.
        mode: &'static str,
    },

    /// A generated name breaks Kubernetes naming rules.
    #[error(transparent)]
    InvalidName(#[from] crate::network::NetworkConfigError),

    /// An object could not be serialized.
    #[error("failed to render {name}: {source}")]
    Render {
        /// Object name.
        name: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
