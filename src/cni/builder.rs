//! Chooses and assembles the attachment for a configuration.

use tracing::{debug, warn};

use super::{
    AddressRange, AttachmentKind, CniAttachmentSpec, CniCapabilitySet, CniError, CniPlugin, Ipam,
    IpamKind, IsolationMode, IsolationPolicy, PluginType,
};
use crate::network::names::{sanitize_object_name, validate_object_name};
use crate::network::{AddressMode, NetworkConfig};

/// Builds [`CniAttachmentSpec`]s for one namespace.
///
/// Selection priority:
/// 1. Multus with hardware passthrough requested: SR-IOV
/// 2. Multus: the preferred plugin, MACVLAN otherwise
/// 3. Calico without Multus: dedicated IP pool plus a label policy
/// 4. Any policy-enforcing CNI: bridge with the VLAN as a label only
///
/// Untagged configurations never fail on capability and carry no policy.
#[derive(Debug, Clone)]
pub struct AttachmentBuilder {
    namespace: String,
}

struct Choice {
    plugin: PluginType,
    mode: IsolationMode,
    kind: AttachmentKind,
}

impl AttachmentBuilder {
    /// Creates a builder for `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Namespace attachments are created in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Checks the namespace and the derived attachment name.
    ///
    /// # Errors
    ///
    /// Returns [`CniError::InvalidName`] when either is not DNS-1123.
    pub fn validate(&self, config: &NetworkConfig) -> Result<(), CniError> {
        validate_object_name(&self.namespace)?;
        validate_object_name(&Self::attachment_name(config))?;
        Ok(())
    }

    /// Builds the attachment for `config` given the cluster's capabilities.
    ///
    /// # Errors
    ///
    /// - [`CniError::UnsupportedPlatformCapability`] when a tagged VLAN is
    ///   requested and no detected plugin can isolate it
    /// - [`CniError::MissingSubnet`] when IP-pool isolation is chosen for a
    ///   DHCP configuration
    /// - [`CniError::InvalidName`] when the derived names are not DNS-1123
    pub fn build(
        &self,
        config: &NetworkConfig,
        caps: &CniCapabilitySet,
    ) -> Result<CniAttachmentSpec, CniError> {
        self.validate(config)?;
        let choice = Self::choose(config, caps)?;
        let name = Self::attachment_name(config);

        let vlan = config.vlan_id();
        let mut policies = match choice.mode {
            IsolationMode::LinkLayer | IsolationMode::Flat => Vec::new(),
            IsolationMode::IpPool => {
                let subnet = config.subnet().ok_or(CniError::MissingSubnet {
                    vlan_id: vlan,
                    mode: IsolationMode::IpPool.as_str(),
                })?;
                vec![
                    IsolationPolicy::calico_pool(vlan, subnet),
                    IsolationPolicy::network_policy(vlan, &self.namespace),
                ]
            }
            IsolationMode::LabelOnly => {
                if caps.has(CniPlugin::Cilium) {
                    vec![IsolationPolicy::cilium_policy(vlan, &self.namespace)]
                } else {
                    vec![IsolationPolicy::network_policy(vlan, &self.namespace)]
                }
            }
        };
        for policy in &mut policies {
            policy.annotate_isolation(choice.mode.as_str());
        }

        if choice.mode == IsolationMode::LabelOnly {
            warn!(
                vlan = %vlan,
                plugins = %caps.plugin_names(),
                "VLAN is expressed as a label only; isolation depends on policy enforcement"
            );
        }
        debug!(
            name = %name,
            plugin = %choice.plugin,
            mode = %choice.mode,
            policies = policies.len(),
            "Attachment built"
        );

        Ok(CniAttachmentSpec {
            name,
            namespace: self.namespace.clone(),
            plugin_type: choice.plugin,
            master_interface: config.interface().to_string(),
            vlan_id: vlan,
            mtu: config.mtu(),
            ipam: Self::ipam(config, choice.plugin),
            qos: config.attachment().qos,
            isolation_mode: choice.mode,
            kind: choice.kind,
            policies,
        })
    }

    fn choose(config: &NetworkConfig, caps: &CniCapabilitySet) -> Result<Choice, CniError> {
        let tagged = config.vlan_id().is_tagged();
        let hints = config.attachment();
        let tagged_or_flat = |mode| if tagged { mode } else { IsolationMode::Flat };

        if caps.has(CniPlugin::Multus) {
            let plugin = if hints.hardware_passthrough {
                if !caps.sr_iov {
                    warn!("Hardware passthrough requested but no SR-IOV support detected");
                }
                PluginType::Sriov
            } else {
                hints.plugin.unwrap_or(PluginType::Macvlan)
            };
            return Ok(Choice {
                plugin,
                mode: tagged_or_flat(IsolationMode::LinkLayer),
                kind: AttachmentKind::Secondary,
            });
        }
        if caps.has(CniPlugin::Calico) {
            return Ok(Choice {
                plugin: PluginType::Bridge,
                mode: tagged_or_flat(IsolationMode::IpPool),
                kind: AttachmentKind::Primary,
            });
        }
        if !tagged {
            return Ok(Choice {
                plugin: PluginType::Bridge,
                mode: IsolationMode::Flat,
                kind: AttachmentKind::Primary,
            });
        }
        if caps.network_policies {
            return Ok(Choice {
                plugin: PluginType::Bridge,
                mode: IsolationMode::LabelOnly,
                kind: AttachmentKind::Primary,
            });
        }
        Err(CniError::UnsupportedPlatformCapability {
            vlan_id: config.vlan_id(),
            detected: caps.plugin_names(),
        })
    }

    fn attachment_name(config: &NetworkConfig) -> String {
        let base = if config.vlan_id().is_tagged() {
            format!("vlan-{}", config.vlan_id())
        } else {
            format!("flat-{}", config.interface())
        };
        match config.workload() {
            Some(workload) => sanitize_object_name(&format!("{base}-{workload}")),
            None => sanitize_object_name(&base),
        }
    }

    fn ipam(config: &NetworkConfig, plugin: PluginType) -> Ipam {
        let dns = config.dns_servers().to_vec();
        match (config.mode(), config.address()) {
            (AddressMode::Static, Some(address)) if plugin == PluginType::Bridge => Ipam {
                kind: IpamKind::HostLocal,
                subnet: Some(address.trunc()),
                range: Some(AddressRange {
                    start: address.addr(),
                    end: address.addr(),
                }),
                address: Some(address),
                gateway: config.gateway(),
                dns,
            },
            (AddressMode::Static, Some(address)) => Ipam {
                kind: IpamKind::Static,
                subnet: Some(address.trunc()),
                range: None,
                address: Some(address),
                gateway: config.gateway(),
                dns,
            },
            _ => Ipam {
                kind: IpamKind::Dhcp,
                subnet: None,
                range: None,
                address: None,
                gateway: None,
                dns,
            },
        }
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
