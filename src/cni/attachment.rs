//! Attachment specifications and their CNI / `NetworkAttachmentDefinition`
//! rendering.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{CniError, IsolationPolicy};
use crate::exec::{ClusterObject, ObjectRef, ResourceKind};
use crate::network::{NetworkConfigError, VlanId};

/// CNI spec version written into every generated config.
pub const CNI_VERSION: &str = "0.3.1";

/// Label marking objects created by this crate.
pub const MANAGED_BY_LABEL: (&str, &str) = ("app.kubernetes.io/managed-by", "vlan-isolate");

/// Annotation carrying the VLAN id on generated objects.
pub const VLAN_ANNOTATION: &str = "vlan-isolate.io/vlan";

/// Annotation carrying the isolation mode on generated objects.
pub const ISOLATION_ANNOTATION: &str = "vlan-isolate.io/isolation";

/// Secondary-network plugin used for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// MACVLAN in bridge mode on the tagged parent.
    Macvlan,
    /// SR-IOV virtual function.
    Sriov,
    /// Linux bridge.
    Bridge,
    /// IPVLAN in L2 mode.
    Ipvlan,
    /// Open vSwitch bridge port.
    Ovs,
}

impl PluginType {
    /// The CNI `type` field.
    #[must_use]
    pub const fn cni_type(self) -> &'static str {
        match self {
            Self::Macvlan => "macvlan",
            Self::Sriov => "sriov",
            Self::Bridge => "bridge",
            Self::Ipvlan => "ipvlan",
            Self::Ovs => "ovs",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cni_type())
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "macvlan" => Ok(Self::Macvlan),
            "sriov" | "sr-iov" => Ok(Self::Sriov),
            "bridge" => Ok(Self::Bridge),
            "ipvlan" => Ok(Self::Ipvlan),
            "ovs" => Ok(Self::Ovs),
            other => Err(format!("unknown CNI plugin type '{other}'")),
        }
    }
}

/// Bandwidth limits rendered through the CNI `bandwidth` plugin.
///
/// Rates are in bits per second and bursts in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Qos {
    /// Ingress rate limit.
    pub ingress_rate: u64,
    /// Ingress burst size.
    pub ingress_burst: u64,
    /// Egress rate limit.
    pub egress_rate: u64,
    /// Egress burst size.
    pub egress_burst: u64,
}

impl Qos {
    /// Creates limits with bursts equal to one second of traffic.
    #[must_use]
    pub const fn new(ingress_rate: u64, egress_rate: u64) -> Self {
        Self {
            ingress_rate,
            ingress_burst: ingress_rate,
            egress_rate,
            egress_burst: egress_rate,
        }
    }

    /// Rejects zero rates, which the bandwidth plugin treats as "block all".
    ///
    /// # Errors
    ///
    /// Returns [`NetworkConfigError::InvalidQos`] for zero rates or bursts.
    pub const fn validate(&self) -> Result<(), NetworkConfigError> {
        if self.ingress_rate == 0 || self.egress_rate == 0 {
            return Err(NetworkConfigError::InvalidQos {
                reason: "rates must be greater than zero",
            });
        }
        if self.ingress_burst == 0 || self.egress_burst == 0 {
            return Err(NetworkConfigError::InvalidQos {
                reason: "bursts must be greater than zero",
            });
        }
        Ok(())
    }

    fn plugin_config(&self) -> Value {
        json!({
            "type": "bandwidth",
            "ingressRate": self.ingress_rate,
            "ingressBurst": self.ingress_burst,
            "egressRate": self.egress_rate,
            "egressBurst": self.egress_burst,
        })
    }
}

/// How an attachment keeps its VLAN apart from others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Separate L2 segment via 802.1Q tagging (MACVLAN, SR-IOV, ...).
    LinkLayer,
    /// Dedicated Calico IP pool plus a label policy.
    IpPool,
    /// Label policy only; traffic shares the primary network.
    LabelOnly,
    /// No isolation requested (`vlan_id = 0`).
    Flat,
}

impl IsolationMode {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinkLayer => "link_layer",
            Self::IpPool => "ip_pool",
            Self::LabelOnly => "label_only",
            Self::Flat => "flat",
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPAM plugin selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpamKind {
    /// Fixed address from the configuration.
    Static,
    /// DHCP daemon on the node.
    Dhcp,
    /// Node-local allocation from a range.
    HostLocal,
}

/// Inclusive address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    /// First allocatable address.
    pub start: Ipv4Addr,
    /// Last allocatable address.
    pub end: Ipv4Addr,
}

/// IP address management for an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    /// Which IPAM plugin assigns addresses.
    pub kind: IpamKind,
    /// The attachment's subnet.
    pub subnet: Option<Ipv4Net>,
    /// Allocatable range inside the subnet.
    pub range: Option<AddressRange>,
    /// Fixed address with prefix (static IPAM).
    pub address: Option<Ipv4Net>,
    /// Gateway on the subnet.
    pub gateway: Option<Ipv4Addr>,
    /// DNS resolvers.
    pub dns: Vec<IpAddr>,
}

impl Ipam {
    fn to_json(&self) -> Value {
        let mut ipam = Map::new();
        match self.kind {
            IpamKind::Dhcp => {
                ipam.insert("type".into(), json!("dhcp"));
                return Value::Object(ipam);
            }
            IpamKind::Static => {
                ipam.insert("type".into(), json!("static"));
                if let Some(address) = self.address {
                    let mut entry = Map::new();
                    entry.insert("address".into(), json!(address.to_string()));
                    if let Some(gw) = self.gateway {
                        entry.insert("gateway".into(), json!(gw.to_string()));
                    }
                    ipam.insert("addresses".into(), json!([entry]));
                }
            }
            IpamKind::HostLocal => {
                ipam.insert("type".into(), json!("host-local"));
                if let Some(subnet) = self.subnet {
                    ipam.insert("subnet".into(), json!(subnet.to_string()));
                }
                if let Some(range) = self.range {
                    ipam.insert("rangeStart".into(), json!(range.start.to_string()));
                    ipam.insert("rangeEnd".into(), json!(range.end.to_string()));
                }
                if let Some(gw) = self.gateway {
                    ipam.insert("gateway".into(), json!(gw.to_string()));
                }
            }
        }
        if self.gateway.is_some() {
            ipam.insert(
                "routes".into(),
                json!([{ "dst": "0.0.0.0/0" }]),
            );
        }
        if !self.dns.is_empty() {
            let servers: Vec<String> = self.dns.iter().map(ToString::to_string).collect();
            ipam.insert("dns".into(), json!({ "nameservers": servers }));
        }
        Value::Object(ipam)
    }
}

/// Where the attachment lives in the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Extra interface delivered by Multus through a
    /// `NetworkAttachmentDefinition`.
    Secondary,
    /// The pod's primary network; only policies (and pools) are submitted.
    Primary,
}

/// Everything needed to realize one VLAN attachment in a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CniAttachmentSpec {
    /// Object name of the attachment.
    pub name: String,
    /// Namespace the attachment and its policies live in.
    pub namespace: String,
    /// Plugin that realizes the attachment.
    pub plugin_type: PluginType,
    /// Node interface the plugin binds to (or OVS bridge name).
    pub master_interface: String,
    /// VLAN tag.
    pub vlan_id: VlanId,
    /// MTU override.
    pub mtu: Option<u32>,
    /// Address management.
    pub ipam: Ipam,
    /// Bandwidth limits.
    pub qos: Option<Qos>,
    /// How isolation is achieved.
    pub isolation_mode: IsolationMode,
    /// Secondary interface or primary network.
    pub kind: AttachmentKind,
    /// Policies that enforce isolation, applied after the attachment.
    pub policies: Vec<IsolationPolicy>,
}

impl CniAttachmentSpec {
    /// Renders the single-plugin CNI configuration.
    #[must_use]
    pub fn plugin_config(&self) -> Value {
        let mut config = Map::new();
        config.insert("type".into(), json!(self.plugin_type.cni_type()));
        let tagged = self.vlan_id.is_tagged();

        match self.plugin_type {
            PluginType::Macvlan => {
                config.insert("master".into(), json!(self.master_interface));
                config.insert("mode".into(), json!("bridge"));
            }
            PluginType::Sriov => {
                config.insert("deviceID".into(), json!(self.master_interface));
            }
            PluginType::Bridge => {
                config.insert("bridge".into(), json!(format!("br-{}", self.name)));
                config.insert("isGateway".into(), json!(true));
                config.insert("isDefaultGateway".into(), json!(false));
                config.insert("forceAddress".into(), json!(false));
                config.insert("ipMasq".into(), json!(true));
                config.insert("hairpinMode".into(), json!(true));
            }
            PluginType::Ipvlan => {
                // IPVLAN has no tag option; it rides on the tagged sub-interface.
                let master = if tagged {
                    format!("{}.{}", self.master_interface, self.vlan_id)
                } else {
                    self.master_interface.clone()
                };
                config.insert("master".into(), json!(master));
                config.insert("mode".into(), json!("l2"));
            }
            PluginType::Ovs => {
                config.insert("bridge".into(), json!(self.master_interface));
            }
        }
        if tagged && self.plugin_type != PluginType::Ipvlan {
            config.insert("vlan".into(), json!(self.vlan_id.get()));
        }
        if let Some(mtu) = self.mtu {
            config.insert("mtu".into(), json!(mtu));
        }
        config.insert("ipam".into(), self.ipam.to_json());
        Value::Object(config)
    }

    /// Renders the complete CNI configuration.
    ///
    /// Without QoS this is a single plugin config; with QoS it is a conflist
    /// chaining the `bandwidth` plugin after the main plugin.
    #[must_use]
    pub fn cni_config(&self) -> Value {
        let mut main = self.plugin_config();
        match &self.qos {
            None => {
                if let Value::Object(map) = &mut main {
                    map.insert("cniVersion".into(), json!(CNI_VERSION));
                    map.insert("name".into(), json!(self.name));
                }
                main
            }
            Some(qos) => json!({
                "cniVersion": CNI_VERSION,
                "name": self.name,
                "plugins": [main, qos.plugin_config()],
            }),
        }
    }

    /// Label selecting workloads on this VLAN.
    #[must_use]
    pub fn vlan_label(&self) -> (String, String) {
        (self.vlan_id.label_key(), "true".to_string())
    }

    /// Renders the `NetworkAttachmentDefinition`.
    ///
    /// # Errors
    ///
    /// Returns [`CniError::Render`] if the CNI config cannot be serialized.
    pub fn network_attachment(&self) -> Result<ClusterObject, CniError> {
        let config = serde_json::to_string(&self.cni_config()).map_err(|source| CniError::Render {
            name: self.name.clone(),
            source,
        })?;
        let reference = ObjectRef::namespaced(
            ResourceKind::NetworkAttachmentDefinition,
            &self.namespace,
            &self.name,
        );

        let (label_key, label_value) = self.vlan_label();
        let labels: BTreeMap<&str, &str> = [
            (label_key.as_str(), label_value.as_str()),
            MANAGED_BY_LABEL,
        ]
        .into_iter()
        .collect();
        let vlan = self.vlan_id.to_string();
        let annotations: BTreeMap<&str, &str> = [
            (VLAN_ANNOTATION, vlan.as_str()),
            (ISOLATION_ANNOTATION, self.isolation_mode.as_str()),
        ]
        .into_iter()
        .collect();

        let body = json!({
            "apiVersion": ResourceKind::NetworkAttachmentDefinition.api_version(),
            "kind": ResourceKind::NetworkAttachmentDefinition.kind(),
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": labels,
                "annotations": annotations,
            },
            "spec": { "config": config },
        });
        Ok(ClusterObject { reference, body })
    }

    /// Every object to submit, in creation order.
    ///
    /// The attachment (when secondary) comes first so that policies never
    /// reference a network that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`CniError::Render`] if any object cannot be serialized.
    pub fn cluster_objects(&self) -> Result<Vec<ClusterObject>, CniError> {
        let mut objects = Vec::with_capacity(self.policies.len() + 1);
        if self.kind == AttachmentKind::Secondary {
            objects.push(self.network_attachment()?);
        }
        for policy in &self.policies {
            objects.push(policy.to_object()?);
        }
        Ok(objects)
    }
}
