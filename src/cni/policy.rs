//! Isolation policy objects: `NetworkPolicy`, `CiliumNetworkPolicy` and
//! Calico `IPPool`.
//!
//! Every policy expresses the same rule: workloads labeled `vlan-<id>: "true"`
//! may only talk to workloads carrying the same label (plus DNS).

use std::collections::BTreeMap;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use super::CniError;
use super::attachment::{ISOLATION_ANNOTATION, MANAGED_BY_LABEL, VLAN_ANNOTATION};
use crate::exec::{ClusterObject, ObjectRef, ResourceKind};
use crate::network::VlanId;

/// Calico allocation block size for VLAN pools.
pub const CALICO_BLOCK_SIZE: u8 = 26;

/// A policy object derived from an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolationPolicy {
    /// Kubernetes `NetworkPolicy` enforced by the primary CNI.
    NetworkPolicy(KubeNetworkPolicy),
    /// Cilium's own policy type.
    CiliumNetworkPolicy(CiliumNetworkPolicy),
    /// Calico pool reserving an address range for the VLAN.
    CalicoIpPool(CalicoIpPool),
}

impl IsolationPolicy {
    /// Label-based `NetworkPolicy` for `vlan` in `namespace`.
    #[must_use]
    pub fn network_policy(vlan: VlanId, namespace: &str) -> Self {
        let selector = LabelSelector::for_vlan(vlan);
        Self::NetworkPolicy(KubeNetworkPolicy {
            api_version: ResourceKind::NetworkPolicy.api_version().to_string(),
            kind: ResourceKind::NetworkPolicy.kind().to_string(),
            metadata: Metadata::new(format!("vlan-{vlan}-isolation"), Some(namespace), vlan),
            spec: NetworkPolicySpec {
                pod_selector: selector.clone(),
                policy_types: vec!["Ingress".to_string(), "Egress".to_string()],
                ingress: vec![IngressRule {
                    from: vec![PodPeer {
                        pod_selector: selector.clone(),
                    }],
                }],
                egress: vec![
                    EgressRule {
                        to: vec![PodPeer {
                            pod_selector: selector,
                        }],
                        ports: Vec::new(),
                    },
                    EgressRule {
                        to: Vec::new(),
                        ports: vec![
                            PolicyPort::dns("UDP"),
                            PolicyPort::dns("TCP"),
                        ],
                    },
                ],
            },
        })
    }

    /// `CiliumNetworkPolicy` for `vlan` in `namespace`.
    #[must_use]
    pub fn cilium_policy(vlan: VlanId, namespace: &str) -> Self {
        let selector = LabelSelector::for_vlan(vlan);
        let kube_dns = LabelSelector {
            match_labels: [
                ("k8s:io.kubernetes.pod.namespace", "kube-system"),
                ("k8s:k8s-app", "kube-dns"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        };
        Self::CiliumNetworkPolicy(CiliumNetworkPolicy {
            api_version: ResourceKind::CiliumNetworkPolicy.api_version().to_string(),
            kind: ResourceKind::CiliumNetworkPolicy.kind().to_string(),
            metadata: Metadata::new(format!("vlan-{vlan}-policy"), Some(namespace), vlan),
            spec: CiliumPolicySpec {
                endpoint_selector: selector.clone(),
                ingress: vec![CiliumIngressRule {
                    from_endpoints: vec![selector.clone()],
                }],
                egress: vec![
                    CiliumEgressRule {
                        to_endpoints: vec![selector],
                        to_ports: Vec::new(),
                    },
                    CiliumEgressRule {
                        to_endpoints: vec![kube_dns],
                        to_ports: vec![CiliumPortRule {
                            ports: vec![CiliumPort {
                                port: "53".to_string(),
                                protocol: "ANY".to_string(),
                            }],
                        }],
                    },
                ],
            },
        })
    }

    /// Calico `IPPool` dedicating `cidr` to `vlan`.
    #[must_use]
    pub fn calico_pool(vlan: VlanId, cidr: Ipv4Net) -> Self {
        Self::CalicoIpPool(CalicoIpPool {
            api_version: ResourceKind::IpPool.api_version().to_string(),
            kind: ResourceKind::IpPool.kind().to_string(),
            metadata: Metadata::new(format!("vlan-{vlan}-pool"), None, vlan),
            spec: IpPoolSpec {
                cidr: cidr.trunc().to_string(),
                vxlan_mode: "Never".to_string(),
                ipip_mode: "Never".to_string(),
                nat_outgoing: true,
                block_size: CALICO_BLOCK_SIZE.max(cidr.prefix_len()),
                node_selector: format!("{} == 'true'", vlan.label_key()),
                allowed_uses: vec!["Workload".to_string(), "Tunnel".to_string()],
            },
        })
    }

    /// Object name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::NetworkPolicy(p) => &p.metadata.name,
            Self::CiliumNetworkPolicy(p) => &p.metadata.name,
            Self::CalicoIpPool(p) => &p.metadata.name,
        }
    }

    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::NetworkPolicy(_) => ResourceKind::NetworkPolicy,
            Self::CiliumNetworkPolicy(_) => ResourceKind::CiliumNetworkPolicy,
            Self::CalicoIpPool(_) => ResourceKind::IpPool,
        }
    }

    /// Tags the policy with the attachment's isolation mode.
    pub(crate) fn annotate_isolation(&mut self, mode: &str) {
        let metadata = match self {
            Self::NetworkPolicy(p) => &mut p.metadata,
            Self::CiliumNetworkPolicy(p) => &mut p.metadata,
            Self::CalicoIpPool(p) => &mut p.metadata,
        };
        metadata
            .annotations
            .insert(ISOLATION_ANNOTATION.to_string(), mode.to_string());
    }

    /// Renders the object for submission.
    ///
    /// # Errors
    ///
    /// Returns [`CniError::Render`] if serialization fails.
    pub fn to_object(&self) -> Result<ClusterObject, CniError> {
        let (metadata, body) = match self {
            Self::NetworkPolicy(p) => (&p.metadata, serde_json::to_value(p)),
            Self::CiliumNetworkPolicy(p) => (&p.metadata, serde_json::to_value(p)),
            Self::CalicoIpPool(p) => (&p.metadata, serde_json::to_value(p)),
        };
        let body = body.map_err(|source| CniError::Render {
            name: metadata.name.clone(),
            source,
        })?;
        let reference = ObjectRef {
            kind: self.kind(),
            name: metadata.name.clone(),
            namespace: metadata.namespace.clone(),
        };
        Ok(ClusterObject { reference, body })
    }
}

// =============================================================================
// Shared object types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Metadata {
    fn new(name: String, namespace: Option<&str>, vlan: VlanId) -> Self {
        Self {
            name,
            namespace: namespace.map(str::to_string),
            labels: BTreeMap::from([
                (vlan.label_key(), "true".to_string()),
                (MANAGED_BY_LABEL.0.to_string(), MANAGED_BY_LABEL.1.to_string()),
            ]),
            annotations: BTreeMap::from([(VLAN_ANNOTATION.to_string(), vlan.to_string())]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    fn for_vlan(vlan: VlanId) -> Self {
        Self {
            match_labels: BTreeMap::from([(vlan.label_key(), "true".to_string())]),
        }
    }
}

// =============================================================================
// networking.k8s.io/v1 NetworkPolicy
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeNetworkPolicy {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: NetworkPolicySpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    pub pod_selector: LabelSelector,
    pub policy_types: Vec<String>,
    pub ingress: Vec<IngressRule>,
    pub egress: Vec<EgressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub from: Vec<PodPeer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<PodPeer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PolicyPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodPeer {
    pub pod_selector: LabelSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPort {
    pub protocol: String,
    pub port: u16,
}

impl PolicyPort {
    fn dns(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            port: 53,
        }
    }
}

// =============================================================================
// cilium.io/v2 CiliumNetworkPolicy
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumNetworkPolicy {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: CiliumPolicySpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumPolicySpec {
    pub endpoint_selector: LabelSelector,
    pub ingress: Vec<CiliumIngressRule>,
    pub egress: Vec<CiliumEgressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumIngressRule {
    pub from_endpoints: Vec<LabelSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumEgressRule {
    pub to_endpoints: Vec<LabelSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_ports: Vec<CiliumPortRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiliumPortRule {
    pub ports: Vec<CiliumPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiliumPort {
    pub port: String,
    pub protocol: String,
}

// =============================================================================
// projectcalico.org/v3 IPPool
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalicoIpPool {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: IpPoolSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPoolSpec {
    pub cidr: String,
    pub vxlan_mode: String,
    pub ipip_mode: String,
    pub nat_outgoing: bool,
    pub block_size: u8,
    pub node_selector: String,
    pub allowed_uses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlan(id: u32) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn network_policy_selects_same_label_and_allows_dns() {
        let object = IsolationPolicy::network_policy(vlan(100), "lab")
            .to_object()
            .unwrap();

        assert_eq!(
            object.reference,
            ObjectRef::namespaced(ResourceKind::NetworkPolicy, "lab", "vlan-100-isolation")
        );
        let spec = &object.body["spec"];
        assert_eq!(spec["podSelector"]["matchLabels"]["vlan-100"], "true");
        assert_eq!(spec["policyTypes"], serde_json::json!(["Ingress", "Egress"]));
        assert_eq!(
            spec["ingress"][0]["from"][0]["podSelector"]["matchLabels"]["vlan-100"],
            "true"
        );
        assert_eq!(spec["egress"][1]["ports"][0]["port"], 53);
        assert!(spec["egress"][1].get("to").is_none());
        assert_eq!(object.body["apiVersion"], "networking.k8s.io/v1");
    }

    #[test]
    fn cilium_policy_uses_endpoint_selectors() {
        let object = IsolationPolicy::cilium_policy(vlan(200), "lab")
            .to_object()
            .unwrap();

        assert_eq!(object.reference.name, "vlan-200-policy");
        let spec = &object.body["spec"];
        assert_eq!(spec["endpointSelector"]["matchLabels"]["vlan-200"], "true");
        assert_eq!(
            spec["ingress"][0]["fromEndpoints"][0]["matchLabels"]["vlan-200"],
            "true"
        );
        assert_eq!(spec["egress"][1]["toPorts"][0]["ports"][0]["port"], "53");
        assert_eq!(object.body["kind"], "CiliumNetworkPolicy");
    }

    #[test]
    fn calico_pool_is_cluster_scoped_with_defaults() {
        let object = IsolationPolicy::calico_pool(vlan(100), "192.168.100.10/24".parse().unwrap())
            .to_object()
            .unwrap();

        assert_eq!(object.reference.namespace, None);
        assert!(object.body["metadata"].get("namespace").is_none());
        let spec = &object.body["spec"];
        assert_eq!(spec["cidr"], "192.168.100.0/24");
        assert_eq!(spec["vxlanMode"], "Never");
        assert_eq!(spec["ipipMode"], "Never");
        assert_eq!(spec["natOutgoing"], true);
        assert_eq!(spec["blockSize"], 26);
        assert_eq!(spec["nodeSelector"], "vlan-100 == 'true'");
    }

    #[test]
    fn calico_block_never_larger_than_pool() {
        let IsolationPolicy::CalicoIpPool(pool) =
            IsolationPolicy::calico_pool(vlan(5), "10.5.0.0/28".parse().unwrap())
        else {
            panic!("expected pool");
        };
        assert_eq!(pool.spec.block_size, 28);
    }

    #[test]
    fn annotations_carry_vlan_and_mode() {
        let mut policy = IsolationPolicy::network_policy(vlan(7), "ns");
        policy.annotate_isolation("label_only");
        let object = policy.to_object().unwrap();

        let annotations = &object.body["metadata"]["annotations"];
        assert_eq!(annotations[VLAN_ANNOTATION], "7");
        assert_eq!(annotations[ISOLATION_ANNOTATION], "label_only");
        assert_eq!(
            object.body["metadata"]["labels"][MANAGED_BY_LABEL.0],
            MANAGED_BY_LABEL.1
        );
    }
}
