//! CNI plugin detection against a live cluster.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::{CapabilityCache, CniCapabilitySet, CniPlugin};
use crate::exec::{ClusterApi, ObjectRef, ResourceKind};

/// How a plugin shows up in a cluster.
struct Signature {
    plugin: CniPlugin,
    /// Pod label selectors; any running pod matching one is a hit.
    pod_selectors: &'static [&'static str],
    /// Daemon set name prefixes.
    daemonsets: &'static [&'static str],
    /// CRDs installed only by this plugin.
    crds: &'static [&'static str],
}

const SIGNATURES: &[Signature] = &[
    Signature {
        plugin: CniPlugin::Calico,
        pod_selectors: &["k8s-app=calico-node", "projectcalico.org/ds-ready=true"],
        daemonsets: &["calico-node"],
        crds: &["ippools.crd.projectcalico.org"],
    },
    Signature {
        plugin: CniPlugin::Cilium,
        pod_selectors: &["k8s-app=cilium", "app.kubernetes.io/name=cilium-agent"],
        daemonsets: &["cilium"],
        crds: &["ciliumnetworkpolicies.cilium.io"],
    },
    Signature {
        plugin: CniPlugin::Flannel,
        pod_selectors: &["app=flannel", "k8s-app=flannel"],
        daemonsets: &["kube-flannel"],
        crds: &[],
    },
    Signature {
        plugin: CniPlugin::Weave,
        pod_selectors: &["name=weave-net", "app=weave-net"],
        daemonsets: &["weave-net"],
        crds: &[],
    },
    Signature {
        plugin: CniPlugin::Antrea,
        pod_selectors: &["app=antrea", "component=antrea-agent"],
        daemonsets: &["antrea-agent"],
        crds: &["antreaagentinfos.crd.antrea.io"],
    },
    Signature {
        plugin: CniPlugin::Multus,
        pod_selectors: &["app=multus", "name=multus"],
        daemonsets: &["kube-multus"],
        crds: &["network-attachment-definitions.k8s.cni.cncf.io"],
    },
    Signature {
        plugin: CniPlugin::Sriov,
        pod_selectors: &["app=sriov-device-plugin", "app=sriov-cni"],
        daemonsets: &["kube-sriov-device-plugin", "sriov-device-plugin"],
        crds: &[],
    },
];

/// Inspects the cluster and reports which CNI plugins are present.
///
/// Detection is best-effort: a failing probe is logged and counted as
/// "absent", and a cluster running none of the known plugins yields an
/// empty set rather than an error.
pub async fn detect<K: ClusterApi>(cluster: &K) -> CniCapabilitySet {
    let daemonsets = match cluster.list(ResourceKind::DaemonSet, None, None).await {
        Ok(refs) => refs.into_iter().map(|r| r.name).collect(),
        Err(e) => {
            warn!(error = %e, "Listing daemon sets failed; skipping that signature");
            Vec::new()
        }
    };

    let mut plugins = BTreeSet::new();
    for signature in SIGNATURES {
        if matches(cluster, signature, &daemonsets).await {
            plugins.insert(signature.plugin);
        }
    }

    let caps = CniCapabilitySet::from_plugins(plugins);
    info!(plugins = %caps.plugin_names(), "CNI detection finished");
    caps
}

/// Returns the cached capability set, detecting and caching it on a miss.
pub async fn detect_cached<K: ClusterApi>(cluster: &K, cache: &CapabilityCache) -> CniCapabilitySet {
    if let Some(cached) = cache.get() {
        debug!(plugins = %cached.plugin_names(), "Using cached CNI capabilities");
        return cached;
    }
    let fresh = detect(cluster).await;
    cache.store(fresh.clone());
    fresh
}

async fn matches<K: ClusterApi>(cluster: &K, signature: &Signature, daemonsets: &[String]) -> bool {
    let plugin = signature.plugin;

    if let Some(ds) = daemonsets
        .iter()
        .find(|name| signature.daemonsets.iter().any(|p| name.starts_with(p)))
    {
        debug!(%plugin, daemonset = %ds, "Matched daemon set");
        return true;
    }

    for selector in signature.pod_selectors {
        match cluster.list(ResourceKind::Pod, None, Some(selector)).await {
            Ok(pods) if !pods.is_empty() => {
                debug!(%plugin, selector, pods = pods.len(), "Matched pod selector");
                return true;
            }
            Ok(_) => {}
            Err(e) => warn!(%plugin, selector, error = %e, "Pod probe failed; treating as absent"),
        }
    }

    for crd in signature.crds {
        let reference = ObjectRef::cluster_scoped(ResourceKind::CustomResourceDefinition, *crd);
        match cluster.get(&reference).await {
            Ok(Some(_)) => {
                debug!(%plugin, crd, "Matched CRD");
                return true;
            }
            Ok(None) => {}
            Err(e) => warn!(%plugin, crd, error = %e, "CRD probe failed; treating as absent"),
        }
    }

    false
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
