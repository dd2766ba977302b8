//! Detected CNI plugins and the capabilities they imply.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// A CNI plugin this crate knows how to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CniPlugin {
    /// Project Calico.
    Calico,
    /// Cilium (eBPF datapath).
    Cilium,
    /// Flannel overlay.
    Flannel,
    /// Weave Net.
    Weave,
    /// Antrea (Open vSwitch datapath).
    Antrea,
    /// Multus meta-plugin (secondary networks).
    Multus,
    /// SR-IOV device plugin and CNI.
    Sriov,
}

impl CniPlugin {
    /// All known plugins, in detection order.
    pub const ALL: [Self; 7] = [
        Self::Calico,
        Self::Cilium,
        Self::Flannel,
        Self::Weave,
        Self::Antrea,
        Self::Multus,
        Self::Sriov,
    ];

    /// Lower-case plugin name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Calico => "calico",
            Self::Cilium => "cilium",
            Self::Flannel => "flannel",
            Self::Weave => "weave",
            Self::Antrea => "antrea",
            Self::Multus => "multus",
            Self::Sriov => "sriov",
        }
    }

    fn apply_to(self, set: &mut CniCapabilitySet) {
        match self {
            // Calico isolates through dedicated IP pools rather than tags.
            Self::Calico => {
                set.vlan_tagging = true;
                set.network_policies = true;
                set.bgp_routing = true;
            }
            Self::Cilium => {
                set.network_policies = true;
                set.ebpf = true;
            }
            Self::Flannel => {}
            Self::Weave | Self::Antrea => set.network_policies = true,
            Self::Multus => {
                set.vlan_tagging = true;
                set.sr_iov = true;
            }
            Self::Sriov => set.sr_iov = true,
        }
    }
}

impl fmt::Display for CniPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the cluster's networking can do, as inferred from its plugins.
///
/// Flags are the union of the capabilities of every detected plugin. The
/// fields are public so tests and callers can describe clusters that no
/// known plugin matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CniCapabilitySet {
    /// Plugins that were detected.
    pub plugins: BTreeSet<CniPlugin>,
    /// Some plugin can place workloads on a tagged or dedicated network.
    pub vlan_tagging: bool,
    /// Some plugin enforces `NetworkPolicy`.
    pub network_policies: bool,
    /// Some plugin routes pod networks over BGP.
    pub bgp_routing: bool,
    /// Some plugin runs an eBPF datapath.
    pub ebpf: bool,
    /// SR-IOV virtual functions can be attached.
    pub sr_iov: bool,
}

impl CniCapabilitySet {
    /// Builds the set implied by the given plugins.
    #[must_use]
    pub fn from_plugins(plugins: impl IntoIterator<Item = CniPlugin>) -> Self {
        let mut set = Self::default();
        for plugin in plugins {
            plugin.apply_to(&mut set);
            set.plugins.insert(plugin);
        }
        set
    }

    /// Returns true if the plugin was detected.
    #[must_use]
    pub fn has(&self, plugin: CniPlugin) -> bool {
        self.plugins.contains(&plugin)
    }

    /// Returns true if nothing was detected and no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns true if some form of VLAN or label isolation is possible.
    #[must_use]
    pub const fn supports_isolation(&self) -> bool {
        self.vlan_tagging || self.network_policies
    }

    /// Comma-separated detected plugin names, or `none`.
    #[must_use]
    pub fn plugin_names(&self) -> String {
        if self.plugins.is_empty() {
            return "none".to_string();
        }
        self.plugins
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Read-mostly cache for a detected capability set.
///
/// Detection is never performed while the lock is held: callers detect,
/// then [`store`](Self::store) replaces the whole value. Readers therefore
/// see either the previous set or the new one, never a partial update.
/// The cache is passed explicitly to whoever needs it and must be
/// [`invalidate`](Self::invalidate)d when the cluster's plugins change.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    inner: RwLock<Option<CniCapabilitySet>>,
}

impl CapabilityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached set, if any.
    #[must_use]
    pub fn get(&self) -> Option<CniCapabilitySet> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the cached set.
    pub fn store(&self, set: CniCapabilitySet) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(set);
    }

    /// Drops the cached set so the next lookup detects again.
    pub fn invalidate(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("Capability cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_supports_nothing() {
        let set = CniCapabilitySet::default();
        assert!(set.is_empty());
        assert!(!set.supports_isolation());
        assert_eq!(set.plugin_names(), "none");
    }

    #[test]
    fn flags_are_union_of_plugins() {
        let set = CniCapabilitySet::from_plugins([CniPlugin::Cilium, CniPlugin::Multus]);

        assert!(set.network_policies);
        assert!(set.ebpf);
        assert!(set.vlan_tagging);
        assert!(set.sr_iov);
        assert!(!set.bgp_routing);
        assert_eq!(set.plugin_names(), "cilium,multus");
    }

    #[test]
    fn flannel_alone_cannot_isolate() {
        let set = CniCapabilitySet::from_plugins([CniPlugin::Flannel]);
        assert!(!set.is_empty());
        assert!(!set.supports_isolation());
    }

    #[test]
    fn calico_brings_bgp_and_policies() {
        let set = CniCapabilitySet::from_plugins([CniPlugin::Calico]);
        assert!(set.bgp_routing && set.network_policies && set.vlan_tagging);
    }

    #[test]
    fn serializes_plugins_by_name() {
        let set = CniCapabilitySet::from_plugins([CniPlugin::Weave]);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["plugins"], serde_json::json!(["weave"]));
        assert_eq!(json["network_policies"], true);
    }

    mod cache {
        use super::*;

        #[test]
        fn starts_empty() {
            assert!(CapabilityCache::new().get().is_none());
        }

        #[test]
        fn store_replaces_and_invalidate_clears() {
            let cache = CapabilityCache::new();
            cache.store(CniCapabilitySet::from_plugins([CniPlugin::Calico]));
            cache.store(CniCapabilitySet::from_plugins([CniPlugin::Cilium]));

            let got = cache.get().unwrap();
            assert!(got.has(CniPlugin::Cilium));
            assert!(!got.has(CniPlugin::Calico));

            cache.invalidate();
            assert!(cache.get().is_none());
        }
    }
}
