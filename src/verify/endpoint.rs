//! Probe endpoints.

use std::fmt;
use std::net::IpAddr;

use crate::backend::ContainerRuntime;
use crate::network::VlanId;

/// Where probes from an endpoint are launched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProbeVia {
    /// From the host running this process.
    #[default]
    Local,
    /// Inside a container, through the runtime's `exec`.
    Container {
        /// Runtime CLI to use.
        runtime: ContainerRuntime,
        /// Container id or name.
        container: String,
    },
    /// Inside a pod, through `kubectl exec`.
    Pod {
        /// Pod namespace.
        namespace: String,
        /// Pod name.
        pod: String,
    },
}

/// A reachable address on a VLAN that probes can start from or aim at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Unique name within a scenario.
    pub name: String,
    /// Address probed when this endpoint is the target.
    pub address: IpAddr,
    /// VLAN the endpoint sits on.
    pub vlan_id: VlanId,
    /// Where probes from this endpoint run.
    pub via: ProbeVia,
}

impl Endpoint {
    /// Creates an endpoint probed from the local host.
    pub fn new(name: impl Into<String>, address: IpAddr, vlan_id: VlanId) -> Self {
        Self {
            name: name.into(),
            address,
            vlan_id,
            via: ProbeVia::Local,
        }
    }

    /// Launches probes from `via` instead of the local host.
    #[must_use]
    pub fn via(mut self, via: ProbeVia) -> Self {
        self.via = via;
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, vlan {})", self.name, self.address, self.vlan_id)
    }
}
