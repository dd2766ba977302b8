//! The platform-neutral network configuration value.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use super::names::validate_interface;
use super::{Netmask, NetworkConfigError, VlanId};
use crate::cni::{PluginType, Qos};

/// Smallest MTU accepted for IPv4 links.
pub const MIN_MTU: u32 = 68;
/// Largest MTU accepted (jumbo frames).
pub const MAX_MTU: u32 = 9216;

/// How the interface obtains its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// Address, netmask and optional gateway are assigned explicitly.
    #[default]
    Static,
    /// Address is leased from a DHCP server on the segment.
    Dhcp,
}

impl AddressMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dhcp => "dhcp",
        }
    }
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hints that steer how an attachment is realized on cluster platforms.
///
/// Host platforms ignore these.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttachmentHints {
    /// Prefer SR-IOV virtual functions when the cluster supports them.
    #[serde(default)]
    pub hardware_passthrough: bool,
    /// Preferred secondary-network plugin; macvlan when unset.
    #[serde(default)]
    pub plugin: Option<PluginType>,
    /// Bandwidth limits applied to the attachment.
    #[serde(default)]
    pub qos: Option<Qos>,
    /// Treat an already-existing object of the same name as usable instead
    /// of failing. Reused objects are never recorded for rollback.
    #[serde(default)]
    pub reuse_existing: bool,
}

/// A validated, immutable description of one interface on one VLAN.
///
/// Construct with [`NetworkConfig::builder`]; every instance upholds:
/// - `vlan_id` is in `0..=4094`
/// - static addressing carries an address and prefix
/// - a gateway, when present, lies inside the configured subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    interface: String,
    mode: AddressMode,
    address: Option<Ipv4Net>,
    gateway: Option<Ipv4Addr>,
    dns_servers: Vec<IpAddr>,
    vlan_id: VlanId,
    mtu: Option<u32>,
    workload: Option<String>,
    attachment: AttachmentHints,
}

impl NetworkConfig {
    /// Starts a builder for the given physical (parent) interface.
    #[must_use]
    pub fn builder(interface: impl Into<String>) -> NetworkConfigBuilder {
        NetworkConfigBuilder::new(interface)
    }

    /// The physical interface, Windows alias or container parent interface.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// How the address is obtained.
    #[must_use]
    pub const fn mode(&self) -> AddressMode {
        self.mode
    }

    /// Address with prefix, present for static addressing.
    #[must_use]
    pub const fn address(&self) -> Option<Ipv4Net> {
        self.address
    }

    /// The host address without prefix.
    #[must_use]
    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        self.address.map(|net| net.addr())
    }

    /// The netmask in dotted form.
    #[must_use]
    pub fn netmask(&self) -> Option<Ipv4Addr> {
        self.address.map(|net| net.netmask())
    }

    /// The network the address lives in, with host bits cleared.
    #[must_use]
    pub fn subnet(&self) -> Option<Ipv4Net> {
        self.address.map(|net| net.trunc())
    }

    /// Default gateway on this VLAN.
    #[must_use]
    pub const fn gateway(&self) -> Option<Ipv4Addr> {
        self.gateway
    }

    /// DNS resolvers, in preference order.
    #[must_use]
    pub fn dns_servers(&self) -> &[IpAddr] {
        &self.dns_servers
    }

    /// The VLAN this configuration targets.
    #[must_use]
    pub const fn vlan_id(&self) -> VlanId {
        self.vlan_id
    }

    /// Link MTU override.
    #[must_use]
    pub const fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    /// Container id or pod name the attachment belongs to.
    #[must_use]
    pub fn workload(&self) -> Option<&str> {
        self.workload.as_deref()
    }

    /// Attachment hints for cluster platforms.
    #[must_use]
    pub const fn attachment(&self) -> &AttachmentHints {
        &self.attachment
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vlan={} {}", self.interface, self.vlan_id, self.mode)?;
        if let Some(address) = self.address {
            write!(f, " {address}")?;
        }
        if let Some(gateway) = self.gateway {
            write!(f, " via {gateway}")?;
        }
        Ok(())
    }
}

/// Builder for [`NetworkConfig`].
///
/// # Example
///
/// ```
/// use vlan_isolate::network::NetworkConfig;
///
/// let config = NetworkConfig::builder("eth0")
///     .ip_address("192.168.100.10".parse().unwrap())
///     .netmask("255.255.255.0".parse().unwrap())
///     .gateway("192.168.100.1".parse().unwrap())
///     .vlan_id(100)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.address().unwrap().to_string(), "192.168.100.10/24");
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct NetworkConfigBuilder {
    interface: String,
    mode: AddressMode,
    ip_address: Option<Ipv4Addr>,
    netmask: Option<Netmask>,
    gateway: Option<Ipv4Addr>,
    dns_servers: Vec<IpAddr>,
    vlan_id: u32,
    mtu: Option<u32>,
    workload: Option<String>,
    attachment: AttachmentHints,
}

impl NetworkConfigBuilder {
    fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            mode: AddressMode::Static,
            ip_address: None,
            netmask: None,
            gateway: None,
            dns_servers: Vec::new(),
            vlan_id: 0,
            mtu: None,
            workload: None,
            attachment: AttachmentHints::default(),
        }
    }

    /// Sets the address mode (static by default).
    pub const fn mode(mut self, mode: AddressMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the host address.
    pub const fn ip_address(mut self, ip: Ipv4Addr) -> Self {
        self.ip_address = Some(ip);
        self
    }

    /// Sets the netmask.
    pub const fn netmask(mut self, netmask: Netmask) -> Self {
        self.netmask = Some(netmask);
        self
    }

    /// Sets address and netmask together from CIDR notation.
    pub fn cidr(mut self, address: Ipv4Net) -> Self {
        self.ip_address = Some(address.addr());
        self.netmask = Netmask::from_prefix(address.prefix_len()).ok();
        self
    }

    /// Sets the gateway.
    pub const fn gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Appends a DNS server.
    pub fn dns_server(mut self, server: IpAddr) -> Self {
        self.dns_servers.push(server);
        self
    }

    /// Replaces the DNS server list.
    pub fn dns_servers(mut self, servers: impl IntoIterator<Item = IpAddr>) -> Self {
        self.dns_servers = servers.into_iter().collect();
        self
    }

    /// Sets the VLAN id; validated in [`build`](Self::build).
    pub const fn vlan_id(mut self, vlan_id: u32) -> Self {
        self.vlan_id = vlan_id;
        self
    }

    /// Sets the MTU; validated in [`build`](Self::build).
    pub const fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Sets the container id or pod name.
    pub fn workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }

    /// Sets the attachment hints.
    pub fn attachment(mut self, attachment: AttachmentHints) -> Self {
        self.attachment = attachment;
        self
    }

    /// Validates and produces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkConfigError`] when any field violates its invariant.
    pub fn build(self) -> Result<NetworkConfig, NetworkConfigError> {
        validate_interface(&self.interface)?;
        let vlan_id = VlanId::new(self.vlan_id)?;
        let address = self.resolve_address()?;

        if let (Some(gateway), Some(net)) = (self.gateway, address) {
            if !net.trunc().contains(&gateway) {
                return Err(NetworkConfigError::GatewayOutsideSubnet {
                    gateway: gateway.to_string(),
                    subnet: net.trunc().to_string(),
                });
            }
        }
        match self.mtu {
            Some(mtu) if !(MIN_MTU..=MAX_MTU).contains(&mtu) => {
                return Err(NetworkConfigError::InvalidMtu {
                    value: mtu,
                    min: MIN_MTU,
                    max: MAX_MTU,
                });
            }
            _ => {}
        }
        if let Some(qos) = &self.attachment.qos {
            qos.validate()?;
        }
        let workload = match self.workload {
            Some(w) if w.trim().is_empty() => {
                return Err(NetworkConfigError::InvalidName {
                    kind: "workload",
                    value: w,
                    reason: "must not be empty",
                });
            }
            other => other,
        };

        Ok(NetworkConfig {
            interface: self.interface,
            mode: self.mode,
            address,
            gateway: self.gateway,
            dns_servers: self.dns_servers,
            vlan_id,
            mtu: self.mtu,
            workload,
            attachment: self.attachment,
        })
    }

    fn resolve_address(&self) -> Result<Option<Ipv4Net>, NetworkConfigError> {
        let mode = self.mode.as_str();
        match (self.mode, self.ip_address, self.netmask) {
            (_, Some(ip), Some(mask)) => Ipv4Net::new(ip, mask.prefix_len())
                .map(Some)
                .map_err(|_| NetworkConfigError::InvalidNetmask {
                    value: mask.to_string(),
                    reason: "prefix length exceeds 32",
                }),
            (AddressMode::Dhcp, None, None) => Ok(None),
            (_, None, _) => Err(NetworkConfigError::MissingField {
                field: "ip_address",
                mode,
            }),
            (_, Some(_), None) => Err(NetworkConfigError::MissingField {
                field: "netmask",
                mode,
            }),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
