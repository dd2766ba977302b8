//! Platform backends.
//!
//! Every platform implements the same four-step [`Backend`] contract:
//! `build` a plan, `apply_one` object at a time (recording each creation
//! immediately), `verify` the recorded handles and `teardown_one` handle
//! at a time. [`PlatformBackend`] dispatches over the concrete adapters by
//! [`PlatformKind`].

mod container;
mod error;
mod kubernetes;
mod linux;
mod windows;

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

pub use container::{ContainerBackend, ContainerRuntime};
pub use error::BackendError;
pub use kubernetes::KubernetesBackend;
pub use linux::{LinuxBackend, VLAN_MODULE};
pub use windows::{PLATFORM_NO_VLAN_SUPPORT, WindowsBackend};

use crate::exec::{ClusterApi, ClusterObject, Command, CommandExecutor, CommandOutput, ObjectRef};
use crate::network::{NetworkConfig, PlatformKind, VlanId};

/// How an interface receives its address on a host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressAssignment {
    /// Fixed address and optional default gateway.
    Static {
        /// Address with prefix.
        address: Ipv4Net,
        /// Default gateway.
        gateway: Option<Ipv4Addr>,
    },
    /// DHCP lease.
    Dhcp,
}

impl AddressAssignment {
    /// Derives the assignment from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidConfig`] if a static configuration
    /// somehow lacks an address.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, BackendError> {
        match config.mode() {
            crate::network::AddressMode::Dhcp => Ok(Self::Dhcp),
            crate::network::AddressMode::Static => config
                .address()
                .map(|address| Self::Static {
                    address,
                    gateway: config.gateway(),
                })
                .ok_or_else(|| BackendError::InvalidConfig {
                    reason: "static addressing without an address".to_string(),
                }),
        }
    }
}

/// Tagged Linux sub-interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanLinkSpec {
    /// Physical parent interface.
    pub parent: String,
    /// Sub-interface name (`<parent>.<vlan>`).
    pub name: String,
    /// 802.1Q tag.
    pub vlan_id: VlanId,
    /// MTU override.
    pub mtu: Option<u32>,
    /// Address assignment on the new link.
    pub assignment: AddressAssignment,
}

/// Address placed directly on an existing interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddressSpec {
    /// Interface name or Windows alias.
    pub interface: String,
    /// Address assignment.
    pub assignment: AddressAssignment,
    /// DNS servers (Windows only).
    pub dns_servers: Vec<IpAddr>,
}

/// Container-runtime MACVLAN network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNetworkSpec {
    /// Network name.
    pub name: String,
    /// Host parent interface (the VLAN sub-interface when tagged).
    pub parent: String,
    /// Network subnet.
    pub subnet: Ipv4Net,
    /// Network gateway.
    pub gateway: Option<Ipv4Addr>,
}

/// Attachment of a container to a network with a fixed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAttachmentSpec {
    /// Network name.
    pub network: String,
    /// Container id or name.
    pub container: String,
    /// Address inside the network.
    pub address: Ipv4Addr,
}

/// One object a backend will create.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendObjectSpec {
    /// Linux VLAN sub-interface.
    VlanLink(VlanLinkSpec),
    /// Address on a Linux interface.
    LinuxAddress(HostAddressSpec),
    /// Address binding on a Windows interface alias.
    WindowsAddress(HostAddressSpec),
    /// Container MACVLAN network.
    ContainerNetwork(ContainerNetworkSpec),
    /// Container attached to a network.
    ContainerAttachment(ContainerAttachmentSpec),
    /// Cluster object.
    ClusterObject {
        /// The rendered object.
        object: ClusterObject,
        /// Accept a pre-existing object with the same name.
        reuse_existing: bool,
    },
}

impl fmt::Display for BackendObjectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VlanLink(s) => write!(f, "vlan link {}", s.name),
            Self::LinuxAddress(s) | Self::WindowsAddress(s) => {
                write!(f, "address on {}", s.interface)
            }
            Self::ContainerNetwork(s) => write!(f, "container network {}", s.name),
            Self::ContainerAttachment(s) => {
                write!(f, "attachment of {} to {}", s.container, s.network)
            }
            Self::ClusterObject { object, .. } => write!(f, "{}", object.reference),
        }
    }
}

/// Identifies a created object so it can be verified and torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendHandle {
    /// Linux VLAN sub-interface.
    LinuxLink {
        /// Link name.
        name: String,
    },
    /// Address on a Linux interface.
    LinuxAddress {
        /// Interface name.
        interface: String,
        /// Address with prefix.
        address: Ipv4Net,
    },
    /// DHCP client on a Linux interface.
    LinuxDhcp {
        /// Interface name.
        interface: String,
    },
    /// Address on a Windows interface alias.
    WindowsAddress {
        /// Interface alias.
        alias: String,
        /// Address with prefix.
        address: Ipv4Net,
        /// Gateway route added with the address.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gateway: Option<Ipv4Addr>,
    },
    /// DHCP enabled on a Windows interface alias.
    WindowsDhcp {
        /// Interface alias.
        alias: String,
    },
    /// Container runtime network.
    ContainerNetwork {
        /// Network name.
        name: String,
    },
    /// Container attached to a network.
    ContainerAttachment {
        /// Network name.
        network: String,
        /// Container id or name.
        container: String,
    },
    /// Cluster object.
    ClusterObject {
        /// Object reference.
        reference: ObjectRef,
    },
}

impl BackendHandle {
    /// The platform that owns this handle.
    #[must_use]
    pub const fn platform(&self) -> PlatformKind {
        match self {
            Self::LinuxLink { .. } | Self::LinuxAddress { .. } | Self::LinuxDhcp { .. } => {
                PlatformKind::Linux
            }
            Self::WindowsAddress { .. } | Self::WindowsDhcp { .. } => PlatformKind::Windows,
            Self::ContainerNetwork { .. } | Self::ContainerAttachment { .. } => {
                PlatformKind::Container
            }
            Self::ClusterObject { .. } => PlatformKind::Kubernetes,
        }
    }
}

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinuxLink { name } => write!(f, "link {name}"),
            Self::LinuxAddress { interface, address } => write!(f, "{address} on {interface}"),
            Self::LinuxDhcp { interface } => write!(f, "dhcp on {interface}"),
            Self::WindowsAddress { alias, address, .. } => write!(f, "{address} on '{alias}'"),
            Self::WindowsDhcp { alias } => write!(f, "dhcp on '{alias}'"),
            Self::ContainerNetwork { name } => write!(f, "network {name}"),
            Self::ContainerAttachment { network, container } => {
                write!(f, "{container} on {network}")
            }
            Self::ClusterObject { reference } => write!(f, "{reference}"),
        }
    }
}

/// A handle together with the target it was applied to.
///
/// The target interface is what per-target locking is keyed on, so teardown
/// can serialize against applies on the same interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedObject {
    /// Interface from the configuration that produced this object.
    pub interface: String,
    /// The created object.
    pub handle: BackendHandle,
}

impl AppliedObject {
    /// The platform that owns the object.
    #[must_use]
    pub const fn platform(&self) -> PlatformKind {
        self.handle.platform()
    }
}

/// Appends created objects to an invocation's list as they happen.
pub struct ObjectRecorder<'a> {
    interface: &'a str,
    objects: &'a mut Vec<AppliedObject>,
}

impl<'a> ObjectRecorder<'a> {
    /// Creates a recorder appending to `objects`.
    pub const fn new(interface: &'a str, objects: &'a mut Vec<AppliedObject>) -> Self {
        Self { interface, objects }
    }

    /// Records one created object.
    pub fn record(&mut self, handle: BackendHandle) {
        tracing::debug!(object = %handle, "Recorded for rollback");
        self.objects.push(AppliedObject {
            interface: self.interface.to_string(),
            handle,
        });
    }
}

/// Whether a plan's isolation can be verified, and how strongly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationSupport {
    /// Traffic separation is enforced by the datapath.
    Enforced,
    /// Separation relies on label policies only.
    LabelOnly,
    /// The platform cannot separate VLANs; isolation is not verified.
    Unsupported {
        /// Machine-readable reason.
        reason: &'static str,
    },
}

/// The ordered objects a backend will create for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    /// Objects in creation order.
    pub objects: Vec<BackendObjectSpec>,
    /// How isolation can be verified afterwards.
    pub isolation: IsolationSupport,
}

/// Contract every platform adapter implements.
pub trait Backend: Send + Sync {
    /// The platform this backend serves.
    fn kind(&self) -> PlatformKind;

    /// Validates the configuration against the platform and produces the
    /// plan. Must not mutate the target.
    fn build(
        &self,
        config: &NetworkConfig,
    ) -> impl Future<Output = Result<BuildPlan, BackendError>> + Send;

    /// Creates one planned object, recording every created handle as soon
    /// as it exists.
    fn apply_one(
        &self,
        spec: &BackendObjectSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Returns true if every handle is present on the target.
    fn verify(
        &self,
        handles: &[BackendHandle],
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// Removes one object. Already-absent objects are success.
    fn teardown_one(
        &self,
        handle: &BackendHandle,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// One backend per platform, dispatched by variant.
#[derive(Debug)]
pub enum PlatformBackend<E, K> {
    /// Linux host.
    Linux(LinuxBackend<E>),
    /// Windows host.
    Windows(WindowsBackend<E>),
    /// Container runtime.
    Container(ContainerBackend<E>),
    /// Kubernetes cluster.
    Kubernetes(KubernetesBackend<K>),
}

impl<E: CommandExecutor, K: ClusterApi> Backend for PlatformBackend<E, K> {
    fn kind(&self) -> PlatformKind {
        match self {
            Self::Linux(_) => PlatformKind::Linux,
            Self::Windows(_) => PlatformKind::Windows,
            Self::Container(_) => PlatformKind::Container,
            Self::Kubernetes(_) => PlatformKind::Kubernetes,
        }
    }

    async fn build(&self, config: &NetworkConfig) -> Result<BuildPlan, BackendError> {
        match self {
            Self::Linux(b) => b.build(config).await,
            Self::Windows(b) => b.build(config).await,
            Self::Container(b) => b.build(config).await,
            Self::Kubernetes(b) => b.build(config).await,
        }
    }

    async fn apply_one(
        &self,
        spec: &BackendObjectSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        match self {
            Self::Linux(b) => b.apply_one(spec, recorder).await,
            Self::Windows(b) => b.apply_one(spec, recorder).await,
            Self::Container(b) => b.apply_one(spec, recorder).await,
            Self::Kubernetes(b) => b.apply_one(spec, recorder).await,
        }
    }

    async fn verify(&self, handles: &[BackendHandle]) -> Result<bool, BackendError> {
        match self {
            Self::Linux(b) => b.verify(handles).await,
            Self::Windows(b) => b.verify(handles).await,
            Self::Container(b) => b.verify(handles).await,
            Self::Kubernetes(b) => b.verify(handles).await,
        }
    }

    async fn teardown_one(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        match self {
            Self::Linux(b) => b.teardown_one(handle).await,
            Self::Windows(b) => b.teardown_one(handle).await,
            Self::Container(b) => b.teardown_one(handle).await,
            Self::Kubernetes(b) => b.teardown_one(handle).await,
        }
    }
}

/// Runs a command and turns a non-zero exit into [`BackendError::CommandFailed`].
async fn run_checked<E: CommandExecutor>(
    executor: &E,
    command: &Command,
) -> Result<CommandOutput, BackendError> {
    let output = executor.execute(command).await?;
    if output.success() {
        return Ok(output);
    }
    Err(BackendError::CommandFailed {
        command: command.to_string(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    })
}

/// Runs a removal command, treating any of `absent` in the output as
/// "already gone". Returns whether something was actually removed.
async fn run_removal<E: CommandExecutor>(
    executor: &E,
    command: &Command,
    absent: &[&str],
) -> Result<bool, BackendError> {
    let output = executor.execute(command).await?;
    if output.success() {
        return Ok(true);
    }
    if output.mentions_any(absent) {
        tracing::debug!(command = %command, "Already absent");
        return Ok(false);
    }
    Err(BackendError::CommandFailed {
        command: command.to_string(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    })
}

fn unexpected(platform: PlatformKind, object: &impl fmt::Display) -> BackendError {
    BackendError::UnexpectedObject {
        platform,
        object: object.to_string(),
    }
}
