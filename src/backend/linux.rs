//! Linux host backend using iproute2 and the 802.1Q driver.

use tracing::{debug, info};

use super::{
    AddressAssignment, Backend, BackendError, BackendHandle, BackendObjectSpec, BuildPlan,
    HostAddressSpec, IsolationSupport, ObjectRecorder, VlanLinkSpec, run_checked, run_removal,
    unexpected,
};
use crate::exec::{Command, CommandExecutor};
use crate::network::names::MAX_LINUX_INTERFACE_LEN;
use crate::network::{NetworkConfig, PlatformKind};

/// Kernel module providing 802.1Q tagging.
pub const VLAN_MODULE: &str = "8021q";

const ABSENT_LINK: &[&str] = &["Cannot find device", "does not exist"];
const ABSENT_ADDRESS: &[&str] = &["Cannot assign requested address", "Cannot find device"];

/// Default routes added by this backend use this metric plus the VLAN id,
/// keeping them behind the host's primary default route.
const ROUTE_METRIC_BASE: u32 = 1000;

/// Creates tagged sub-interfaces (`<parent>.<vlan>`) and assigns addresses.
///
/// Untagged configurations place the address directly on the physical
/// interface instead.
#[derive(Debug, Clone)]
pub struct LinuxBackend<E> {
    executor: E,
    privilege: Vec<String>,
}

impl<E> LinuxBackend<E> {
    /// Creates a backend running commands as the current user.
    pub const fn new(executor: E) -> Self {
        Self {
            executor,
            privilege: Vec::new(),
        }
    }

    /// Runs mutating commands through `sudo -n`.
    #[must_use]
    pub fn with_sudo(mut self) -> Self {
        self.privilege = vec!["sudo".to_string(), "-n".to_string()];
        self
    }

    fn privileged<I, S>(&self, program: &str, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new(program).args(args).wrapped(&self.privilege)
    }

    fn ip<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privileged("ip", args)
    }

    fn check_name(name: &str) -> Result<(), BackendError> {
        if name.len() > MAX_LINUX_INTERFACE_LEN {
            return Err(BackendError::InvalidConfig {
                reason: format!(
                    "interface name '{name}' exceeds the kernel limit of {MAX_LINUX_INTERFACE_LEN} bytes"
                ),
            });
        }
        Ok(())
    }
}

impl<E: CommandExecutor> LinuxBackend<E> {
    async fn ensure_vlan_module(&self) -> Result<(), BackendError> {
        let loaded = self
            .executor
            .execute(&Command::new("test").args(["-d", "/sys/module/8021q"]))
            .await?;
        if loaded.success() {
            return Ok(());
        }

        debug!("Module {VLAN_MODULE} not loaded, trying modprobe");
        let probe = self
            .executor
            .execute(&self.privileged("modprobe", [VLAN_MODULE]))
            .await?;
        if probe.success() {
            info!("Loaded kernel module {VLAN_MODULE}");
            return Ok(());
        }
        let detail = probe.stderr.trim();
        Err(BackendError::MissingKernelCapability {
            module: VLAN_MODULE,
            detail: if detail.is_empty() {
                format!("modprobe exited with {}", probe.exit_code)
            } else {
                detail.to_string()
            },
        })
    }

    async fn add_default_route(
        &self,
        gateway: std::net::Ipv4Addr,
        device: &str,
        metric: u32,
    ) -> Result<(), BackendError> {
        let cmd = self.ip([
            "route".to_string(),
            "add".to_string(),
            "default".to_string(),
            "via".to_string(),
            gateway.to_string(),
            "dev".to_string(),
            device.to_string(),
            "metric".to_string(),
            metric.to_string(),
        ]);
        run_checked(&self.executor, &cmd).await.map(|_| ())
    }

    async fn start_dhcp(
        &self,
        device: &str,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        run_checked(&self.executor, &self.privileged("dhclient", ["-1", device])).await?;
        recorder.record(BackendHandle::LinuxDhcp {
            interface: device.to_string(),
        });
        Ok(())
    }

    async fn apply_link(
        &self,
        spec: &VlanLinkSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        if self.link_exists(&spec.name).await? {
            return self.share_link(spec, recorder).await;
        }
        let vlan = spec.vlan_id.to_string();
        let add = self.ip([
            "link", "add", "link", &spec.parent, "name", &spec.name, "type", "vlan", "id", &vlan,
        ]);
        run_checked(&self.executor, &add).await?;
        recorder.record(BackendHandle::LinuxLink {
            name: spec.name.clone(),
        });

        if let Some(mtu) = spec.mtu {
            let mtu = mtu.to_string();
            run_checked(
                &self.executor,
                &self.ip(["link", "set", "dev", &spec.name, "mtu", &mtu]),
            )
            .await?;
        }
        if let AddressAssignment::Static { address, .. } = &spec.assignment {
            let address = address.to_string();
            run_checked(
                &self.executor,
                &self.ip(["addr", "add", &address, "dev", &spec.name]),
            )
            .await?;
        }
        run_checked(
            &self.executor,
            &self.ip(["link", "set", "dev", &spec.name, "up"]),
        )
        .await?;

        match &spec.assignment {
            AddressAssignment::Static {
                gateway: Some(gateway),
                ..
            } => {
                let metric = ROUTE_METRIC_BASE + u32::from(spec.vlan_id.get());
                self.add_default_route(*gateway, &spec.name, metric).await
            }
            AddressAssignment::Static { gateway: None, .. } => Ok(()),
            AddressAssignment::Dhcp => self.start_dhcp(&spec.name, recorder).await,
        }
    }

    async fn link_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self
            .show(&["-o", "link", "show", "dev", name])
            .await?
            .is_some_and(|out| out.contains(name)))
    }

    /// Joins a sub-interface another configuration already created.
    ///
    /// Only the address is recorded so teardown leaves the link in place.
    async fn share_link(
        &self,
        spec: &VlanLinkSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        debug!(link = %spec.name, "sub-interface already present, sharing it");
        let AddressAssignment::Static { address, .. } = &spec.assignment else {
            return Ok(());
        };
        let text = address.to_string();
        run_checked(
            &self.executor,
            &self.ip(["addr", "add", &text, "dev", &spec.name]),
        )
        .await?;
        recorder.record(BackendHandle::LinuxAddress {
            interface: spec.name.clone(),
            address: *address,
        });
        Ok(())
    }

    async fn apply_address(
        &self,
        spec: &HostAddressSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        match &spec.assignment {
            AddressAssignment::Static { address, gateway } => {
                let text = address.to_string();
                run_checked(
                    &self.executor,
                    &self.ip(["addr", "add", &text, "dev", &spec.interface]),
                )
                .await?;
                recorder.record(BackendHandle::LinuxAddress {
                    interface: spec.interface.clone(),
                    address: *address,
                });
                if let Some(gateway) = gateway {
                    self.add_default_route(*gateway, &spec.interface, ROUTE_METRIC_BASE)
                        .await?;
                }
                Ok(())
            }
            AddressAssignment::Dhcp => self.start_dhcp(&spec.interface, recorder).await,
        }
    }

    async fn show(&self, args: &[&str]) -> Result<Option<String>, BackendError> {
        let output = self
            .executor
            .execute(&Command::new("ip").args(args.iter().copied()))
            .await?;
        Ok(output.success().then_some(output.stdout))
    }

    async fn verify_one(&self, handle: &BackendHandle) -> Result<bool, BackendError> {
        match handle {
            BackendHandle::LinuxLink { name } => Ok(self
                .show(&["-o", "link", "show", "dev", name])
                .await?
                .is_some_and(|out| out.contains(",UP") || out.contains("<UP"))),
            BackendHandle::LinuxAddress { interface, address } => {
                let expected = address.to_string();
                Ok(self
                    .show(&["-o", "-4", "addr", "show", "dev", interface])
                    .await?
                    .is_some_and(|out| out.contains(&expected)))
            }
            BackendHandle::LinuxDhcp { interface } => Ok(self
                .show(&["-o", "-4", "addr", "show", "dev", interface])
                .await?
                .is_some_and(|out| out.contains("inet "))),
            other => Err(unexpected(PlatformKind::Linux, other)),
        }
    }
}

impl<E: CommandExecutor> Backend for LinuxBackend<E> {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    async fn build(&self, config: &NetworkConfig) -> Result<BuildPlan, BackendError> {
        let parent = config.interface();
        Self::check_name(parent)?;
        let assignment = AddressAssignment::from_config(config)?;

        let object = if config.vlan_id().is_tagged() {
            let name = format!("{parent}.{}", config.vlan_id());
            Self::check_name(&name)?;
            self.ensure_vlan_module().await?;
            BackendObjectSpec::VlanLink(VlanLinkSpec {
                parent: parent.to_string(),
                name,
                vlan_id: config.vlan_id(),
                mtu: config.mtu(),
                assignment,
            })
        } else {
            BackendObjectSpec::LinuxAddress(HostAddressSpec {
                interface: parent.to_string(),
                assignment,
                dns_servers: config.dns_servers().to_vec(),
            })
        };

        Ok(BuildPlan {
            objects: vec![object],
            isolation: IsolationSupport::Enforced,
        })
    }

    async fn apply_one(
        &self,
        spec: &BackendObjectSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        match spec {
            BackendObjectSpec::VlanLink(link) => self.apply_link(link, recorder).await,
            BackendObjectSpec::LinuxAddress(address) => self.apply_address(address, recorder).await,
            other => Err(unexpected(PlatformKind::Linux, other)),
        }
    }

    async fn verify(&self, handles: &[BackendHandle]) -> Result<bool, BackendError> {
        for handle in handles {
            if !self.verify_one(handle).await? {
                info!(object = %handle, "Object missing on host");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn teardown_one(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let removed = match handle {
            BackendHandle::LinuxLink { name } => {
                run_removal(
                    &self.executor,
                    &self.ip(["link", "delete", "dev", name]),
                    ABSENT_LINK,
                )
                .await?
            }
            BackendHandle::LinuxAddress { interface, address } => {
                let address = address.to_string();
                run_removal(
                    &self.executor,
                    &self.ip(["addr", "del", &address, "dev", interface]),
                    ABSENT_ADDRESS,
                )
                .await?
            }
            BackendHandle::LinuxDhcp { interface } => {
                run_removal(
                    &self.executor,
                    &self.privileged("dhclient", ["-r", interface.as_str()]),
                    ABSENT_LINK,
                )
                .await?
            }
            other => return Err(unexpected(PlatformKind::Linux, other)),
        };
        debug!(object = %handle, removed, "Torn down");
        Ok(())
    }
}

#[cfg(test)]
#[path = "linux_tests.rs"]
mod tests;
