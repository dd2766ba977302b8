//! Windows host backend driving the NetTCPIP PowerShell cmdlets.
//!
//! Windows has no generic 802.1Q sub-interface; tagging lives in NIC
//! driver properties this backend does not manage. A tagged configuration
//! still gets its address binding, but its isolation is reported as
//! unverifiable.

use tracing::{debug, warn};

use super::{
    AddressAssignment, Backend, BackendError, BackendHandle, BackendObjectSpec, BuildPlan,
    HostAddressSpec, IsolationSupport, ObjectRecorder, run_checked, run_removal, unexpected,
};
use crate::exec::{Command, CommandExecutor};
use crate::network::{NetworkConfig, PlatformKind};

/// Reason reported when a tagged configuration lands on Windows.
pub const PLATFORM_NO_VLAN_SUPPORT: &str = "platform_no_vlan_support";

const DEFAULT_SHELL: &str = "powershell";

const ABSENT: &[&str] = &["No matching MSFT_", "ObjectNotFound"];

/// Quotes a value for a single-quoted PowerShell string literal.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Address bindings on Windows interface aliases.
#[derive(Debug, Clone)]
pub struct WindowsBackend<E> {
    executor: E,
    shell: String,
}

impl<E> WindowsBackend<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    /// Uses another PowerShell binary, e.g. `pwsh`.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    fn script(&self, script: &str) -> Command {
        Command::new(&self.shell).args(["-NoProfile", "-NonInteractive", "-Command", script])
    }
}

impl<E: CommandExecutor> WindowsBackend<E> {
    async fn apply_address(
        &self,
        spec: &HostAddressSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        let alias = ps_quote(&spec.interface);
        match &spec.assignment {
            AddressAssignment::Static { address, gateway } => {
                let mut script = format!(
                    "New-NetIPAddress -InterfaceAlias {alias} -IPAddress {} -PrefixLength {} -AddressFamily IPv4",
                    address.addr(),
                    address.prefix_len()
                );
                if let Some(gateway) = gateway {
                    script.push_str(&format!(" -DefaultGateway {gateway}"));
                }
                run_checked(&self.executor, &self.script(&script)).await?;
                recorder.record(BackendHandle::WindowsAddress {
                    alias: spec.interface.clone(),
                    address: *address,
                    gateway: *gateway,
                });
            }
            AddressAssignment::Dhcp => {
                let script = format!(
                    "Set-NetIPInterface -InterfaceAlias {alias} -AddressFamily IPv4 -Dhcp Enabled"
                );
                run_checked(&self.executor, &self.script(&script)).await?;
                recorder.record(BackendHandle::WindowsDhcp {
                    alias: spec.interface.clone(),
                });
            }
        }

        if !spec.dns_servers.is_empty() {
            let servers: Vec<String> = spec
                .dns_servers
                .iter()
                .map(|s| ps_quote(&s.to_string()))
                .collect();
            let script = format!(
                "Set-DnsClientServerAddress -InterfaceAlias {alias} -ServerAddresses {}",
                servers.join(",")
            );
            run_checked(&self.executor, &self.script(&script)).await?;
        }
        Ok(())
    }

    async fn verify_one(&self, handle: &BackendHandle) -> Result<bool, BackendError> {
        let script = match handle {
            BackendHandle::WindowsAddress { alias, address, .. } => format!(
                "Get-NetIPAddress -InterfaceAlias {} -IPAddress {} -ErrorAction Stop | Select-Object -ExpandProperty IPAddress",
                ps_quote(alias),
                address.addr()
            ),
            BackendHandle::WindowsDhcp { alias } => format!(
                "(Get-NetIPInterface -InterfaceAlias {} -AddressFamily IPv4 -ErrorAction Stop).Dhcp",
                ps_quote(alias)
            ),
            other => return Err(unexpected(PlatformKind::Windows, other)),
        };
        let output = self.executor.execute(&self.script(&script)).await?;
        if !output.success() {
            return Ok(false);
        }
        let found = output.stdout.trim();
        Ok(match handle {
            BackendHandle::WindowsAddress { address, .. } => {
                found.lines().any(|l| l.trim() == address.addr().to_string())
            }
            _ => found.eq_ignore_ascii_case("enabled"),
        })
    }
}

impl<E: CommandExecutor> Backend for WindowsBackend<E> {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Windows
    }

    async fn build(&self, config: &NetworkConfig) -> Result<BuildPlan, BackendError> {
        let assignment = AddressAssignment::from_config(config)?;
        let isolation = if config.vlan_id().is_tagged() {
            warn!(
                interface = config.interface(),
                vlan = %config.vlan_id(),
                "Windows cannot tag this interface; isolation will not be verified"
            );
            IsolationSupport::Unsupported {
                reason: PLATFORM_NO_VLAN_SUPPORT,
            }
        } else {
            IsolationSupport::Enforced
        };

        Ok(BuildPlan {
            objects: vec![BackendObjectSpec::WindowsAddress(HostAddressSpec {
                interface: config.interface().to_string(),
                assignment,
                dns_servers: config.dns_servers().to_vec(),
            })],
            isolation,
        })
    }

    async fn apply_one(
        &self,
        spec: &BackendObjectSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        match spec {
            BackendObjectSpec::WindowsAddress(address) => {
                self.apply_address(address, recorder).await
            }
            other => Err(unexpected(PlatformKind::Windows, other)),
        }
    }

    async fn verify(&self, handles: &[BackendHandle]) -> Result<bool, BackendError> {
        for handle in handles {
            if !self.verify_one(handle).await? {
                debug!(object = %handle, "Binding missing");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn teardown_one(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        match handle {
            BackendHandle::WindowsAddress {
                alias,
                address,
                gateway,
            } => {
                let alias = ps_quote(alias);
                if gateway.is_some() {
                    let script = format!(
                        "Remove-NetRoute -InterfaceAlias {alias} -DestinationPrefix '0.0.0.0/0' -Confirm:$false"
                    );
                    run_removal(&self.executor, &self.script(&script), ABSENT).await?;
                }
                let script = format!(
                    "Remove-NetIPAddress -InterfaceAlias {alias} -IPAddress {} -Confirm:$false",
                    address.addr()
                );
                run_removal(&self.executor, &self.script(&script), ABSENT).await?;
            }
            BackendHandle::WindowsDhcp { alias } => {
                let script = format!(
                    "Set-NetIPInterface -InterfaceAlias {} -AddressFamily IPv4 -Dhcp Disabled",
                    ps_quote(alias)
                );
                run_removal(&self.executor, &self.script(&script), ABSENT).await?;
            }
            other => return Err(unexpected(PlatformKind::Windows, other)),
        }
        debug!(object = %handle, "Torn down");
        Ok(())
    }
}
