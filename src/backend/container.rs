//! Container runtime backend (Docker or Podman MACVLAN networks).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    Backend, BackendError, BackendHandle, BackendObjectSpec, BuildPlan, ContainerAttachmentSpec,
    ContainerNetworkSpec, IsolationSupport, ObjectRecorder, run_checked, run_removal, unexpected,
};
use crate::exec::{Command, CommandExecutor};
use crate::network::{NetworkConfig, PlatformKind};

const ABSENT: &[&str] = &[
    "is not connected",
    "No such container",
    "No such network",
    "not found",
    "no such",
];

/// Container engine CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// The CLI binary name.
    #[must_use]
    pub const fn binary(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for ContainerRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(format!("unknown container runtime '{other}'")),
        }
    }
}

/// Subset of `inspect` output describing one network endpoint.
#[derive(Debug, Deserialize)]
struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

/// Attaches containers to per-VLAN MACVLAN networks.
///
/// The configuration's workload names the container. Tagged networks ride on
/// the `<iface>.<vlan>` sub-interface, which the runtime creates on demand.
#[derive(Debug, Clone)]
pub struct ContainerBackend<E> {
    executor: E,
    runtime: ContainerRuntime,
}

impl<E> ContainerBackend<E> {
    pub const fn new(executor: E, runtime: ContainerRuntime) -> Self {
        Self { executor, runtime }
    }

    /// The runtime this backend drives.
    pub const fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    fn cli<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new(self.runtime.binary()).args(args)
    }

    /// Network name for a configuration.
    fn network_name(config: &NetworkConfig) -> String {
        let vlan = config.vlan_id();
        if vlan.is_tagged() {
            format!("vlan{vlan}-{}", config.interface())
        } else {
            format!("flat-{}", config.interface())
        }
    }
}

impl<E: CommandExecutor> ContainerBackend<E> {
    async fn network_exists(&self, name: &str) -> Result<bool, BackendError> {
        let output = self
            .executor
            .execute(&self.cli(["network", "inspect", name]))
            .await?;
        Ok(output.success())
    }

    async fn apply_network(
        &self,
        spec: &ContainerNetworkSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        if self.network_exists(&spec.name).await? {
            info!(network = %spec.name, "Network already present, sharing it");
            return Ok(());
        }

        let mut args = vec![
            "network".to_string(),
            "create".to_string(),
            "-d".to_string(),
            "macvlan".to_string(),
            "--subnet".to_string(),
            spec.subnet.to_string(),
        ];
        if let Some(gateway) = spec.gateway {
            args.push("--gateway".to_string());
            args.push(gateway.to_string());
        }
        args.push("-o".to_string());
        args.push(format!("parent={}", spec.parent));
        args.push(spec.name.clone());

        run_checked(&self.executor, &self.cli(args)).await?;
        recorder.record(BackendHandle::ContainerNetwork {
            name: spec.name.clone(),
        });
        Ok(())
    }

    async fn apply_attachment(
        &self,
        spec: &ContainerAttachmentSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        let ip = spec.address.to_string();
        run_checked(
            &self.executor,
            &self.cli([
                "network",
                "connect",
                "--ip",
                &ip,
                &spec.network,
                &spec.container,
            ]),
        )
        .await?;
        recorder.record(BackendHandle::ContainerAttachment {
            network: spec.network.clone(),
            container: spec.container.clone(),
        });
        Ok(())
    }

    async fn attachment_present(
        &self,
        network: &str,
        container: &str,
    ) -> Result<bool, BackendError> {
        let output = self
            .executor
            .execute(&self.cli([
                "inspect",
                "-f",
                "{{json .NetworkSettings.Networks}}",
                container,
            ]))
            .await?;
        if !output.success() {
            return Ok(false);
        }
        let networks: HashMap<String, EndpointSettings> =
            serde_json::from_str(output.stdout.trim()).map_err(|e| {
                BackendError::InvalidConfig {
                    reason: format!("unreadable inspect output for {container}: {e}"),
                }
            })?;
        Ok(networks
            .get(network)
            .is_some_and(|settings| !settings.ip_address.is_empty()))
    }
}

impl<E: CommandExecutor> Backend for ContainerBackend<E> {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Container
    }

    async fn build(&self, config: &NetworkConfig) -> Result<BuildPlan, BackendError> {
        let Some(container) = config.workload() else {
            return Err(BackendError::InvalidConfig {
                reason: "container attachment needs a workload (container name or id)"
                    .to_string(),
            });
        };
        let (Some(address), Some(subnet)) = (config.ip_address(), config.subnet()) else {
            return Err(BackendError::InvalidConfig {
                reason: format!(
                    "container networks need a static address, got {} addressing",
                    config.mode()
                ),
            });
        };

        let vlan = config.vlan_id();
        let parent = if vlan.is_tagged() {
            format!("{}.{vlan}", config.interface())
        } else {
            config.interface().to_string()
        };
        let network = Self::network_name(config);

        Ok(BuildPlan {
            objects: vec![
                BackendObjectSpec::ContainerNetwork(ContainerNetworkSpec {
                    name: network.clone(),
                    parent,
                    subnet,
                    gateway: config.gateway(),
                }),
                BackendObjectSpec::ContainerAttachment(ContainerAttachmentSpec {
                    network,
                    container: container.to_string(),
                    address,
                }),
            ],
            isolation: IsolationSupport::Enforced,
        })
    }

    async fn apply_one(
        &self,
        spec: &BackendObjectSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        match spec {
            BackendObjectSpec::ContainerNetwork(net) => self.apply_network(net, recorder).await,
            BackendObjectSpec::ContainerAttachment(att) => {
                self.apply_attachment(att, recorder).await
            }
            other => Err(unexpected(PlatformKind::Container, other)),
        }
    }

    async fn verify(&self, handles: &[BackendHandle]) -> Result<bool, BackendError> {
        for handle in handles {
            let present = match handle {
                BackendHandle::ContainerNetwork { name } => self.network_exists(name).await?,
                BackendHandle::ContainerAttachment { network, container } => {
                    self.attachment_present(network, container).await?
                }
                other => return Err(unexpected(PlatformKind::Container, other)),
            };
            if !present {
                debug!(object = %handle, "Object missing from runtime");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn teardown_one(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let command = match handle {
            BackendHandle::ContainerNetwork { name } => self.cli(["network", "rm", name.as_str()]),
            BackendHandle::ContainerAttachment { network, container } => self.cli([
                "network",
                "disconnect",
                "-f",
                network.as_str(),
                container.as_str(),
            ]),
            other => return Err(unexpected(PlatformKind::Container, other)),
        };
        let removed = run_removal(&self.executor, &command, ABSENT).await?;
        debug!(object = %handle, removed, "Torn down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::AppliedObject;
    use crate::exec::mock::MockExecutor;
    use crate::network::AddressMode;

    fn backend() -> (Arc<MockExecutor>, ContainerBackend<Arc<MockExecutor>>) {
        let exec = Arc::new(MockExecutor::new());
        (
            Arc::clone(&exec),
            ContainerBackend::new(Arc::clone(&exec), ContainerRuntime::Docker),
        )
    }

    fn config(vlan: u32, workload: &str) -> NetworkConfig {
        NetworkConfig::builder("eth0")
            .cidr("192.168.100.10/24".parse().unwrap())
            .gateway("192.168.100.1".parse().unwrap())
            .vlan_id(vlan)
            .workload(workload)
            .build()
            .unwrap()
    }

    async fn apply(
        backend: &ContainerBackend<Arc<MockExecutor>>,
        plan: &BuildPlan,
    ) -> (Vec<AppliedObject>, Result<(), BackendError>) {
        let mut objects = Vec::new();
        for spec in &plan.objects {
            let mut recorder = ObjectRecorder::new("eth0", &mut objects);
            if let Err(e) = backend.apply_one(spec, &mut recorder).await {
                return (objects, Err(e));
            }
        }
        (objects, Ok(()))
    }

    #[test]
    fn runtime_parses_case_insensitively() {
        assert_eq!(
            "Podman".parse::<ContainerRuntime>().unwrap(),
            ContainerRuntime::Podman
        );
        assert!("lxc".parse::<ContainerRuntime>().is_err());
    }

    #[tokio::test]
    async fn plan_uses_tagged_parent() {
        let (_, backend) = backend();

        let plan = backend.build(&config(100, "web")).await.unwrap();

        let BackendObjectSpec::ContainerNetwork(net) = &plan.objects[0] else {
            panic!("unexpected plan");
        };
        assert_eq!(net.name, "vlan100-eth0");
        assert_eq!(net.parent, "eth0.100");
        assert_eq!(net.subnet, "192.168.100.0/24".parse().unwrap());
    }

    #[tokio::test]
    async fn workload_is_required() {
        let (_, backend) = backend();
        let config = NetworkConfig::builder("eth0")
            .cidr("10.0.0.2/24".parse().unwrap())
            .vlan_id(100)
            .build()
            .unwrap();

        let err = backend.build(&config).await.unwrap_err();

        assert!(matches!(err, BackendError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn dhcp_is_rejected() {
        let (_, backend) = backend();
        let config = NetworkConfig::builder("eth0")
            .mode(AddressMode::Dhcp)
            .workload("web")
            .build()
            .unwrap();

        assert!(backend.build(&config).await.is_err());
    }

    #[tokio::test]
    async fn creates_network_then_connects() {
        let (exec, backend) = backend();
        exec.respond("network inspect", 1, "", "Error: No such network: vlan100-eth0");
        let plan = backend.build(&config(100, "web")).await.unwrap();

        let (objects, result) = apply(&backend, &plan).await;

        result.unwrap();
        assert_eq!(objects.len(), 2);
        assert!(exec.commands().contains(
            &"docker network create -d macvlan --subnet 192.168.100.0/24 --gateway 192.168.100.1 -o parent=eth0.100 vlan100-eth0"
                .to_string()
        ));
        assert_eq!(
            exec.count("docker network connect --ip 192.168.100.10 vlan100-eth0 web"),
            1
        );
    }

    #[tokio::test]
    async fn existing_network_is_shared_not_recorded() {
        let (exec, backend) = backend();
        let plan = backend.build(&config(100, "web")).await.unwrap();

        let (objects, result) = apply(&backend, &plan).await;

        result.unwrap();
        assert_eq!(exec.count("network create"), 0);
        assert_eq!(objects.len(), 1);
        assert!(matches!(
            objects[0].handle,
            BackendHandle::ContainerAttachment { .. }
        ));
    }

    #[tokio::test]
    async fn verify_reads_inspect_json() {
        let (exec, backend) = backend();
        exec.respond(
            "inspect -f",
            0,
            r#"{"vlan100-eth0":{"IPAddress":"192.168.100.10"},"bridge":{"IPAddress":""}}"#,
            "",
        );
        let attached = BackendHandle::ContainerAttachment {
            network: "vlan100-eth0".into(),
            container: "web".into(),
        };
        let bridge = BackendHandle::ContainerAttachment {
            network: "bridge".into(),
            container: "web".into(),
        };

        assert!(backend.verify(&[attached]).await.unwrap());
        assert!(!backend.verify(&[bridge]).await.unwrap());
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (exec, backend) = backend();
        exec.respond("network rm", 1, "", "Error: No such network: vlan100-eth0");
        let handle = BackendHandle::ContainerNetwork {
            name: "vlan100-eth0".into(),
        };

        backend.teardown_one(&handle).await.unwrap();
        backend.teardown_one(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn podman_uses_its_binary() {
        let exec = Arc::new(MockExecutor::new());
        let backend = ContainerBackend::new(Arc::clone(&exec), ContainerRuntime::Podman);

        backend
            .teardown_one(&BackendHandle::ContainerNetwork { name: "n".into() })
            .await
            .unwrap();

        assert_eq!(exec.commands(), vec!["podman network rm n"]);
    }
}
