//! TOML scenario file parsing.
//!
//! Defines the structure of the scenario file with serde. Values that need
//! more than a type check (addresses, modes, names) stay strings here and are
//! parsed during validation so errors can name the offending field.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cni::Qos;

use super::ConfigError;

/// Root structure of a scenario file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Engine settings
    #[serde(default)]
    pub engine: EngineSection,

    /// Verifier settings
    #[serde(default)]
    pub probe: ProbeSection,

    /// Linux backend settings
    #[serde(default)]
    pub linux: LinuxSection,

    /// Windows backend settings
    #[serde(default)]
    pub windows: WindowsSection,

    /// Container backend settings
    #[serde(default)]
    pub container: ContainerSection,

    /// Kubernetes backend settings
    #[serde(default)]
    pub kubernetes: KubernetesSection,

    /// Endpoints to apply, in order
    #[serde(default)]
    pub endpoints: Vec<EndpointSection>,

    /// Reachability checks to run after every endpoint is applied
    #[serde(default)]
    pub tests: Vec<TestSection>,
}

/// Engine configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Target platform: "linux", "windows", "container" or "kubernetes"
    pub platform: Option<String>,

    /// Per-backend-call timeout in seconds
    pub call_timeout: Option<u64>,

    /// Path to the state file
    pub state_file: Option<PathBuf>,
}

/// Probe configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSection {
    /// Attempts per check
    pub attempts: Option<u32>,

    /// Single probe timeout in seconds
    pub timeout: Option<u64>,

    /// Delay between attempts in seconds
    pub delay: Option<u64>,
}

/// Linux backend section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinuxSection {
    /// Prefix privileged commands with `sudo -n`
    #[serde(default)]
    pub sudo: bool,
}

/// Windows backend section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowsSection {
    /// Shell binary (default: powershell)
    pub shell: Option<String>,
}

/// Container backend section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSection {
    /// Runtime CLI: "docker" or "podman"
    pub runtime: Option<String>,
}

/// Kubernetes backend section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubernetesSection {
    /// Namespace for attachments and policies
    pub namespace: Option<String>,

    /// `kubectl` binary
    pub kubectl: Option<String>,

    /// kubeconfig context
    pub context: Option<String>,

    /// kubeconfig path
    pub kubeconfig: Option<PathBuf>,

    /// Detect plugins once per run instead of once per endpoint
    pub cache_capabilities: Option<bool>,

    /// Accept pre-existing objects with the same name
    pub reuse_existing: Option<bool>,
}

/// One `[[endpoints]]` entry.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    /// Unique endpoint name
    pub name: String,

    /// Physical interface, Windows alias, or container parent interface
    pub interface: String,

    /// 802.1Q tag; 0 for an untagged network
    #[serde(default)]
    pub vlan_id: u32,

    /// "static" (default) or "dhcp"
    pub mode: Option<String>,

    /// Address with prefix, e.g. "192.168.100.10/24"
    pub cidr: Option<String>,

    /// Default gateway
    pub gateway: Option<String>,

    /// DNS servers
    #[serde(default)]
    pub dns: Vec<String>,

    /// MTU override
    pub mtu: Option<u32>,

    /// Container id or pod name
    pub workload: Option<String>,

    /// Where probes from this endpoint run: "host" or "workload"
    pub probe_from: Option<String>,

    /// Secondary-network plugin on Kubernetes
    pub plugin: Option<String>,

    /// Prefer SR-IOV on Kubernetes
    #[serde(default)]
    pub hardware_passthrough: bool,

    /// Bandwidth limits on Kubernetes
    pub qos: Option<Qos>,
}

/// One `[[tests]]` entry.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSection {
    /// Endpoint the probe starts from
    pub source: String,

    /// Endpoint the probe targets
    pub target: String,

    /// "reachable" or "isolated"; derived from the VLAN ids when unset
    pub expect: Option<String>,
}

impl ScenarioFile {
    /// Loads a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }
}

/// Generates a commented scenario with two VLANs and three endpoints.
#[must_use]
pub fn default_scenario_template() -> String {
    r#"# vlan-isolate scenario

[engine]
# Target platform: "linux", "windows", "container" or "kubernetes"
# (can be overridden by --platform)
platform = "linux"

# Per-backend-call timeout in seconds (default: 30)
# call_timeout = 30

# Where applied objects are recorded for a later `teardown`
# state_file = "vlan-isolate.state.json"

[probe]
# Attempts per check (default: 3)
# attempts = 3

# Single probe timeout in seconds (default: 2)
# timeout = 2

# Delay between attempts in seconds (default: 1)
# delay = 1

[linux]
# Prefix ip/modprobe/dhclient with `sudo -n`
# sudo = false

[windows]
# shell = "powershell"

[container]
# runtime = "docker"

[kubernetes]
# namespace = "default"
# kubectl = "kubectl"
# context = "lab"
# kubeconfig = "/etc/kubernetes/admin.conf"
# cache_capabilities = true
# reuse_existing = true

[[endpoints]]
name = "vlan100-a"
interface = "eth0"
vlan_id = 100
cidr = "192.168.100.10/24"
gateway = "192.168.100.1"
# mode = "static"
# dns = ["192.168.100.1"]
# mtu = 1500
# workload = "pod-a"
# probe_from = "workload"
# plugin = "macvlan"
# hardware_passthrough = false
# qos = { ingress_rate = 100000000, ingress_burst = 1000000, egress_rate = 100000000, egress_burst = 1000000 }

[[endpoints]]
name = "vlan100-b"
interface = "eth1"
vlan_id = 100
cidr = "192.168.100.20/24"

[[endpoints]]
name = "vlan200-a"
interface = "eth2"
vlan_id = 200
cidr = "192.168.200.10/24"

[[tests]]
source = "vlan100-a"
target = "vlan100-b"
# expect = "reachable"

[[tests]]
source = "vlan100-a"
target = "vlan200-a"
expect = "isolated"
"#
    .to_string()
}
