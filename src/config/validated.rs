//! Validated scenario after merging CLI and TOML sources.
//!
//! This module contains the final, validated scenario that the driver runs.
//! All validation is performed during construction.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::backend::ContainerRuntime;
use crate::cni::PluginType;
use crate::engine::EngineOptions;
use crate::network::{AddressMode, AttachmentHints, NetworkConfig, PlatformKind};
use crate::verify::{Endpoint, ProbePolicy, ProbeVia};

use super::cli::ScenarioArgs;
use super::defaults;
use super::error::ConfigError;
use super::toml::{EndpointSection, ScenarioFile, TestSection};

/// Where probes from an endpoint are launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFrom {
    /// The host running this process.
    Host,
    /// Inside the endpoint's container or pod.
    Workload,
}

/// One endpoint of a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioEndpoint {
    /// Unique name.
    pub name: String,
    /// Configuration the engine applies.
    pub config: NetworkConfig,
    /// Where probes from this endpoint run.
    pub probe_from: ProbeFrom,
}

/// Expected outcome of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    /// Source receives replies from target.
    Reachable,
    /// Source receives no replies from target.
    Isolated,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reachable => "reachable",
            Self::Isolated => "isolated",
        })
    }
}

/// One entry of the test matrix; indices point into
/// [`ValidatedScenario::endpoints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioTest {
    pub source: usize,
    pub target: usize,
    pub expect: Expectation,
}

/// Cluster access and attachment settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesSettings {
    pub namespace: String,
    pub kubectl: String,
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub cache_capabilities: bool,
    pub reuse_existing: bool,
}

/// Fully validated scenario ready for the driver.
///
/// # Construction
///
/// Use [`ValidatedScenario::from_raw`] to create from CLI args and an
/// optional scenario file.
#[derive(Debug)]
pub struct ValidatedScenario {
    /// Target platform; required by `apply` only.
    pub platform: Option<PlatformKind>,

    /// Engine settings
    pub engine: EngineOptions,

    /// Verifier retry and timeout settings
    pub probe: ProbePolicy,

    /// Prefix privileged Linux commands with `sudo -n`
    pub linux_sudo: bool,

    /// Shell for Windows commands
    pub windows_shell: String,

    /// Container runtime CLI
    pub runtime: ContainerRuntime,

    /// Cluster settings
    pub kubernetes: KubernetesSettings,

    /// Endpoints in apply order
    pub endpoints: Vec<ScenarioEndpoint>,

    /// Checks run after every endpoint is applied
    pub tests: Vec<ScenarioTest>,

    /// Path to the state file, if persistence is enabled.
    pub state_file: Option<PathBuf>,
}

impl fmt::Display for ValidatedScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let platform = self
            .platform
            .map_or_else(|| "unset".to_string(), |p| p.to_string());
        let state_file = self
            .state_file
            .as_ref()
            .map_or_else(|| "none".to_string(), |p| p.display().to_string());

        write!(
            f,
            "Scenario {{ platform: {platform}, endpoints: {}, tests: {}, call_timeout: {}s, \
             probe: {}x/{}s, state_file: {state_file} }}",
            self.endpoints.len(),
            self.tests.len(),
            self.engine.call_timeout.as_secs(),
            self.probe.attempts,
            self.probe.timeout.as_secs(),
        )
    }
}

impl ValidatedScenario {
    /// Creates a validated scenario from CLI arguments and an optional
    /// scenario file. CLI arguments take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A platform, runtime, mode or address does not parse
    /// - A timeout or the probe attempt count is zero
    /// - An endpoint violates a network configuration invariant
    /// - Endpoint names repeat, or a test references an unusable endpoint
    pub fn from_raw(args: &ScenarioArgs, toml: Option<&ScenarioFile>) -> Result<Self, ConfigError> {
        let platform = Self::resolve_platform(args, toml)?;
        let engine = Self::resolve_engine(args, toml)?;
        let probe = Self::resolve_probe(args, toml)?;

        let runtime = match toml.and_then(|t| t.container.runtime.as_deref()) {
            Some(value) => value
                .parse::<ContainerRuntime>()
                .map_err(|reason| ConfigError::invalid("container.runtime", value, reason))?,
            None => ContainerRuntime::default(),
        };
        let windows_shell = toml
            .and_then(|t| t.windows.shell.clone())
            .unwrap_or_else(|| defaults::WINDOWS_SHELL.to_string());

        let endpoints = match toml {
            Some(t) => resolve_endpoints(&t.endpoints)?,
            None => Vec::new(),
        };
        let tests = match toml {
            Some(t) => resolve_tests(&t.tests, &endpoints)?,
            None => Vec::new(),
        };

        Ok(Self {
            platform,
            engine,
            probe,
            linux_sudo: toml.is_some_and(|t| t.linux.sudo),
            windows_shell,
            runtime,
            kubernetes: Self::resolve_kubernetes(toml),
            endpoints,
            tests,
            state_file: args
                .state_file
                .clone()
                .or_else(|| toml.and_then(|t| t.engine.state_file.clone())),
        })
    }

    /// Loads the scenario file named by `args.config`, if any, and merges it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The scenario file cannot be read or parsed
    /// - The merged scenario is invalid
    pub fn load(args: &ScenarioArgs) -> Result<Self, ConfigError> {
        let toml = if let Some(ref path) = args.config {
            Some(ScenarioFile::load(path)?)
        } else {
            None
        };

        Self::from_raw(args, toml.as_ref())
    }

    /// The probe endpoint for `self.endpoints[index]`, or `None` when the
    /// endpoint has no static address to aim at.
    #[must_use]
    pub fn probe_endpoint(&self, index: usize) -> Option<Endpoint> {
        let endpoint = self.endpoints.get(index)?;
        let address = endpoint.config.ip_address()?;
        let via = match (
            endpoint.probe_from,
            self.platform,
            endpoint.config.workload(),
        ) {
            (ProbeFrom::Workload, Some(PlatformKind::Container), Some(container)) => {
                ProbeVia::Container {
                    runtime: self.runtime,
                    container: container.to_string(),
                }
            }
            (ProbeFrom::Workload, Some(PlatformKind::Kubernetes), Some(pod)) => ProbeVia::Pod {
                namespace: self.kubernetes.namespace.clone(),
                pod: pod.to_string(),
            },
            _ => ProbeVia::Local,
        };
        Some(
            Endpoint::new(
                endpoint.name.clone(),
                IpAddr::V4(address),
                endpoint.config.vlan_id(),
            )
            .via(via),
        )
    }

    fn resolve_platform(
        args: &ScenarioArgs,
        toml: Option<&ScenarioFile>,
    ) -> Result<Option<PlatformKind>, ConfigError> {
        // CLI takes precedence
        if let Some(platform) = args.platform {
            return Ok(Some(platform.into()));
        }

        toml.and_then(|t| t.engine.platform.as_deref())
            .map(|value| {
                value
                    .parse::<PlatformKind>()
                    .map_err(|reason| ConfigError::invalid("engine.platform", value, reason))
            })
            .transpose()
    }

    fn resolve_engine(
        args: &ScenarioArgs,
        toml: Option<&ScenarioFile>,
    ) -> Result<EngineOptions, ConfigError> {
        // Priority: CLI explicit > TOML > default
        let seconds = args
            .call_timeout
            .or_else(|| toml.and_then(|t| t.engine.call_timeout))
            .unwrap_or(defaults::CALL_TIMEOUT_SECS);

        if seconds == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "call_timeout",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(EngineOptions::new().with_call_timeout(Duration::from_secs(seconds)))
    }

    fn resolve_probe(
        args: &ScenarioArgs,
        toml: Option<&ScenarioFile>,
    ) -> Result<ProbePolicy, ConfigError> {
        let probe = toml.map(|t| &t.probe);

        let attempts = args
            .probe_attempts
            .or_else(|| probe.and_then(|p| p.attempts))
            .unwrap_or(defaults::PROBE_ATTEMPTS);
        let timeout = probe
            .and_then(|p| p.timeout)
            .map_or_else(defaults::probe_timeout, Duration::from_secs);
        let delay = probe
            .and_then(|p| p.delay)
            .map_or_else(defaults::probe_delay, Duration::from_secs);

        if attempts == 0 {
            return Err(ConfigError::invalid(
                "probe.attempts",
                "0",
                "must be greater than 0",
            ));
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "probe.timeout",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(ProbePolicy::new()
            .with_attempts(attempts)
            .with_timeout(timeout)
            .with_delay(delay))
    }

    fn resolve_kubernetes(toml: Option<&ScenarioFile>) -> KubernetesSettings {
        let section = toml.map(|t| &t.kubernetes);
        KubernetesSettings {
            namespace: section
                .and_then(|k| k.namespace.clone())
                .unwrap_or_else(|| defaults::NAMESPACE.to_string()),
            kubectl: section
                .and_then(|k| k.kubectl.clone())
                .unwrap_or_else(|| defaults::KUBECTL.to_string()),
            context: section.and_then(|k| k.context.clone()),
            kubeconfig: section.and_then(|k| k.kubeconfig.clone()),
            cache_capabilities: section.and_then(|k| k.cache_capabilities).unwrap_or(true),
            reuse_existing: section.and_then(|k| k.reuse_existing).unwrap_or(true),
        }
    }
}

/// Writes the default scenario template to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_default_scenario(path: &Path) -> Result<(), ConfigError> {
    let template = super::toml::default_scenario_template();
    std::fs::write(path, template).map_err(|e| ConfigError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

fn resolve_endpoints(sections: &[EndpointSection]) -> Result<Vec<ScenarioEndpoint>, ConfigError> {
    let mut endpoints: Vec<ScenarioEndpoint> = Vec::with_capacity(sections.len());
    for section in sections {
        if endpoints.iter().any(|e| e.name == section.name) {
            return Err(ConfigError::DuplicateEndpoint {
                name: section.name.clone(),
            });
        }
        endpoints.push(build_endpoint(section)?);
    }
    Ok(endpoints)
}

fn build_endpoint(section: &EndpointSection) -> Result<ScenarioEndpoint, ConfigError> {
    if section.name.trim().is_empty() {
        return Err(ConfigError::invalid(
            "endpoints.name",
            &section.name,
            "must not be empty",
        ));
    }

    let plugin = match &section.plugin {
        Some(value) => Some(
            value
                .parse::<PluginType>()
                .map_err(|reason| ConfigError::invalid("endpoints.plugin", value, reason))?,
        ),
        None => None,
    };
    let mut builder = NetworkConfig::builder(&section.interface)
        .vlan_id(section.vlan_id)
        .attachment(AttachmentHints {
            hardware_passthrough: section.hardware_passthrough,
            plugin,
            qos: section.qos,
            reuse_existing: false,
        });

    if let Some(mode) = &section.mode {
        builder = builder.mode(parse_mode(mode)?);
    }
    if let Some(cidr) = &section.cidr {
        builder = builder.cidr(parse_value::<Ipv4Net>("endpoints.cidr", cidr)?);
    }
    if let Some(gateway) = &section.gateway {
        builder = builder.gateway(parse_value::<Ipv4Addr>("endpoints.gateway", gateway)?);
    }
    for server in &section.dns {
        builder = builder.dns_server(parse_value::<IpAddr>("endpoints.dns", server)?);
    }
    if let Some(mtu) = section.mtu {
        builder = builder.mtu(mtu);
    }
    if let Some(workload) = &section.workload {
        builder = builder.workload(workload);
    }

    let config = builder.build().map_err(|source| ConfigError::InvalidEndpoint {
        name: section.name.clone(),
        source,
    })?;

    let probe_from = match section.probe_from.as_deref() {
        Some(value) => parse_probe_from(value)?,
        None if config.workload().is_some() => ProbeFrom::Workload,
        None => ProbeFrom::Host,
    };

    Ok(ScenarioEndpoint {
        name: section.name.clone(),
        config,
        probe_from,
    })
}

fn resolve_tests(
    sections: &[TestSection],
    endpoints: &[ScenarioEndpoint],
) -> Result<Vec<ScenarioTest>, ConfigError> {
    let by_name: HashMap<&str, usize> = endpoints
        .iter()
        .enumerate()
        .map(|(i, e)| (e.name.as_str(), i))
        .collect();

    let lookup = |index: usize, name: &str| -> Result<usize, ConfigError> {
        let position = *by_name.get(name).ok_or_else(|| ConfigError::InvalidTest {
            index,
            name: name.to_string(),
            reason: "no such endpoint",
        })?;
        if endpoints[position].config.ip_address().is_none() {
            return Err(ConfigError::InvalidTest {
                index,
                name: name.to_string(),
                reason: "endpoint has no static address to probe",
            });
        }
        Ok(position)
    };

    sections
        .iter()
        .enumerate()
        .map(|(index, section)| {
            let source = lookup(index, &section.source)?;
            let target = lookup(index, &section.target)?;
            if source == target {
                return Err(ConfigError::InvalidTest {
                    index,
                    name: section.target.clone(),
                    reason: "source and target are the same endpoint",
                });
            }
            let expect = match section.expect.as_deref() {
                Some(value) => parse_expectation(value)?,
                None if endpoints[source].config.vlan_id() == endpoints[target].config.vlan_id() => {
                    Expectation::Reachable
                }
                None => Expectation::Isolated,
            };
            Ok(ScenarioTest {
                source,
                target,
                expect,
            })
        })
        .collect()
}

// Helper functions

fn parse_value<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(field, value, e.to_string()))
}

fn parse_mode(s: &str) -> Result<AddressMode, ConfigError> {
    match s.to_lowercase().as_str() {
        "static" => Ok(AddressMode::Static),
        "dhcp" => Ok(AddressMode::Dhcp),
        _ => Err(ConfigError::invalid(
            "endpoints.mode",
            s,
            "expected static or dhcp",
        )),
    }
}

fn parse_probe_from(s: &str) -> Result<ProbeFrom, ConfigError> {
    match s.to_lowercase().as_str() {
        "host" | "local" => Ok(ProbeFrom::Host),
        "workload" | "container" | "pod" => Ok(ProbeFrom::Workload),
        _ => Err(ConfigError::invalid(
            "endpoints.probe_from",
            s,
            "expected host or workload",
        )),
    }
}

fn parse_expectation(s: &str) -> Result<Expectation, ConfigError> {
    match s.to_lowercase().as_str() {
        "reachable" | "same" => Ok(Expectation::Reachable),
        "isolated" => Ok(Expectation::Isolated),
        _ => Err(ConfigError::invalid(
            "tests.expect",
            s,
            "expected reachable or isolated",
        )),
    }
}
