//! Reachability probes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{Endpoint, ProbeError, ProbeVia};
use crate::exec::{Command, CommandExecutor};

/// Output fragments meaning the probe never reached the network.
const SETUP_FAILURES: &[&str] = &[
    "No such container",
    "is not running",
    "NotFound",
    "not found",
    "executable file not found",
];

/// Runs one reachability probe from one endpoint to another.
pub trait Prober: Send + Sync {
    /// Returns `Ok(true)` if `target` answered, `Ok(false)` if it did not.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the attempt is inconclusive.
    fn probe(
        &self,
        source: &Endpoint,
        target: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, ProbeError>> + Send;
}

impl<P: Prober> Prober for Arc<P> {
    fn probe(
        &self,
        source: &Endpoint,
        target: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, ProbeError>> + Send {
        (**self).probe(source, target, timeout)
    }
}

/// Probes with a single ICMP echo (`ping -c 1 -W <secs>`).
///
/// The echo runs on the local host, inside a container or inside a pod,
/// depending on the source endpoint's [`ProbeVia`]. Local echoes are bound
/// to the source address with `-I`.
#[derive(Debug, Clone)]
pub struct ExecProber<E> {
    executor: E,
    kubectl: Command,
}

impl<E> ExecProber<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            kubectl: Command::new("kubectl"),
        }
    }

    /// Uses `base` (binary plus global flags) for pod probes.
    #[must_use]
    pub fn with_kubectl(mut self, base: Command) -> Self {
        self.kubectl = base;
        self
    }

    fn command(&self, source: &Endpoint, target: &Endpoint, timeout: Duration) -> Command {
        let wait = timeout.as_secs().max(1).to_string();
        let ping = [
            "ping".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait,
            target.address.to_string(),
        ];
        match &source.via {
            ProbeVia::Local => {
                let [_, count, one, wait_flag, wait, target] = ping;
                Command::new("ping").args([
                    count,
                    one,
                    wait_flag,
                    wait,
                    "-I".to_string(),
                    source.address.to_string(),
                    target,
                ])
            }
            ProbeVia::Container { runtime, container } => Command::new(runtime.binary())
                .args(["exec", container.as_str()])
                .args(ping),
            ProbeVia::Pod { namespace, pod } => self
                .kubectl
                .clone()
                .args(["exec", "-n", namespace.as_str(), pod.as_str(), "--"])
                .args(ping),
        }
    }
}

impl<E: CommandExecutor> Prober for ExecProber<E> {
    async fn probe(
        &self,
        source: &Endpoint,
        target: &Endpoint,
        timeout: Duration,
    ) -> Result<bool, ProbeError> {
        let command = self.command(source, target, timeout);
        let output = self.executor.execute(&command).await?;
        debug!(
            source = %source.name,
            target = %target.name,
            exit_code = output.exit_code,
            "Probe finished"
        );
        match output.exit_code {
            0 => Ok(true),
            1 if !output.mentions_any(SETUP_FAILURES) => Ok(false),
            exit_code => Err(ProbeError::Failed {
                command: command.to_string(),
                exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }
}
