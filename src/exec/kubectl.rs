//! Cluster API implementation that drives `kubectl`.

use std::path::PathBuf;

use serde::Deserialize;

use super::{
    ClusterApi, ClusterError, ClusterObject, Command, CommandExecutor, CommandOutput,
    DeleteOutcome, ObjectRef, ResourceKind,
};

const ALREADY_EXISTS: &[&str] = &["AlreadyExists", "already exists"];
const NOT_FOUND: &[&str] = &["NotFound", "not found"];
const NO_RESOURCE_TYPE: &[&str] = &["doesn't have a resource type", "no matches for kind"];

/// Talks to a cluster by running `kubectl` through a [`CommandExecutor`].
///
/// Objects are submitted as JSON on standard input, so nothing is written to
/// disk and no manifest ever passes through a shell.
#[derive(Debug, Clone)]
pub struct KubectlCluster<E> {
    executor: E,
    binary: String,
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl<E> KubectlCluster<E> {
    /// Creates a client using `kubectl` from `PATH` and the current context.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            binary: "kubectl".to_string(),
            context: None,
            kubeconfig: None,
        }
    }

    /// Uses a different `kubectl` binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Pins the kubeconfig context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Uses an explicit kubeconfig file.
    #[must_use]
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Returns the underlying executor.
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// `kubectl` with the configured kubeconfig and context, no verb yet.
    #[must_use]
    pub fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(path) = &self.kubeconfig {
            cmd = cmd.arg("--kubeconfig").arg(path.display().to_string());
        }
        if let Some(context) = &self.context {
            cmd = cmd.args(["--context", context.as_str()]);
        }
        cmd
    }

    fn scoped(cmd: Command, kind: ResourceKind, namespace: Option<&str>) -> Command {
        match namespace {
            Some(ns) if kind.is_namespaced() => cmd.args(["-n", ns]),
            _ => cmd,
        }
    }
}

impl<E: CommandExecutor> KubectlCluster<E> {
    async fn run(&self, cmd: Command) -> Result<CommandOutput, ClusterError> {
        Ok(self.executor.execute(&cmd).await?)
    }
}

fn api_error(operation: &'static str, output: &CommandOutput) -> ClusterError {
    ClusterError::Api {
        operation,
        message: output.stderr.trim().to_string(),
    }
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ListedObject>,
}

#[derive(Deserialize)]
struct ListedObject {
    metadata: ListedMetadata,
}

#[derive(Deserialize)]
struct ListedMetadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

impl<E: CommandExecutor> ClusterApi for KubectlCluster<E> {
    async fn create(&self, object: &ClusterObject) -> Result<ObjectRef, ClusterError> {
        let body = serde_json::to_vec(&object.body).map_err(|source| ClusterError::Decode {
            operation: "create",
            source,
        })?;
        let cmd = Self::scoped(
            self.base_command().arg("create"),
            object.reference.kind,
            object.reference.namespace.as_deref(),
        )
        .args(["-f", "-"])
        .with_stdin(body);

        let output = self.run(cmd).await?;
        if output.success() {
            tracing::debug!(object = %object.reference, "Created");
            return Ok(object.reference.clone());
        }
        if output.mentions_any(ALREADY_EXISTS) {
            return Err(ClusterError::AlreadyExists {
                reference: object.reference.clone(),
            });
        }
        Err(api_error("create", &output))
    }

    async fn get(&self, reference: &ObjectRef) -> Result<Option<serde_json::Value>, ClusterError> {
        let cmd = Self::scoped(
            self.base_command()
                .args(["get", reference.kind.resource(), reference.name.as_str()]),
            reference.kind,
            reference.namespace.as_deref(),
        )
        .args(["-o", "json"]);

        let output = self.run(cmd).await?;
        if !output.success() {
            if output.mentions_any(NOT_FOUND) || output.mentions_any(NO_RESOURCE_TYPE) {
                return Ok(None);
            }
            return Err(api_error("get", &output));
        }
        serde_json::from_str(&output.stdout)
            .map(Some)
            .map_err(|source| ClusterError::Decode {
                operation: "get",
                source,
            })
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<ObjectRef>, ClusterError> {
        let mut cmd = self.base_command().args(["get", kind.resource()]);
        cmd = match namespace {
            Some(ns) => Self::scoped(cmd, kind, Some(ns)),
            None if kind.is_namespaced() => cmd.arg("--all-namespaces"),
            None => cmd,
        };
        if let Some(selector) = label_selector {
            cmd = cmd.args(["-l", selector]);
        }
        cmd = cmd.args(["-o", "json"]);

        let output = self.run(cmd).await?;
        if !output.success() {
            if output.mentions_any(NO_RESOURCE_TYPE) {
                return Ok(Vec::new());
            }
            return Err(api_error("list", &output));
        }
        let list: ObjectList =
            serde_json::from_str(&output.stdout).map_err(|source| ClusterError::Decode {
                operation: "list",
                source,
            })?;

        Ok(list
            .items
            .into_iter()
            .map(|item| ObjectRef {
                kind,
                name: item.metadata.name,
                namespace: item.metadata.namespace,
            })
            .collect())
    }

    async fn delete(&self, reference: &ObjectRef) -> Result<DeleteOutcome, ClusterError> {
        let cmd = Self::scoped(
            self.base_command()
                .args(["delete", reference.kind.resource(), reference.name.as_str()]),
            reference.kind,
            reference.namespace.as_deref(),
        )
        .arg("--wait=false");

        let output = self.run(cmd).await?;
        if output.success() {
            tracing::debug!(object = %reference, "Deleted");
            return Ok(DeleteOutcome::Deleted);
        }
        if output.mentions_any(NOT_FOUND) || output.mentions_any(NO_RESOURCE_TYPE) {
            tracing::debug!(object = %reference, "Already absent");
            return Ok(DeleteOutcome::NotFound);
        }
        Err(api_error("delete", &output))
    }
}

#[cfg(test)]
#[path = "kubectl_tests.rs"]
mod tests;
