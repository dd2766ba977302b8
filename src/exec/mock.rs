//! In-memory executor and cluster doubles for tests.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::{
    ClusterApi, ClusterError, ClusterObject, Command, CommandExecutor, CommandOutput,
    DeleteOutcome, ExecError, ObjectRef, ResourceKind,
};

enum Reply {
    Output(CommandOutput),
    SpawnFailure,
}

struct Rule {
    pattern: String,
    reply: Reply,
    remaining: Option<usize>,
}

/// Scripted [`CommandExecutor`].
///
/// Rules match when their pattern is a substring of the rendered command
/// line; the most recently added matching rule wins. Unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct MockExecutor {
    rules: Mutex<Vec<Rule>>,
    history: Mutex<Vec<Command>>,
    transfers: Mutex<Vec<(String, String)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: &str, reply: Reply, remaining: Option<usize>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            reply,
            remaining,
        });
    }

    /// Every matching command exits with `code`.
    pub fn respond(&self, pattern: &str, code: i32, stdout: &str, stderr: &str) -> &Self {
        self.push(
            pattern,
            Reply::Output(CommandOutput::new(code, stdout, stderr, Duration::ZERO)),
            None,
        );
        self
    }

    /// Matching commands fail to start.
    pub fn fail_spawn(&self, pattern: &str) -> &Self {
        self.push(pattern, Reply::SpawnFailure, None);
        self
    }

    /// Rendered command lines, in execution order.
    pub fn commands(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Raw commands, in execution order.
    pub fn calls(&self) -> Vec<Command> {
        self.history.lock().unwrap().clone()
    }

    /// Number of executed commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Recorded `(from, to)` transfers.
    pub fn transfers(&self) -> Vec<(String, String)> {
        self.transfers.lock().unwrap().clone()
    }

    fn reply_for(&self, line: &str) -> Option<Result<CommandOutput, ()>> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .rev()
            .find(|r| r.remaining != Some(0) && line.contains(&r.pattern))?;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        match &rule.reply {
            Reply::Output(out) => Some(Ok(out.clone())),
            Reply::SpawnFailure => Some(Err(())),
        }
    }
}

impl CommandExecutor for MockExecutor {
    async fn execute(&self, command: &Command) -> Result<CommandOutput, ExecError> {
        self.history.lock().unwrap().push(command.clone());
        match self.reply_for(&command.to_string()) {
            Some(Ok(out)) => Ok(out),
            Some(Err(())) => Err(ExecError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock spawn failure"),
            }),
            None => Ok(CommandOutput::new(0, "", "", Duration::ZERO)),
        }
    }

    async fn upload(&self, local: &Path, remote: &Path) -> Result<(), ExecError> {
        self.transfers
            .lock()
            .unwrap()
            .push((local.display().to_string(), remote.display().to_string()));
        Ok(())
    }

    async fn download(&self, remote: &Path, local: &Path) -> Result<(), ExecError> {
        self.transfers
            .lock()
            .unwrap()
            .push((remote.display().to_string(), local.display().to_string()));
        Ok(())
    }
}

struct Stored {
    body: serde_json::Value,
    labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<ObjectRef, Stored>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_list: bool,
    created: Vec<ObjectRef>,
    deleted: Vec<ObjectRef>,
    list_calls: usize,
}

/// Stateful in-memory [`ClusterApi`].
///
/// Created objects are stored and can be queried afterwards, so rollback
/// tests can check the cluster really ended up empty.
#[derive(Default)]
pub struct MockCluster {
    state: Mutex<ClusterState>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(self, reference: ObjectRef, labels: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().objects.insert(
            reference,
            Stored {
                body: serde_json::json!({}),
                labels: labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            },
        );
        self
    }

    /// Seeds a running pod with labels.
    pub fn with_pod(self, namespace: &str, name: &str, labels: &[(&str, &str)]) -> Self {
        self.insert(ObjectRef::namespaced(ResourceKind::Pod, namespace, name), labels)
    }

    /// Seeds a daemon set.
    pub fn with_daemonset(self, namespace: &str, name: &str) -> Self {
        self.insert(
            ObjectRef::namespaced(ResourceKind::DaemonSet, namespace, name),
            &[],
        )
    }

    /// Seeds an installed CRD.
    pub fn with_crd(self, name: &str) -> Self {
        self.insert(
            ObjectRef::cluster_scoped(ResourceKind::CustomResourceDefinition, name),
            &[],
        )
    }

    /// Seeds a pre-existing object.
    pub fn with_object(self, reference: ObjectRef) -> Self {
        self.insert(reference, &[])
    }

    /// Makes creation of objects with this name fail.
    pub fn fail_create_of(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    /// Makes deletion of objects with this name fail.
    pub fn fail_delete_of(&self, name: &str) {
        self.state.lock().unwrap().fail_delete.insert(name.to_string());
    }

    /// Stops failing deletions.
    pub fn heal_deletes(&self) {
        self.state.lock().unwrap().fail_delete.clear();
    }

    /// Makes every list call fail.
    pub fn fail_lists(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn contains(&self, reference: &ObjectRef) -> bool {
        self.state.lock().unwrap().objects.contains_key(reference)
    }

    pub fn body_of(&self, reference: &ObjectRef) -> Option<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(reference)
            .map(|s| s.body.clone())
    }

    /// Number of stored objects of writable kinds (fixtures excluded).
    pub fn managed_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|r| {
                !matches!(
                    r.kind,
                    ResourceKind::Pod
                        | ResourceKind::DaemonSet
                        | ResourceKind::CustomResourceDefinition
                )
            })
            .count()
    }

    pub fn created(&self) -> Vec<ObjectRef> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<ObjectRef> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

fn selector_matches(selector: Option<&str>, labels: &BTreeMap<String, String>) -> bool {
    selector.is_none_or(|sel| {
        sel.split(',').all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).is_some_and(|l| l == v.trim()),
            None => labels.contains_key(term.trim()),
        })
    })
}

impl ClusterApi for MockCluster {
    async fn create(&self, object: &ClusterObject) -> Result<ObjectRef, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(&object.reference.name) {
            return Err(ClusterError::Api {
                operation: "create",
                message: format!("admission webhook denied {}", object.reference),
            });
        }
        if state.objects.contains_key(&object.reference) {
            return Err(ClusterError::AlreadyExists {
                reference: object.reference.clone(),
            });
        }
        state.objects.insert(
            object.reference.clone(),
            Stored {
                body: object.body.clone(),
                labels: BTreeMap::new(),
            },
        );
        state.created.push(object.reference.clone());
        Ok(object.reference.clone())
    }

    async fn get(&self, reference: &ObjectRef) -> Result<Option<serde_json::Value>, ClusterError> {
        Ok(self.body_of(reference))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<ObjectRef>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_list {
            return Err(ClusterError::Api {
                operation: "list",
                message: "forbidden".to_string(),
            });
        }
        Ok(state
            .objects
            .iter()
            .filter(|(r, _)| r.kind == kind)
            .filter(|(r, _)| namespace.is_none_or(|ns| r.namespace.as_deref() == Some(ns)))
            .filter(|(_, s)| selector_matches(label_selector, &s.labels))
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn delete(&self, reference: &ObjectRef) -> Result<DeleteOutcome, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete.contains(&reference.name) {
            return Err(ClusterError::Api {
                operation: "delete",
                message: "connection reset".to_string(),
            });
        }
        if state.objects.remove(reference).is_some() {
            state.deleted.push(reference.clone());
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }
}
