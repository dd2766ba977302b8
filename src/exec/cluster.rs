//! Cluster object types and the cluster API trait.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ClusterError;

/// The kinds of cluster objects this crate reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Multus secondary-network definition.
    NetworkAttachmentDefinition,
    /// Kubernetes `NetworkPolicy`.
    NetworkPolicy,
    /// Cilium's extended network policy.
    CiliumNetworkPolicy,
    /// Calico address pool.
    IpPool,
    /// Workload pod (read-only, used by detection).
    Pod,
    /// Daemon set (read-only, used by detection).
    DaemonSet,
    /// Custom resource definition (read-only, used by detection).
    CustomResourceDefinition,
}

impl ResourceKind {
    /// The `apiVersion` objects of this kind are written with.
    #[must_use]
    pub const fn api_version(self) -> &'static str {
        match self {
            Self::NetworkAttachmentDefinition => "k8s.cni.cncf.io/v1",
            Self::NetworkPolicy => "networking.k8s.io/v1",
            Self::CiliumNetworkPolicy => "cilium.io/v2",
            Self::IpPool => "projectcalico.org/v3",
            Self::Pod => "v1",
            Self::DaemonSet => "apps/v1",
            Self::CustomResourceDefinition => "apiextensions.k8s.io/v1",
        }
    }

    /// The object `kind` field.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::NetworkAttachmentDefinition => "NetworkAttachmentDefinition",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::CiliumNetworkPolicy => "CiliumNetworkPolicy",
            Self::IpPool => "IPPool",
            Self::Pod => "Pod",
            Self::DaemonSet => "DaemonSet",
            Self::CustomResourceDefinition => "CustomResourceDefinition",
        }
    }

    /// Fully qualified resource name as accepted by `kubectl`.
    #[must_use]
    pub const fn resource(self) -> &'static str {
        match self {
            Self::NetworkAttachmentDefinition => "network-attachment-definitions.k8s.cni.cncf.io",
            Self::NetworkPolicy => "networkpolicies.networking.k8s.io",
            Self::CiliumNetworkPolicy => "ciliumnetworkpolicies.cilium.io",
            Self::IpPool => "ippools.projectcalico.org",
            Self::Pod => "pods",
            Self::DaemonSet => "daemonsets.apps",
            Self::CustomResourceDefinition => "customresourcedefinitions.apiextensions.k8s.io",
        }
    }

    /// Returns true for kinds that live inside a namespace.
    #[must_use]
    pub const fn is_namespaced(self) -> bool {
        !matches!(self, Self::IpPool | Self::CustomResourceDefinition)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Identifies one cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object kind.
    pub kind: ResourceKind,
    /// Object name.
    pub name: String,
    /// Namespace; `None` for cluster-scoped kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Creates a reference to a namespaced object.
    #[must_use]
    pub fn namespaced(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Creates a reference to a cluster-scoped object.
    #[must_use]
    pub fn cluster_scoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A fully rendered object ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterObject {
    /// Where the object will live.
    pub reference: ObjectRef,
    /// The complete manifest (`apiVersion`, `kind`, `metadata`, ...).
    pub body: serde_json::Value,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object existed and was removed.
    Deleted,
    /// The object was already gone.
    NotFound,
}

/// Trait for the subset of the Kubernetes API this crate needs.
///
/// # Design
///
/// "Already exists" is reported as [`ClusterError::AlreadyExists`] and
/// "not found" on delete as [`DeleteOutcome::NotFound`], so callers can
/// decide idempotency themselves instead of parsing messages.
pub trait ClusterApi: Send + Sync {
    /// Creates an object and returns its reference.
    fn create(
        &self,
        object: &ClusterObject,
    ) -> impl Future<Output = Result<ObjectRef, ClusterError>> + Send;

    /// Fetches an object, or `None` when it does not exist.
    fn get(
        &self,
        reference: &ObjectRef,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, ClusterError>> + Send;

    /// Lists objects of a kind, optionally narrowed by namespace and label
    /// selector. `namespace: None` lists across all namespaces.
    fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> impl Future<Output = Result<Vec<ObjectRef>, ClusterError>> + Send;

    /// Deletes an object.
    fn delete(
        &self,
        reference: &ObjectRef,
    ) -> impl Future<Output = Result<DeleteOutcome, ClusterError>> + Send;
}

impl<K: ClusterApi> ClusterApi for Arc<K> {
    fn create(
        &self,
        object: &ClusterObject,
    ) -> impl Future<Output = Result<ObjectRef, ClusterError>> + Send {
        (**self).create(object)
    }

    fn get(
        &self,
        reference: &ObjectRef,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, ClusterError>> + Send {
        (**self).get(reference)
    }

    fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> impl Future<Output = Result<Vec<ObjectRef>, ClusterError>> + Send {
        (**self).list(kind, namespace, label_selector)
    }

    fn delete(
        &self,
        reference: &ObjectRef,
    ) -> impl Future<Output = Result<DeleteOutcome, ClusterError>> + Send {
        (**self).delete(reference)
    }
}
