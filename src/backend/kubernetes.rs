//! Kubernetes backend: CNI detection, attachment rendering and object CRUD.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    Backend, BackendError, BackendHandle, BackendObjectSpec, BuildPlan, IsolationSupport,
    ObjectRecorder, unexpected,
};
use crate::cni::{AttachmentBuilder, CapabilityCache, IsolationMode, detect, detect_cached};
use crate::exec::{ClusterApi, ClusterError, DeleteOutcome};
use crate::network::{NetworkConfig, PlatformKind};

/// Realizes configurations as cluster objects in one namespace.
#[derive(Debug)]
pub struct KubernetesBackend<K> {
    cluster: K,
    builder: AttachmentBuilder,
    cache: Option<Arc<CapabilityCache>>,
    reuse_existing: bool,
}

impl<K> KubernetesBackend<K> {
    /// Creates a backend that detects plugins on every build.
    pub fn new(cluster: K, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            builder: AttachmentBuilder::new(namespace),
            cache: None,
            reuse_existing: false,
        }
    }

    /// Shares a capability cache across builds.
    #[must_use]
    pub fn with_capability_cache(mut self, cache: Arc<CapabilityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Accepts pre-existing objects with the same name instead of failing.
    ///
    /// Per-VLAN pools and policies are shared by every endpoint on the VLAN,
    /// so the second apply on a VLAN finds them already present.
    #[must_use]
    pub const fn with_reuse_existing(mut self, reuse: bool) -> Self {
        self.reuse_existing = reuse;
        self
    }

    /// Namespace objects are created in.
    pub fn namespace(&self) -> &str {
        self.builder.namespace()
    }

    pub const fn cluster(&self) -> &K {
        &self.cluster
    }
}

impl<K: ClusterApi> Backend for KubernetesBackend<K> {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Kubernetes
    }

    async fn build(&self, config: &NetworkConfig) -> Result<BuildPlan, BackendError> {
        self.builder.validate(config)?;
        let caps = match &self.cache {
            Some(cache) => detect_cached(&self.cluster, cache).await,
            None => detect(&self.cluster).await,
        };
        let spec = self.builder.build(config, &caps)?;
        let isolation = match spec.isolation_mode {
            IsolationMode::LinkLayer | IsolationMode::IpPool | IsolationMode::Flat => {
                IsolationSupport::Enforced
            }
            IsolationMode::LabelOnly => IsolationSupport::LabelOnly,
        };
        let reuse_existing = self.reuse_existing || config.attachment().reuse_existing;

        let objects = spec
            .cluster_objects()?
            .into_iter()
            .map(|object| BackendObjectSpec::ClusterObject {
                object,
                reuse_existing,
            })
            .collect();
        Ok(BuildPlan { objects, isolation })
    }

    async fn apply_one(
        &self,
        spec: &BackendObjectSpec,
        recorder: &mut ObjectRecorder<'_>,
    ) -> Result<(), BackendError> {
        let BackendObjectSpec::ClusterObject {
            object,
            reuse_existing,
        } = spec
        else {
            return Err(unexpected(PlatformKind::Kubernetes, spec));
        };

        match self.cluster.create(object).await {
            Ok(reference) => {
                info!(object = %reference, "Created");
                recorder.record(BackendHandle::ClusterObject { reference });
                Ok(())
            }
            Err(ClusterError::AlreadyExists { reference }) if *reuse_existing => {
                // Owned by whoever created it first; not ours to roll back.
                info!(object = %reference, "Already exists, reusing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn verify(&self, handles: &[BackendHandle]) -> Result<bool, BackendError> {
        for handle in handles {
            let BackendHandle::ClusterObject { reference } = handle else {
                return Err(unexpected(PlatformKind::Kubernetes, handle));
            };
            if self.cluster.get(reference).await?.is_none() {
                warn!(object = %reference, "Object missing from cluster");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn teardown_one(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let BackendHandle::ClusterObject { reference } = handle else {
            return Err(unexpected(PlatformKind::Kubernetes, handle));
        };
        match self.cluster.delete(reference).await? {
            DeleteOutcome::Deleted => debug!(object = %reference, "Deleted"),
            DeleteOutcome::NotFound => debug!(object = %reference, "Already absent"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AppliedObject;
    use crate::exec::mock::MockCluster;
    use crate::exec::{ObjectRef, ResourceKind};

    fn config(vlan: u32, workload: &str) -> NetworkConfig {
        NetworkConfig::builder("eth0")
            .cidr("192.168.100.10/24".parse().unwrap())
            .vlan_id(vlan)
            .workload(workload)
            .build()
            .unwrap()
    }

    fn multus() -> MockCluster {
        MockCluster::new().with_daemonset("kube-system", "kube-multus-ds")
    }

    fn calico() -> MockCluster {
        MockCluster::new().with_daemonset("kube-system", "calico-node")
    }

    async fn apply<K: ClusterApi>(
        backend: &KubernetesBackend<K>,
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

    #[tokio::test]
    async fn multus_creates_attachment_definition() {
        let backend = KubernetesBackend::new(multus(), "lab");
        let plan = backend.build(&config(100, "a")).await.unwrap();

        let (objects, result) = apply(&backend, &plan).await;

        result.unwrap();
        let reference = ObjectRef::namespaced(ResourceKind::NetworkAttachmentDefinition, "lab", "vlan-100-a");
        assert!(backend.cluster().contains(&reference));
        assert_eq!(objects.len(), 1);
        assert_eq!(plan.isolation, IsolationSupport::Enforced);
    }

    #[tokio::test]
    async fn label_only_plan_is_reported() {
        let cluster = MockCluster::new().with_daemonset("kube-system", "weave-net");
        let backend = KubernetesBackend::new(cluster, "lab");

        let plan = backend.build(&config(100, "a")).await.unwrap();

        assert_eq!(plan.isolation, IsolationSupport::LabelOnly);
    }

    #[tokio::test]
    async fn flannel_only_cluster_cannot_isolate() {
        let cluster = MockCluster::new().with_daemonset("kube-system", "kube-flannel-ds");
        let backend = KubernetesBackend::new(cluster, "lab");

        let err = backend.build(&config(100, "a")).await.unwrap_err();

        assert!(matches!(
            err,
            BackendError::Cni(crate::cni::CniError::UnsupportedPlatformCapability { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_namespace_fails_before_detection() {
        let backend = KubernetesBackend::new(multus(), "Lab_Net");

        let err = backend.build(&config(100, "a")).await.unwrap_err();

        assert!(matches!(
            err,
            BackendError::Cni(crate::cni::CniError::InvalidName(_))
        ));
        assert_eq!(backend.cluster().list_calls(), 0);
    }

    #[tokio::test]
    async fn shared_vlan_objects_are_reused_not_recorded() {
        let backend = KubernetesBackend::new(calico(), "lab").with_reuse_existing(true);
        let first = backend.build(&config(100, "a")).await.unwrap();
        let second = backend
            .build(
                &NetworkConfig::builder("eth0")
                    .cidr("192.168.100.11/24".parse().unwrap())
                    .vlan_id(100)
                    .workload("b")
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();

        let (created, r1) = apply(&backend, &first).await;
        let (reused, r2) = apply(&backend, &second).await;

        r1.unwrap();
        r2.unwrap();
        assert_eq!(created.len(), 2);
        assert!(reused.is_empty());
    }

    #[tokio::test]
    async fn existing_object_fails_without_reuse() {
        let backend = KubernetesBackend::new(calico(), "lab");
        let plan = backend.build(&config(100, "a")).await.unwrap();
        apply(&backend, &plan).await.1.unwrap();

        let (objects, result) = apply(&backend, &plan).await;

        assert!(matches!(
            result,
            Err(BackendError::Cluster(ClusterError::AlreadyExists { .. }))
        ));
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn cached_capabilities_skip_detection() {
        let cache = Arc::new(CapabilityCache::new());
        let backend =
            KubernetesBackend::new(multus(), "lab").with_capability_cache(Arc::clone(&cache));

        backend.build(&config(100, "a")).await.unwrap();
        let after_first = backend.cluster().list_calls();
        backend.build(&config(200, "b")).await.unwrap();

        assert_eq!(backend.cluster().list_calls(), after_first);
        assert!(cache.get().is_some());
    }

    #[tokio::test]
    async fn verify_and_idempotent_teardown() {
        let backend = KubernetesBackend::new(multus(), "lab");
        let plan = backend.build(&config(100, "a")).await.unwrap();
        let (objects, _) = apply(&backend, &plan).await;
        let handles: Vec<_> = objects.iter().map(|o| o.handle.clone()).collect();

        assert!(backend.verify(&handles).await.unwrap());
        backend.teardown_one(&handles[0]).await.unwrap();
        assert!(!backend.verify(&handles).await.unwrap());
        backend.teardown_one(&handles[0]).await.unwrap();
        assert_eq!(backend.cluster().managed_count(), 0);
    }
}
