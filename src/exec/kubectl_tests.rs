//! Tests for [`KubectlCluster`] command construction and result mapping.

use std::sync::Arc;

use super::*;
use crate::exec::ExecError;
use crate::exec::mock::MockExecutor;

fn cluster() -> (Arc<MockExecutor>, KubectlCluster<Arc<MockExecutor>>) {
    let executor = Arc::new(MockExecutor::new());
    (Arc::clone(&executor), KubectlCluster::new(executor))
}

fn policy_ref() -> ObjectRef {
    ObjectRef::namespaced(ResourceKind::NetworkPolicy, "lab", "vlan-100-isolation")
}

fn policy_object() -> ClusterObject {
    ClusterObject {
        reference: policy_ref(),
        body: serde_json::json!({"kind": "NetworkPolicy"}),
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn sends_manifest_on_stdin() {
        let (executor, cluster) = cluster();

        let created = cluster.create(&policy_object()).await.unwrap();

        assert_eq!(created, policy_ref());
        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].to_string(),
            "kubectl create -n lab -f -"
        );
        let sent: serde_json::Value =
            serde_json::from_slice(calls[0].stdin.as_deref().unwrap()).unwrap();
        assert_eq!(sent["kind"], "NetworkPolicy");
    }

    #[tokio::test]
    async fn maps_conflict_to_already_exists() {
        let (executor, cluster) = cluster();
        executor.respond(
            "create",
            1,
            "",
            "Error from server (AlreadyExists): networkpolicies \"vlan-100-isolation\" already exists",
        );

        let err = cluster.create(&policy_object()).await.unwrap_err();

        assert!(matches!(err, ClusterError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn other_failures_are_api_errors() {
        let (executor, cluster) = cluster();
        executor.respond("create", 1, "", "Error from server (Forbidden): nope\n");

        let err = cluster.create(&policy_object()).await.unwrap_err();

        match err {
            ClusterError::Api { operation, message } => {
                assert_eq!(operation, "create");
                assert_eq!(message, "Error from server (Forbidden): nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cluster_scoped_objects_have_no_namespace_flag() {
        let (executor, cluster) = cluster();
        let pool = ClusterObject {
            reference: ObjectRef::cluster_scoped(ResourceKind::IpPool, "vlan-100-pool"),
            body: serde_json::json!({}),
        };

        cluster.create(&pool).await.unwrap();

        assert_eq!(executor.commands(), vec!["kubectl create -f -"]);
    }
}

mod get {
    use super::*;

    #[tokio::test]
    async fn parses_json() {
        let (executor, cluster) = cluster();
        executor.respond("get", 0, r#"{"metadata":{"name":"x"}}"#, "");

        let body = cluster.get(&policy_ref()).await.unwrap().unwrap();

        assert_eq!(body["metadata"]["name"], "x");
        assert_eq!(
            executor.commands()[0],
            "kubectl get networkpolicies.networking.k8s.io vlan-100-isolation -n lab -o json"
        );
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let (executor, cluster) = cluster();
        executor.respond("get", 1, "", "Error from server (NotFound): not found");

        assert!(cluster.get(&policy_ref()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_output_is_decode_error() {
        let (executor, cluster) = cluster();
        executor.respond("get", 0, "not json", "");

        let err = cluster.get(&policy_ref()).await.unwrap_err();
        assert!(matches!(err, ClusterError::Decode { operation: "get", .. }));
    }
}

mod list {
    use super::*;

    const PODS: &str = r#"{"items":[
        {"metadata":{"name":"calico-node-abc","namespace":"kube-system"}},
        {"metadata":{"name":"calico-node-def","namespace":"kube-system"}}
    ]}"#;

    #[tokio::test]
    async fn lists_across_namespaces_with_selector() {
        let (executor, cluster) = cluster();
        executor.respond("get pods", 0, PODS, "");

        let pods = cluster
            .list(ResourceKind::Pod, None, Some("k8s-app=calico-node"))
            .await
            .unwrap();

        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].name, "calico-node-abc");
        assert_eq!(pods[0].namespace.as_deref(), Some("kube-system"));
        assert_eq!(
            executor.commands()[0],
            "kubectl get pods --all-namespaces -l k8s-app=calico-node -o json"
        );
    }

    #[tokio::test]
    async fn unknown_resource_type_is_empty() {
        let (executor, cluster) = cluster();
        executor.respond(
            "get",
            1,
            "",
            "error: the server doesn't have a resource type \"ippools\"",
        );

        let pools = cluster.list(ResourceKind::IpPool, None, None).await.unwrap();
        assert!(pools.is_empty());
    }

    #[tokio::test]
    async fn honors_context_and_kubeconfig() {
        let executor = Arc::new(MockExecutor::new());
        executor.respond("get", 0, r#"{"items":[]}"#, "");
        let cluster = KubectlCluster::new(Arc::clone(&executor))
            .with_binary("/usr/local/bin/kubectl")
            .with_kubeconfig("/tmp/kc")
            .with_context("kind-lab");

        cluster
            .list(ResourceKind::DaemonSet, Some("kube-system"), None)
            .await
            .unwrap();

        assert_eq!(
            executor.commands()[0],
            "/usr/local/bin/kubectl --kubeconfig /tmp/kc --context kind-lab get daemonsets.apps -n kube-system -o json"
        );
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn reports_deleted() {
        let (executor, cluster) = cluster();

        let outcome = cluster.delete(&policy_ref()).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(
            executor.commands()[0],
            "kubectl delete networkpolicies.networking.k8s.io vlan-100-isolation -n lab --wait=false"
        );
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (executor, cluster) = cluster();
        executor.respond("delete", 1, "", "Error from server (NotFound): gone");

        assert_eq!(
            cluster.delete(&policy_ref()).await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn spawn_failure_propagates() {
        let (executor, cluster) = cluster();
        executor.fail_spawn("kubectl");

        let err = cluster.delete(&policy_ref()).await.unwrap_err();
        assert!(matches!(err, ClusterError::Exec(ExecError::Spawn { .. })));
    }
}
