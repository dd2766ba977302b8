use std::sync::Arc;

use super::*;
use crate::exec::mock::MockExecutor;
use crate::network::AddressMode;

fn backend() -> (Arc<MockExecutor>, LinuxBackend<Arc<MockExecutor>>) {
    let exec = Arc::new(MockExecutor::new());
    (Arc::clone(&exec), LinuxBackend::new(exec))
}

fn tagged(vlan: u32) -> NetworkConfig {
    NetworkConfig::builder("eth0")
        .cidr("192.168.100.10/24".parse().unwrap())
        .gateway("192.168.100.1".parse().unwrap())
        .vlan_id(vlan)
        .build()
        .unwrap()
}

async fn apply_all(
    backend: &LinuxBackend<Arc<MockExecutor>>,
    plan: &BuildPlan,
) -> (Vec<crate::backend::AppliedObject>, Result<(), BackendError>) {
    let mut objects = Vec::new();
    let mut result = Ok(());
    for spec in &plan.objects {
        let mut recorder = ObjectRecorder::new("eth0", &mut objects);
        if let Err(e) = backend.apply_one(spec, &mut recorder).await {
            result = Err(e);
            break;
        }
    }
    (objects, result)
}

mod build {
    use super::*;

    #[tokio::test]
    async fn tagged_config_plans_a_vlan_link() {
        let (_, backend) = backend();

        let plan = backend.build(&tagged(100)).await.unwrap();

        assert_eq!(plan.isolation, IsolationSupport::Enforced);
        let [BackendObjectSpec::VlanLink(link)] = plan.objects.as_slice() else {
            panic!("unexpected plan {:?}", plan.objects);
        };
        assert_eq!(link.parent, "eth0");
        assert_eq!(link.name, "eth0.100");
    }

    #[tokio::test]
    async fn untagged_config_plans_a_plain_address() {
        let (exec, backend) = backend();

        let plan = backend.build(&tagged(0)).await.unwrap();

        assert!(matches!(
            plan.objects.as_slice(),
            [BackendObjectSpec::LinuxAddress(_)]
        ));
        assert_eq!(exec.count("modprobe"), 0);
    }

    #[tokio::test]
    async fn loads_module_when_missing() {
        let (exec, backend) = backend();
        exec.respond("test -d /sys/module/8021q", 1, "", "");

        backend.build(&tagged(100)).await.unwrap();

        assert_eq!(exec.count("modprobe 8021q"), 1);
    }

    #[tokio::test]
    async fn missing_module_is_reported() {
        let (exec, backend) = backend();
        exec.respond("test -d", 1, "", "")
            .respond("modprobe", 1, "", "FATAL: Module 8021q not found");

        let err = backend.build(&tagged(100)).await.unwrap_err();

        let BackendError::MissingKernelCapability { module, detail } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(module, VLAN_MODULE);
        assert!(detail.contains("not found"));
    }

    #[tokio::test]
    async fn long_sub_interface_name_is_rejected() {
        let (_, backend) = backend();
        let config = NetworkConfig::builder("enp0s31f6xy")
            .cidr("10.0.0.2/24".parse().unwrap())
            .vlan_id(4000)
            .build()
            .unwrap();

        let err = backend.build(&config).await.unwrap_err();

        assert!(matches!(err, BackendError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn build_does_not_mutate() {
        let (exec, backend) = backend();

        backend.build(&tagged(100)).await.unwrap();

        assert!(exec.commands().iter().all(|c| !c.starts_with("ip ")));
    }
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn creates_link_address_and_route() {
        let (exec, backend) = backend();
        let plan = backend.build(&tagged(100)).await.unwrap();

        let (objects, result) = apply_all(&backend, &plan).await;

        result.unwrap();
        assert_eq!(
            objects[0].handle,
            BackendHandle::LinuxLink {
                name: "eth0.100".into()
            }
        );
        let ip: Vec<_> = exec
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("ip "))
            .collect();
        assert_eq!(
            ip,
            vec![
                "ip -o link show dev eth0.100",
                "ip link add link eth0 name eth0.100 type vlan id 100",
                "ip addr add 192.168.100.10/24 dev eth0.100",
                "ip link set dev eth0.100 up",
                "ip route add default via 192.168.100.1 dev eth0.100 metric 1100",
            ]
        );
    }

    #[tokio::test]
    async fn link_is_recorded_before_later_steps_fail() {
        let (exec, backend) = backend();
        exec.respond("ip addr add", 2, "", "RTNETLINK answers: File exists");
        let plan = backend.build(&tagged(100)).await.unwrap();

        let (objects, result) = apply_all(&backend, &plan).await;

        assert!(matches!(result, Err(BackendError::CommandFailed { .. })));
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn dhcp_starts_client_and_records_it() {
        let (exec, backend) = backend();
        let config = NetworkConfig::builder("eth0")
            .mode(AddressMode::Dhcp)
            .vlan_id(200)
            .build()
            .unwrap();
        let plan = backend.build(&config).await.unwrap();

        let (objects, result) = apply_all(&backend, &plan).await;

        result.unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(exec.count("dhclient -1 eth0.200"), 1);
        assert_eq!(exec.count("ip addr add"), 0);
    }

    #[tokio::test]
    async fn existing_link_is_shared_not_recreated() {
        let (exec, backend) = backend();
        exec.respond(
            "ip -o link show dev eth0.100",
            0,
            "7: eth0.100@eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500",
            "",
        );
        let plan = backend.build(&tagged(100)).await.unwrap();

        let (objects, result) = apply_all(&backend, &plan).await;

        result.unwrap();
        assert_eq!(exec.count("ip link add"), 0);
        assert_eq!(exec.count("ip addr add 192.168.100.10/24 dev eth0.100"), 1);
        let [object] = objects.as_slice() else {
            panic!("unexpected objects {objects:?}");
        };
        assert_eq!(
            object.handle,
            BackendHandle::LinuxAddress {
                interface: "eth0.100".into(),
                address: "192.168.100.10/24".parse().unwrap(),
            }
        );

        backend.teardown_one(&object.handle).await.unwrap();
        assert_eq!(exec.count("ip link delete"), 0);
    }

    #[tokio::test]
    async fn dhcp_waits_for_a_lease() {
        let (exec, backend) = backend();
        exec.respond("dhclient -1", 2, "", "No DHCPOFFERS received.");
        let config = NetworkConfig::builder("eth0")
            .mode(AddressMode::Dhcp)
            .vlan_id(200)
            .build()
            .unwrap();
        let plan = backend.build(&config).await.unwrap();

        let (objects, result) = apply_all(&backend, &plan).await;

        assert!(matches!(result, Err(BackendError::CommandFailed { .. })));
        assert_eq!(exec.count("dhclient -nw"), 0);
        assert!(
            objects
                .iter()
                .all(|o| !matches!(o.handle, BackendHandle::LinuxDhcp { .. }))
        );
    }

    #[tokio::test]
    async fn sudo_prefixes_mutating_commands() {
        let exec = Arc::new(MockExecutor::new());
        let backend = LinuxBackend::new(Arc::clone(&exec)).with_sudo();
        let plan = backend.build(&tagged(100)).await.unwrap();

        apply_all(&backend, &plan).await.1.unwrap();

        assert_eq!(exec.count("sudo -n ip link add"), 1);
        assert_eq!(exec.count("sudo -n test"), 0);
    }

    #[tokio::test]
    async fn rejects_foreign_specs() {
        let (_, backend) = backend();
        let spec = BackendObjectSpec::ContainerNetwork(crate::backend::ContainerNetworkSpec {
            name: "n".into(),
            parent: "eth0".into(),
            subnet: "10.0.0.0/24".parse().unwrap(),
            gateway: None,
        });
        let mut objects = Vec::new();

        let err = backend
            .apply_one(&spec, &mut ObjectRecorder::new("eth0", &mut objects))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::UnexpectedObject { .. }));
    }
}

mod verify_and_teardown {
    use super::*;

    fn link() -> BackendHandle {
        BackendHandle::LinuxLink {
            name: "eth0.100".into(),
        }
    }

    #[tokio::test]
    async fn up_link_verifies() {
        let (exec, backend) = backend();
        exec.respond(
            "ip -o link show dev eth0.100",
            0,
            "7: eth0.100@eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500",
            "",
        );

        assert!(backend.verify(&[link()]).await.unwrap());
    }

    #[tokio::test]
    async fn missing_link_fails_verification() {
        let (exec, backend) = backend();
        exec.respond("ip -o link show", 1, "", "Device \"eth0.100\" does not exist.");

        assert!(!backend.verify(&[link()]).await.unwrap());
    }

    #[tokio::test]
    async fn address_must_be_present() {
        let (exec, backend) = backend();
        exec.respond(
            "ip -o -4 addr show dev eth0",
            0,
            "2: eth0    inet 10.0.0.9/24 brd 10.0.0.255 scope global eth0",
            "",
        );
        let handle = BackendHandle::LinuxAddress {
            interface: "eth0".into(),
            address: "10.0.0.5/24".parse().unwrap(),
        };

        assert!(!backend.verify(&[handle]).await.unwrap());
    }

    #[tokio::test]
    async fn teardown_tolerates_absent_link() {
        let (exec, backend) = backend();
        exec.respond("ip link delete", 1, "", "Cannot find device \"eth0.100\"");

        backend.teardown_one(&link()).await.unwrap();
        backend.teardown_one(&link()).await.unwrap();

        assert_eq!(exec.count("ip link delete dev eth0.100"), 2);
    }

    #[tokio::test]
    async fn teardown_reports_real_failures() {
        let (exec, backend) = backend();
        exec.respond("ip link delete", 2, "", "Operation not permitted");

        let err = backend.teardown_one(&link()).await.unwrap_err();

        assert!(matches!(err, BackendError::CommandFailed { exit_code: 2, .. }));
    }
}
