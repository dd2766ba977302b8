//! Tests for [`NetworkConfig`] construction and validation.

use super::*;
use crate::cni::Qos;

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn base() -> NetworkConfigBuilder {
    NetworkConfig::builder("eth0")
        .ip_address(ip("192.168.100.10"))
        .netmask("255.255.255.0".parse().unwrap())
        .vlan_id(100)
}

mod valid {
    use super::*;

    #[test]
    fn static_config_exposes_derived_values() {
        let config = base().gateway(ip("192.168.100.1")).build().unwrap();

        assert_eq!(config.interface(), "eth0");
        assert_eq!(config.ip_address(), Some(ip("192.168.100.10")));
        assert_eq!(config.netmask(), Some(ip("255.255.255.0")));
        assert_eq!(config.subnet().unwrap().to_string(), "192.168.100.0/24");
        assert_eq!(config.vlan_id().get(), 100);
        assert_eq!(config.mode(), AddressMode::Static);
    }

    #[test]
    fn cidr_sets_address_and_prefix() {
        let config = NetworkConfig::builder("eth0")
            .cidr("10.0.200.5/16".parse().unwrap())
            .build()
            .unwrap();

        assert_eq!(config.address().unwrap().to_string(), "10.0.200.5/16");
    }

    #[test]
    fn dhcp_needs_no_address() {
        let config = NetworkConfig::builder("eth1")
            .mode(AddressMode::Dhcp)
            .vlan_id(300)
            .build()
            .unwrap();

        assert!(config.address().is_none());
        assert_eq!(config.mode(), AddressMode::Dhcp);
    }

    #[test]
    fn vlan_defaults_to_untagged() {
        let config = NetworkConfig::builder("eth0")
            .cidr("192.168.1.10/24".parse().unwrap())
            .build()
            .unwrap();

        assert!(!config.vlan_id().is_tagged());
    }

    #[test]
    fn display_is_compact() {
        let config = base().gateway(ip("192.168.100.1")).build().unwrap();
        assert_eq!(
            config.to_string(),
            "eth0 vlan=100 static 192.168.100.10/24 via 192.168.100.1"
        );
    }
}

mod invalid {
    use super::*;

    #[test]
    fn vlan_above_range() {
        let err = base().vlan_id(4095).build().unwrap_err();
        assert_eq!(err, NetworkConfigError::VlanOutOfRange { value: 4095 });
    }

    #[test]
    fn static_without_address() {
        let err = NetworkConfig::builder("eth0").build().unwrap_err();
        assert!(matches!(
            err,
            NetworkConfigError::MissingField {
                field: "ip_address",
                ..
            }
        ));
    }

    #[test]
    fn static_without_netmask() {
        let err = NetworkConfig::builder("eth0")
            .ip_address(ip("10.0.0.1"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkConfigError::MissingField {
                field: "netmask",
                ..
            }
        ));
    }

    #[test]
    fn gateway_outside_subnet() {
        let err = base().gateway(ip("10.0.0.1")).build().unwrap_err();
        assert!(matches!(
            err,
            NetworkConfigError::GatewayOutsideSubnet { .. }
        ));
    }

    #[test]
    fn empty_interface() {
        let err = NetworkConfig::builder("")
            .cidr("10.0.0.2/24".parse().unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, NetworkConfigError::InvalidName { .. }));
    }

    #[test]
    fn mtu_out_of_range() {
        assert!(base().mtu(20).build().is_err());
        assert!(base().mtu(65_000).build().is_err());
        assert!(base().mtu(9000).build().is_ok());
    }

    #[test]
    fn blank_workload() {
        let err = base().workload("  ").build().unwrap_err();
        assert!(matches!(
            err,
            NetworkConfigError::InvalidName {
                kind: "workload",
                ..
            }
        ));
    }

    #[test]
    fn zero_rate_qos() {
        let hints = AttachmentHints {
            qos: Some(Qos::new(0, 1_000_000)),
            ..AttachmentHints::default()
        };
        let err = base().attachment(hints).build().unwrap_err();
        assert!(matches!(err, NetworkConfigError::InvalidQos { .. }));
    }
}
