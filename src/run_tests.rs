//! Tests for subcommand execution helpers.

use super::*;
use tempfile::TempDir;
use vlan_isolate::backend::{Backend, BackendHandle};
use vlan_isolate::config::{PlatformArg, ScenarioArgs, ScenarioFile};
use vlan_isolate::engine::{EngineState, Verification};
use vlan_isolate::scenario::CheckOutcome;

fn link(interface: &str, vlan: u16) -> AppliedObject {
    AppliedObject {
        interface: interface.to_string(),
        handle: BackendHandle::LinuxLink {
            name: format!("{interface}.{vlan}"),
        },
    }
}

fn record(endpoint: &str, objects: Vec<AppliedObject>) -> ApplyRecord {
    ApplyRecord::new(
        endpoint,
        PlatformKind::Linux,
        ApplyResult {
            success: true,
            state: EngineState::Done,
            applied_objects: objects,
            verification: Verification::Pass,
            error: None,
            warnings: Vec::new(),
            transitions: vec![EngineState::Pending, EngineState::Done],
        },
    )
}

fn scenario(args: &ScenarioArgs, content: Option<&str>) -> ValidatedScenario {
    let file = content.map(|c| ScenarioFile::parse(c).unwrap());
    ValidatedScenario::from_raw(args, file.as_ref()).unwrap()
}

mod run_error {
    use super::*;

    #[test]
    fn scenario_failed_displays_counts() {
        let err = RunError::ScenarioFailed {
            applied: 2,
            total: 3,
            failed_checks: 1,
        };
        assert_eq!(
            err.to_string(),
            "Scenario failed: 2 of 3 endpoints applied, 1 checks failed"
        );
    }

    #[test]
    fn config_error_is_transparent() {
        let err: RunError = ConfigError::missing(field::PLATFORM, "hint").into();
        assert_eq!(err.to_string(), "Missing required field: platform. hint");
    }
}

mod requirements {
    use super::*;

    #[test]
    fn platform_is_required_for_apply() {
        let err = require_platform(&scenario(&ScenarioArgs::default(), None)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired { field: f, .. } if f == field::PLATFORM
        ));
    }

    #[test]
    fn platform_from_cli() {
        let args = ScenarioArgs {
            platform: Some(PlatformArg::Windows),
            ..ScenarioArgs::default()
        };
        assert_eq!(
            require_platform(&scenario(&args, None)).unwrap(),
            PlatformKind::Windows
        );
    }

    #[test]
    fn state_file_is_required_for_teardown() {
        let err = require_state_store(&scenario(&ScenarioArgs::default(), None)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired { field: f, .. } if f == field::STATE_FILE
        ));
    }

    #[test]
    fn state_store_uses_configured_path() {
        let args = ScenarioArgs {
            state_file: Some("/tmp/vlan-state.json".into()),
            ..ScenarioArgs::default()
        };
        let store = require_state_store(&scenario(&args, None)).unwrap();
        assert_eq!(store.path().to_str().unwrap(), "/tmp/vlan-state.json");
    }
}

mod engine_wiring {
    use super::*;

    #[test]
    fn every_platform_has_a_backend() {
        let engine = build_engine(&scenario(&ScenarioArgs::default(), None));

        for platform in [
            PlatformKind::Linux,
            PlatformKind::Windows,
            PlatformKind::Container,
            PlatformKind::Kubernetes,
        ] {
            let backend = engine.backend(platform).unwrap();
            assert_eq!(backend.kind(), platform);
        }
    }

    #[test]
    fn kubernetes_backend_uses_scenario_namespace() {
        let engine = build_engine(&scenario(
            &ScenarioArgs::default(),
            Some("[kubernetes]\nnamespace = \"lab\"\n"),
        ));

        match engine.backend(PlatformKind::Kubernetes) {
            Some(PlatformBackend::Kubernetes(backend)) => assert_eq!(backend.namespace(), "lab"),
            other => panic!("Expected Kubernetes backend, got {other:?}"),
        }
    }
}

mod state_records {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));

        assert!(load_records(&store).unwrap().is_empty());
    }

    #[test]
    fn corrupted_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_records(&FileStateStore::new(&path)).unwrap_err();
        assert!(matches!(err, RunError::StateCorrupted { .. }));
    }

    #[tokio::test]
    async fn saved_records_load_back() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        let records = vec![record("a", vec![link("eth0", 100)])];

        save(Some(&store), &records).await.unwrap();

        assert_eq!(load_records(&store).unwrap(), records);
    }

    #[tokio::test]
    async fn save_without_store_is_a_no_op() {
        save(None, &[record("a", vec![link("eth0", 100)])])
            .await
            .unwrap();
    }

    #[test]
    fn remaining_keeps_only_leftovers() {
        let records = vec![
            record("a", vec![link("eth0", 100), link("eth0", 101)]),
            record("b", vec![link("eth1", 200)]),
        ];

        let remaining = remaining_records(records, &[link("eth0", 101)]);

        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].endpoint, "a");
        assert_eq!(remaining[0].result.applied_objects, vec![link("eth0", 101)]);
    }

    #[test]
    fn remaining_is_empty_after_clean_teardown() {
        let records = vec![record("a", vec![link("eth0", 100)])];
        assert!(remaining_records(records, &[]).is_empty());
    }
}

mod reporting {
    use super::*;

    fn check(passed: bool) -> CheckOutcome {
        CheckOutcome {
            source: "a".into(),
            target: "b".into(),
            expect: vlan_isolate::config::Expectation::Isolated,
            passed,
        }
    }

    #[test]
    fn summary_flattens_report() {
        let report = ScenarioReport {
            records: vec![record("a", vec![link("eth0", 100)])],
            checks: vec![check(true)],
            cancelled: false,
        };

        let json: serde_json::Value =
            serde_json::from_str(&render_summary(&report, 1).unwrap()).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["records"][0]["endpoint"], "a");
        assert_eq!(json["checks"][0]["expect"], "isolated");
        assert_eq!(json["cancelled"], false);
    }

    #[test]
    fn outcome_ok_when_everything_passed() {
        let report = ScenarioReport {
            records: vec![record("a", vec![])],
            checks: vec![check(true)],
            cancelled: false,
        };
        assert!(scenario_outcome(&report, 1).is_ok());
    }

    #[test]
    fn outcome_counts_failures() {
        let report = ScenarioReport {
            records: vec![record("a", vec![])],
            checks: vec![check(false), check(true)],
            cancelled: false,
        };

        let err = scenario_outcome(&report, 2).unwrap_err();

        assert!(matches!(
            err,
            RunError::ScenarioFailed {
                applied: 1,
                total: 2,
                failed_checks: 1
            }
        ));
    }
}
