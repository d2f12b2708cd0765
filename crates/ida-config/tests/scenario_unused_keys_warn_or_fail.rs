//! Unused-key report per tool
//!
//! GREEN when:
//! - Keys outside a tool's consumed prefixes are reported in Warn mode.
//! - Fail mode turns the same report into an error.
//! - Keys consumed by the tool are never flagged.

use ida_config::{load_layered_yaml_from_strings, report_unused_keys, ToolMode, UnusedKeyPolicy};

const YAML: &str = r#"
staging_folder_suffix: "+"
database:
  host: "db"
  password_env: "X"
service:
  api_url: "http://svc"
legacy:
  metax_v2: true
"#;

#[test]
fn purge_reports_service_and_unknown_sections() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ToolMode::PurgeOrphans, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/legacy/metax_v2".to_string(), "/service/api_url".to_string()]
    );
    assert_eq!(report.mode, "PURGE_ORPHANS");
}

#[test]
fn repair_does_not_consume_database() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(
        ToolMode::RepairTimestamps,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .unwrap();
    assert!(report
        .unused_leaf_pointers
        .contains(&"/database/host".to_string()));
    assert!(!report
        .unused_leaf_pointers
        .contains(&"/service/api_url".to_string()));
}

#[test]
fn fail_policy_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(ToolMode::Audit, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err()
        .to_string();
    assert!(err.contains("CONFIG_UNUSED_KEYS"), "{err}");
    assert!(err.contains("/legacy/metax_v2"), "{err}");
}
