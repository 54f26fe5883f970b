//! Unused-keys config hygiene: Warn reports without failing, Fail errors,
//! consumed keys don't false-positive, siblings of a leaf-exact
//! registration are not swallowed, and unused-pointer ordering is stable.

use fbt_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

const PAPER_YAML: &str = r#"
runtime:
  mode: paper
symbols: ["BTC_USDT"]
strategy:
  min_expected_apr_e6: 50000
cost:
  taker_fee_bps_roundtrip: 10
gateway:
  base_url: "https://example.invalid"
risk:
  loss_cut_daily_micros: -100
daemon:
  serve: false
"#;

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = format!("{PAPER_YAML}\nunused_section:\n  foo: 1\n  bar: 2\n");
    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(!report.is_clean(), "report should detect unused keys");
    assert!(report.unused_leaf_pointers.contains(&"/unused_section/foo".to_string()));
    assert!(report.unused_leaf_pointers.contains(&"/unused_section/bar".to_string()));
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = format!("{PAPER_YAML}\nunused_section:\n  foo: 1\n");
    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let result = report_unused_keys(ConfigMode::Live, &loaded.config_json, UnusedKeyPolicy::Fail);

    assert!(result.is_err(), "fail policy must error when unused keys exist");
    let msg = format!("{:?}", result.err().unwrap());
    assert!(msg.contains("CONFIG_UNUSED_KEYS"), "error message should contain CONFIG_UNUSED_KEYS");
}

#[test]
fn only_consumed_keys_are_clean_in_paper_mode() {
    let loaded = load_layered_yaml_from_strings(&[PAPER_YAML]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(report.is_clean(), "config should be clean when it only uses consumed keys");
}

#[test]
fn live_only_flag_is_unused_in_paper_mode() {
    // PAPER never registers /allow_live, only LIVE does.
    let yaml = format!("{PAPER_YAML}\nallow_live: false\n");
    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(report.unused_leaf_pointers.contains(&"/allow_live".to_string()));

    let live_report = report_unused_keys(ConfigMode::Live, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");
    assert!(!live_report.unused_leaf_pointers.contains(&"/allow_live".to_string()));
}

#[test]
fn deterministic_unused_pointer_ordering() {
    let yaml = format!("{PAPER_YAML}\nunused:\n  b: 2\n  a: 1\n");
    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/unused/a".to_string(), "/unused/b".to_string()],
        "unused pointers must be sorted deterministically"
    );
}
