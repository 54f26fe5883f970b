//! Mode-aware fail-closed enforcement of `resolve_secrets_for_mode`.
//!
//! All failure tests use globally-unique sentinel env var names that are
//! never set in any CI or dev environment, avoiding `std::env::set_var` and
//! any parallel-test race on env-var mutation. The success test (BACKTEST)
//! requires no env vars by definition.

use fbt_config::load_layered_yaml_from_strings;
use fbt_config::secrets::resolve_secrets_for_mode;

fn load(yaml: &str) -> serde_json::Value {
    load_layered_yaml_from_strings(&[yaml])
        .expect("test yaml must parse cleanly")
        .config_json
}

#[test]
fn live_mode_fails_when_api_key_missing() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_S1_SENTINEL_LIVE_APIKEY_MISSING_A1"
    api_secret: "FBT_S1_SENTINEL_LIVE_APISEC_MISSING_A1"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "LIVE");

    assert!(result.is_err(), "LIVE must fail when venue api_key env var is not set");
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("SECRETS_MISSING"), "error must contain SECRETS_MISSING, got: {msg}");
    assert!(msg.contains("mode=LIVE"), "error must identify LIVE mode, got: {msg}");
    assert!(
        msg.contains("FBT_S1_SENTINEL_LIVE_APIKEY_MISSING_A1"),
        "error must name the missing env var, got: {msg}"
    );
}

#[test]
fn live_mode_fails_when_any_required_key_missing() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_S1_SENTINEL_LIVE_APIKEY_MISSING_B2"
    api_secret: "FBT_S1_SENTINEL_LIVE_APISEC_MISSING_B2"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "LIVE");
    assert!(result.is_err(), "LIVE must fail when required keys are absent");
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("SECRETS_MISSING"), "{msg}");
}

#[test]
fn live_mode_error_references_var_name_not_secret_value() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_S1_SENTINEL_VARNAME_CHECK_C3"
    api_secret: "FBT_S1_SENTINEL_VARSEC_CHECK_C3"
"#;
    let cfg = load(yaml);
    let err_msg = resolve_secrets_for_mode(&cfg, "LIVE").expect_err("must fail").to_string();

    assert!(
        err_msg.contains("FBT_S1_SENTINEL_VARNAME_CHECK_C3"),
        "error must contain the env var NAME, got: {err_msg}"
    );
    assert!(!err_msg.contains("sk-"), "error must not contain secret-like value, got: {err_msg}");
}

#[test]
fn paper_mode_never_requires_venue_credentials() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_S1_SENTINEL_PAPER_APIKEY_ABSENT_D4"
    api_secret: "FBT_S1_SENTINEL_PAPER_APISEC_ABSENT_D4"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "PAPER");
    assert!(result.is_ok(), "PAPER must succeed without venue credentials: {:?}", result.err());
    let secrets = result.unwrap();
    assert!(secrets.venue_api_key.is_none());
    assert!(secrets.venue_api_secret.is_none());
}

#[test]
fn backtest_mode_succeeds_with_no_keys_set() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_S1_SENTINEL_BT_APIKEY_ABSENT_F6"
    api_secret: "FBT_S1_SENTINEL_BT_APISEC_ABSENT_F6"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "BACKTEST");

    assert!(result.is_ok(), "BACKTEST must succeed when no required keys exist: {:?}", result.err());

    let secrets = result.unwrap();
    assert!(secrets.venue_api_key.is_none(), "venue_api_key must be None");
    assert!(secrets.venue_api_secret.is_none(), "venue_api_secret must be None");
}

#[test]
fn unknown_mode_is_rejected() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "SOME_KEY_G7"
    api_secret: "SOME_SECRET_G7"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "SIMULATION");
    assert!(result.is_err(), "unknown mode must be rejected");
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("SECRETS_UNKNOWN_MODE"), "error must contain SECRETS_UNKNOWN_MODE, got: {msg}");
    assert!(msg.contains("SIMULATION"), "error must echo the bad mode string, got: {msg}");
}

#[test]
fn config_json_stores_var_names_not_resolved_values() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_VENUE_API_KEY_PAPER"
    api_secret: "FBT_VENUE_API_SECRET_PAPER"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("must parse");
    let cfg = &loaded.config_json;

    assert_eq!(
        cfg.pointer("/gateway/keys_env/api_key").and_then(|v| v.as_str()),
        Some("FBT_VENUE_API_KEY_PAPER"),
        "config must store var NAME, not value"
    );
    assert_eq!(
        cfg.pointer("/gateway/keys_env/api_secret").and_then(|v| v.as_str()),
        Some("FBT_VENUE_API_SECRET_PAPER"),
    );

    assert!(!loaded.config_hash.is_empty(), "config_hash must be non-empty");
    assert!(!loaded.canonical_json.contains("sk-"), "canonical JSON must not contain secret-like values");
}

#[test]
fn resolved_secrets_debug_output_is_redacted() {
    let yaml = r#"
gateway:
  keys_env:
    api_key: "FBT_S1_SENTINEL_DBG_KEY_H10"
    api_secret: "FBT_S1_SENTINEL_DBG_SEC_H10"
"#;
    let cfg = load(yaml);
    let secrets = resolve_secrets_for_mode(&cfg, "BACKTEST").expect("BACKTEST must not fail");

    let debug_str = format!("{:?}", secrets);

    assert!(
        debug_str.contains("None") || debug_str.contains("REDACTED"),
        "Debug output must show None or REDACTED, got: {debug_str}"
    );
    assert!(!debug_str.contains("sk-"), "Debug must not expose secret values");
}
