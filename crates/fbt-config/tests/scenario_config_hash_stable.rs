//! Config hash stability: same input hashes identically, key reordering is
//! absorbed by canonicalization, different content diverges, and merged
//! layers hash stably across repeated merges.

use fbt_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
runtime:
  mode: "paper"
risk:
  loss_cut_daily_micros: -100000000
  rebalance_band_bps: 500
gateway:
  venue: "example"
  base_url: "https://example.invalid"
"#;

/// Same content as BASE_YAML but with keys in different order.
const BASE_YAML_REORDERED: &str = r#"
risk:
  rebalance_band_bps: 500
  loss_cut_daily_micros: -100000000
gateway:
  base_url: "https://example.invalid"
  venue: "example"
runtime:
  mode: "paper"
"#;

const OVERLAY_YAML: &str = r#"
runtime:
  mode: "live"
risk:
  loss_cut_daily_micros: -50000000
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash, "same YAML input must produce identical hash");
    assert_eq!(a.canonical_json, b.canonical_json, "canonical JSON must be identical for same input");
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();

    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash (canonicalization)"
    );
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    let modified = r#"
runtime:
  mode: "paper"
risk:
  loss_cut_daily_micros: -200000000
  rebalance_band_bps: 250
gateway:
  venue: "example"
  base_url: "https://example.invalid"
"#;
    let b = load_layered_yaml_from_strings(&[modified]).unwrap();

    assert_ne!(a.config_hash, b.config_hash, "different config values must produce different hashes");
}

#[test]
fn merged_layers_produce_stable_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash, "same merge layers must produce identical hash");

    let mode = a.config_json.pointer("/runtime/mode").and_then(|v| v.as_str()).unwrap();
    assert_eq!(mode, "live", "overlay should override base runtime.mode");

    let loss_cut = a
        .config_json
        .pointer("/risk/loss_cut_daily_micros")
        .and_then(|v| v.as_i64())
        .unwrap();
    assert_eq!(loss_cut, -50_000_000, "overlay should override base loss_cut_daily_micros");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(loaded.config_hash.len(), 64, "SHA-256 hash should be 64 hex chars");
    assert!(
        loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()),
        "hash should contain only hex digits"
    );
}

#[test]
fn empty_config_produces_stable_hash() {
    let a = load_layered_yaml_from_strings(&["{}"]).unwrap();
    let b = load_layered_yaml_from_strings(&["{}"]).unwrap();

    assert_eq!(a.config_hash, b.config_hash, "empty configs must produce identical hash");
}
