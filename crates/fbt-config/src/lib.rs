//! Layered YAML config loading + canonicalization.

pub mod consumption;
pub mod secrets;

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use consumption::{consumed_pointers, ConfigMode};
pub use secrets::{resolve_secrets_for_mode, ResolvedSecrets};

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge (`base.yaml` +
/// environment overlay + optional local override).
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        sources.push(fs::read_to_string(p).with_context(|| format!("read config: {p}"))?);
    }
    load_layered_yaml_from_strings(&sources.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Same merge/canonicalize/hash pipeline as [`load_layered_yaml`], but over
/// already-loaded YAML strings — used by tests and by any caller that
/// sources a layer from somewhere other than a file (e.g. an embedded
/// default).
pub fn load_layered_yaml_from_strings(sources: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in sources.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
        secrets::reject_literal_secrets(&merged)?;
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Effective configuration: the merged JSON, its canonical serialization,
/// and a SHA256 hash of that serialization — recorded into the audit
/// stream and ops-check output so a run's effective config is reproducible.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Mainnet safety gate: a live run requires `allow_live: true` in the
    /// effective config. Returns an error naming the missing/false key,
    /// never silently defaulting to permissive.
    pub fn check_live_allowed(&self) -> Result<()> {
        let allowed = self
            .config_json
            .pointer("/allow_live")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            anyhow::bail!(
                "mainnet run refused: set `allow_live: true` in the effective config to trade live"
            )
        }
    }
}

/// What to do when [`report_unused_keys`] finds config leaves no mode-aware
/// consumer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    /// Report but do not fail — useful during development.
    Warn,
    /// Return `Err` if any unused leaf is found — for CI / startup gates.
    Fail,
}

/// Result of walking a config's leaves against [`consumed_pointers`] for a
/// mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedKeysReport {
    /// JSON-pointer paths to leaves no consumer in `mode` reads, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeysReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walk every scalar leaf in `config_json` and flag the ones not covered by
/// `mode`'s consumed-pointer registry (config hygiene).
///
/// A leaf at pointer `/a/b/c` is consumed if any registered pointer equals
/// `/a/b/c` or is one of its path-segment ancestors (`/a/b`, `/a`) — so a
/// subtree-root registration covers every descendant, while a leaf-exact
/// registration does not leak onto siblings.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeysReport> {
    let consumed = consumed_pointers(mode);
    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, String::new(), &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !is_consumed(leaf, consumed))
        .collect();
    unused.sort();

    let report = UnusedKeysReport { unused_leaf_pointers: unused };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        anyhow::bail!(
            "CONFIG_UNUSED_KEYS: {} config leaf/leaves not consumed in {:?} mode: {}",
            report.unused_leaf_pointers.len(),
            mode,
            report.unused_leaf_pointers.join(", "),
        );
    }

    Ok(report)
}

fn is_consumed(leaf: &str, consumed: &[&str]) -> bool {
    consumed.iter().any(|c| leaf == *c || leaf.starts_with(&format!("{c}/")))
}

fn collect_leaf_pointers(v: &Value, prefix: String, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, child) in map {
                collect_leaf_pointers(child, format!("{prefix}/{k}"), out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, child) in arr.iter().enumerate() {
                collect_leaf_pointers(child, format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(prefix),
    }
}

/// Deep-merge: objects merge recursively; arrays and scalars are overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON — the basis for both the config hash and audit payloads.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
