//! Run provenance: identity recorded into the audit stream at startup.
//!
//! Derives a run id, git hash, and host fingerprint as a standalone module
//! so both `fbt-cli` and any future embedder can call it without going
//! through the CLI command layer.

use std::process::Command;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProvenance {
    pub run_id: Uuid,
    pub engine_id: String,
    pub mode: String,
    pub git_hash: String,
    pub config_hash: String,
    pub host_fingerprint: String,
}

impl RunProvenance {
    pub fn new(engine_id: &str, mode: &str, config_hash: &str) -> Self {
        let git_hash = git_hash().unwrap_or_else(|| "UNKNOWN".to_string());
        let host_fingerprint = host_fingerprint();
        let run_id = derive_run_id(engine_id, mode, config_hash, &git_hash);
        Self {
            run_id,
            engine_id: engine_id.to_string(),
            mode: mode.to_string(),
            git_hash,
            config_hash: config_hash.to_string(),
            host_fingerprint,
        }
    }
}

/// Deterministic run id from engine identity + config: `Uuid::new_v5`
/// (SHA-1 over the DNS namespace), never RNG, so the same logical run
/// always derives the same id.
pub fn derive_run_id(engine_id: &str, mode: &str, config_hash: &str, git_hash: &str) -> Uuid {
    let data = format!("fbt-runtime.run.v1|{engine_id}|{mode}|{config_hash}|{git_hash}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

fn git_hash() -> Option<String> {
    let out = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8(out.stdout).ok()?;
    Some(s.trim().to_string())
}

fn host_fingerprint() -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "UNKNOWN_HOST".to_string());
    let username = std::env::var("USER").unwrap_or_else(|_| "UNKNOWN_USER".to_string());
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!("{hostname}|{username}|{os}|{arch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_deterministic_for_same_inputs() {
        let a = derive_run_id("fbt", "paper", "abc123", "deadbee");
        let b = derive_run_id("fbt", "paper", "abc123", "deadbee");
        assert_eq!(a, b);
    }

    #[test]
    fn run_id_changes_with_mode() {
        let a = derive_run_id("fbt", "paper", "abc123", "deadbee");
        let b = derive_run_id("fbt", "live", "abc123", "deadbee");
        assert_ne!(a, b);
    }
}
