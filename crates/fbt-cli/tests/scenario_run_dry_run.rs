use assert_cmd::Command;
use predicates::str::contains;

fn write_tmp(name: &str, contents: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("fbt-cli-run-{}-{}", std::process::id(), name));
    std::fs::write(&dir, contents).unwrap();
    dir
}

#[test]
fn paper_dry_run_prints_summary_without_bootstrapping() {
    let cfg = write_tmp("paper.yaml", "symbols: [BTCUSDT]\n");

    Command::cargo_bin("fbt")
        .unwrap()
        .args(["run", "paper", "--config", cfg.to_str().unwrap(), "--dry-run"])
        .assert()
        .success()
        .stdout(contains("dry_run=true"))
        .stdout(contains("mode=PAPER"))
        .stdout(contains("run_id="));
}

#[test]
fn live_dry_run_without_allow_live_fails_before_secrets_are_touched() {
    let cfg = write_tmp("live.yaml", "symbols: [BTCUSDT]\n");

    Command::cargo_bin("fbt")
        .unwrap()
        .args(["run", "live", "--config", cfg.to_str().unwrap(), "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("allow_live"));
}

#[test]
fn live_dry_run_with_allow_live_but_no_credentials_fails_on_secrets() {
    let cfg = write_tmp("live_allowed.yaml", "symbols: [BTCUSDT]\nallow_live: true\n");

    Command::cargo_bin("fbt")
        .unwrap()
        .args(["run", "live", "--config", cfg.to_str().unwrap(), "--dry-run"])
        .env_remove("FBT_VENUE_API_KEY")
        .env_remove("FBT_VENUE_API_SECRET")
        .assert()
        .failure()
        .stderr(contains("SECRETS_MISSING"));
}
