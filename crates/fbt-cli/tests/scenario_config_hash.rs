use assert_cmd::Command;
use predicates::str::contains;

fn write_tmp(name: &str, contents: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("fbt-cli-test-{}-{}", std::process::id(), name));
    std::fs::write(&dir, contents).unwrap();
    dir
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let cfg = write_tmp("base.yaml", "symbols: [BTCUSDT]\nallow_live: false\n");

    Command::cargo_bin("fbt")
        .unwrap()
        .args(["config-hash", cfg.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("config_hash="))
        .stdout(contains("BTCUSDT"));
}

#[test]
fn config_hash_is_stable_across_layer_order_of_identical_single_file() {
    let cfg = write_tmp("stable.yaml", "symbols: [ETHUSDT]\n");

    let first = Command::cargo_bin("fbt").unwrap().args(["config-hash", cfg.to_str().unwrap()]).output().unwrap();
    let second = Command::cargo_bin("fbt").unwrap().args(["config-hash", cfg.to_str().unwrap()]).output().unwrap();
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn config_hash_rejects_missing_file() {
    Command::cargo_bin("fbt").unwrap().args(["config-hash", "/no/such/file.yaml"]).assert().failure();
}

#[test]
fn help_lists_every_subcommand() {
    Command::cargo_bin("fbt")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("run"))
        .stdout(contains("backtest"))
        .stdout(contains("ops-check"))
        .stdout(contains("config-hash"));
}
