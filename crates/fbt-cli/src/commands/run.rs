//! `fbt run paper|live`: bootstrap and run the Runner for one mode,
//! optionally embedding the fbt-daemon HTTP/SSE surface behind `--serve`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fbt_runtime::{RunMode, RunProvenance, Runner, RunnerOpts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliRunMode {
    Paper,
    Live,
}

pub struct RunArgs {
    pub mode: CliRunMode,
    pub config_paths: Vec<String>,
    pub dry_run: bool,
    pub flatten_on_exit: bool,
    pub serve: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let path_refs: Vec<&str> = args.config_paths.iter().map(String::as_str).collect();
    let loaded = fbt_config::load_layered_yaml(&path_refs)?;

    let run_mode = match args.mode {
        CliRunMode::Paper => RunMode::Paper,
        CliRunMode::Live => RunMode::Live,
    };

    if run_mode == RunMode::Live {
        loaded.check_live_allowed()?;
    }

    let secrets = fbt_config::resolve_secrets_for_mode(&loaded.config_json, run_mode.as_str())?;
    let provenance = RunProvenance::new("fbt", run_mode.as_str(), &loaded.config_hash);

    if args.dry_run {
        println!("dry_run=true");
        println!("mode={}", run_mode.as_str());
        println!("run_id={}", provenance.run_id);
        println!("config_hash={}", loaded.config_hash);
        println!("symbols={:?}", fbt_runtime::config::symbols_from_config(&loaded.config_json));
        return Ok(());
    }

    let audit_path = loaded
        .config_json
        .pointer("/audit/path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./fbt-audit.log"));
    let audit_hash_chain =
        loaded.config_json.pointer("/audit/hash_chain").and_then(|v| v.as_bool()).unwrap_or(true);
    let flatten_drain_secs =
        loaded.config_json.pointer("/risk/flatten_drain_secs").and_then(|v| v.as_u64()).unwrap_or(10);

    let serve = args.serve || fbt_runtime::config::daemon_serve_enabled(&loaded.config_json);

    let opts = RunnerOpts {
        mode: run_mode,
        config_json: loaded.config_json.clone(),
        venue_api_key: secrets.venue_api_key,
        venue_api_secret: secrets.venue_api_secret,
        audit_path,
        audit_hash_chain,
        flatten_on_exit: args.flatten_on_exit,
        flatten_drain_timeout: Duration::from_secs(flatten_drain_secs),
        provenance: provenance.clone(),
    };

    let runner = Runner::bootstrap(opts).await.context("bootstrap runner")?;

    let daemon_state = if serve {
        let state = Arc::new(fbt_daemon::state::AppState::new());
        {
            let mut snap = state.status.write().await;
            snap.run_id = Some(provenance.run_id.to_string());
            snap.state = "running".to_string();
        }
        fbt_daemon::state::spawn_heartbeat(state.clone(), Duration::from_secs(1));

        let addr = fbt_runtime::config::daemon_addr(&loaded.config_json);
        let router = fbt_daemon::routes::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("bind daemon addr: {addr}"))?;
        tracing::info!(%addr, "fbt-daemon embedded server listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "embedded daemon server exited");
            }
        });
        Some(state)
    } else {
        None
    };

    runner.run(daemon_state).await
}
