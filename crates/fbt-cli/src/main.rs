mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{backtest, ops_check, run};

#[derive(Parser)]
#[command(name = "fbt")]
#[command(about = "Funding-basis arbitrage trading system CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a paper or live run.
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },

    /// Replay a tick/funding CSV pair through the backtest engine.
    Backtest {
        /// CSV of ts_ms,symbol,bid_micros,ask_micros,last_micros
        #[arg(long)]
        ticks: String,

        /// CSV of ts_ms,symbol,rate_e6 (omit for a funding-free replay)
        #[arg(long)]
        funding: Option<String>,

        /// Layered strategy/risk config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Minimum simulated seconds between strategy evaluations
        #[arg(long, default_value_t = 3)]
        step_sec: i64,

        /// Write the JSON report here instead of stdout
        #[arg(long)]
        out_json: Option<String>,
    },

    /// Print a per-symbol operability snapshot without placing any orders.
    OpsCheck {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        out_csv: Option<String>,

        #[arg(long)]
        out_json: Option<String>,
    },

    /// Compute the layered config hash and print canonical JSON.
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RunCmd {
    Paper {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        flatten_on_exit: bool,

        #[arg(long)]
        serve: bool,

        #[arg(long, default_value = "info")]
        log_level: String,
    },
    Live {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        flatten_on_exit: bool,

        #[arg(long)]
        serve: bool,

        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run { cmd } => match cmd {
            RunCmd::Paper { config_paths, dry_run, flatten_on_exit, serve, log_level } => {
                init_tracing(&log_level);
                run::run(run::RunArgs {
                    mode: run::CliRunMode::Paper,
                    config_paths,
                    dry_run,
                    flatten_on_exit,
                    serve,
                })
                .await?;
            }
            RunCmd::Live { config_paths, dry_run, flatten_on_exit, serve, log_level } => {
                init_tracing(&log_level);
                run::run(run::RunArgs {
                    mode: run::CliRunMode::Live,
                    config_paths,
                    dry_run,
                    flatten_on_exit,
                    serve,
                })
                .await?;
            }
        },

        Commands::Backtest { ticks, funding, config_paths, step_sec, out_json } => {
            backtest::run_backtest(backtest::BacktestArgs { ticks, funding, config_paths, step_sec, out_json })
                .await?;
        }

        Commands::OpsCheck { config_paths, out_csv, out_json } => {
            ops_check::run_ops_check(config_paths, out_csv, out_json).await?;
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = fbt_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
