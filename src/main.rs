mod app;
mod config;
mod domain;
mod infrastructure;
mod report;
mod shared;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Automated range-position rebalancer for concentrated-liquidity pools"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: String,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Path to the signing key file (overrides config)
    #[arg(long)]
    key_file: Option<String>,

    /// Telemetry record path (overrides config)
    #[arg(long)]
    record_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut cfg = config::Config::from_file(&args.config)?;
    if let Some(url) = args.rpc_url {
        cfg.rpc.url = url;
    }
    if let Some(path) = args.key_file {
        cfg.wallet.key_file = path;
    }
    if let Some(path) = args.record_path {
        cfg.telemetry.record_path = path;
    }
    cfg.validate()?;

    app::run(cfg).await
}
