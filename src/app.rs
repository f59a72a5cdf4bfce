// src/app.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{parse_address, Config};
use crate::domain::position::{PositionManager, PositionParams};
use crate::domain::strategy::StrategyEngine;
use crate::infrastructure::chain::{load_abi, ProtocolClient, TxListener};
use crate::infrastructure::telemetry::{JsonlSink, Notifier};
use crate::shared::errors::StrategyError;

/// Wire every component together and run the engine until the operator
/// stops it or the circuit breaker halts it.
pub async fn run(cfg: Config) -> Result<()> {
    let provider = Arc::new(
        Provider::<Http>::try_from(cfg.rpc.url.as_str())
            .with_context(|| format!("connect provider {}", cfg.rpc.url))?,
    );

    let wallet = load_wallet(&cfg.wallet.key_file, cfg.rpc.chain_id)?;
    info!(address = ?wallet.address(), chain_id = cfg.rpc.chain_id, "wallet loaded");

    let pool = client(&provider, &cfg, "pool", &cfg.contracts.pool, "pool.json")?;
    let npm = client(
        &provider,
        &cfg,
        "position_manager",
        &cfg.contracts.position_manager,
        "position_manager.json",
    )?;
    let gauge = client(&provider, &cfg, "gauge", &cfg.contracts.gauge, "gauge.json")?;
    let router = client(&provider, &cfg, "router", &cfg.contracts.router, "router.json")?;
    let erc20_0 = client(&provider, &cfg, "token0", &cfg.tokens.token0.address, "erc20.json")?;
    let erc20_1 = client(&provider, &cfg, "token1", &cfg.tokens.token1.address, "erc20.json")?;

    let listener = TxListener::new(
        provider.clone(),
        Duration::from_secs(cfg.execution.poll_interval_secs),
        Duration::from_secs(cfg.execution.confirm_timeout_secs),
    );

    let params = PositionParams {
        token0: parse_address("token0", &cfg.tokens.token0.address)?,
        token1: parse_address("token1", &cfg.tokens.token1.address)?,
        decimals0: cfg.tokens.token0.decimals,
        decimals1: cfg.tokens.token1.decimals,
        tick_spacing: cfg.strategy.tick_spacing,
        range_width: cfg.strategy.range_width,
        slippage_pct: cfg.strategy.slippage_pct,
        pool_fee_pips: cfg.strategy.pool_fee_pips,
        deadline_secs: cfg.execution.deadline_secs,
    };
    let positions = PositionManager::new(
        pool, npm, gauge, router, erc20_0, erc20_1, listener, wallet, params,
    );

    let sink = Arc::new(JsonlSink::new(&cfg.telemetry.record_path));
    let (notifier, mut notifications) = Notifier::channel(cfg.telemetry.notify_buffer);
    let webhook_url = cfg.telemetry.webhook_url.clone();
    tokio::spawn(async move {
        let http = reqwest::Client::new();
        while let Some(payload) = notifications.recv().await {
            match &webhook_url {
                Some(url) => {
                    let outcome = http
                        .post(url)
                        .header("content-type", "application/json")
                        .body(payload)
                        .send()
                        .await;
                    if let Err(e) = outcome {
                        warn!("notification delivery failed: {}", e);
                    }
                }
                None => info!(target: "notify", "{}", payload),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut engine = StrategyEngine::new(cfg.strategy.clone(), positions, sink, notifier);
    match engine.run(shutdown_rx).await {
        Ok(()) => Ok(()),
        Err(StrategyError::Cancelled) => {
            info!("stopped by operator");
            Ok(())
        }
        Err(e) => {
            error!("strategy terminated: {}", e);
            Err(e.into())
        }
    }
}

fn client(
    provider: &Arc<Provider<Http>>,
    cfg: &Config,
    label: &'static str,
    address: &str,
    abi_file: &str,
) -> Result<ProtocolClient> {
    let abi = load_abi(Path::new(&cfg.contracts.abi_dir).join(abi_file))?;
    Ok(ProtocolClient::new(
        provider.clone(),
        parse_address(label, address)?,
        abi,
        cfg.rpc.chain_id,
        U256::from(cfg.execution.default_gas_limit),
        cfg.execution.priority_fee_gwei,
    ))
}

/// Read the hex-encoded signing key from disk. The key material itself is
/// never logged.
fn load_wallet(path: &str, chain_id: u64) -> Result<LocalWallet> {
    let raw = fs::read_to_string(path).with_context(|| format!("read key file {}", path))?;
    let bytes =
        hex::decode(raw.trim().trim_start_matches("0x")).context("signing key is not valid hex")?;
    let wallet = LocalWallet::from_bytes(&bytes).context("parse signing key")?;
    Ok(wallet.with_chain_id(chain_id))
}
