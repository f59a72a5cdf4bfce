//! Strategy engine - the phase-driven rebalancing loop
//!
//! One engine owns one position manager and drives it through the lifecycle:
//! enter a position around the current price, watch the tick, unwind when it
//! leaves the range, wait for the price to settle, re-enter. Every phase
//! transition and every error produces a report; a circuit breaker turns
//! repeated or critical failures into a terminal halt.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ethers::types::U256;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::circuit_breaker::CircuitBreaker;
use super::phase::Phase;
use super::stability::StabilityWindow;
use crate::config::{NativeSide, StrategyCfg};
use crate::domain::amm::{amounts_for_liquidity, sqrt_price_x96_to_price};
use crate::domain::position::types::sum_gas;
use crate::domain::position::{PositionManager, RebalanceWorkflow};
use crate::infrastructure::telemetry::{Notifier, TelemetrySink};
use crate::report::{CurrentAssetSnapshot, PositionDetails, StrategyReport};
use crate::shared::errors::{is_critical, StrategyError};
use crate::shared::types::{AmmState, PositionRange, TransactionRecord};
use crate::shared::utils::{to_ui_amount, ui_amount_to_raw, wei_to_eth};

/// Wall-clock cadence of the unconditional asset snapshots.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// Mutable run state, separated from the engine so reports and tests can
/// inspect it as one unit.
pub struct StrategyState {
    pub phase: Phase,
    pub position_id: Option<U256>,
    pub range: Option<PositionRange>,
    pub last_price: f64,
    pub last_tick: i32,
    /// Total gas burned since start, wei.
    pub cumulative_gas: U256,
    /// Rewards claimed since start, native units.
    pub rewards_native: f64,
    /// Pool fees paid on rebalance swaps, token1 units.
    pub swap_fees_quote: f64,
    pub error_count: u32,
    pub started_at: DateTime<Utc>,
}

impl StrategyState {
    fn new() -> Self {
        Self {
            phase: Phase::Initializing,
            position_id: None,
            range: None,
            last_price: 0.0,
            last_tick: 0,
            cumulative_gas: U256::zero(),
            rewards_native: 0.0,
            swap_fees_quote: 0.0,
            error_count: 0,
            started_at: Utc::now(),
        }
    }
}

pub struct StrategyEngine {
    cfg: StrategyCfg,
    positions: PositionManager,
    sink: Arc<dyn TelemetrySink>,
    notifier: Notifier,
    breaker: CircuitBreaker,
    stability: StabilityWindow,
    state: StrategyState,
}

impl StrategyEngine {
    pub fn new(
        cfg: StrategyCfg,
        positions: PositionManager,
        sink: Arc<dyn TelemetrySink>,
        notifier: Notifier,
    ) -> Self {
        let breaker = CircuitBreaker::new(cfg.breaker_window(), cfg.breaker_threshold);
        let stability = StabilityWindow::new(cfg.stability_threshold, cfg.required_stable_intervals);
        Self {
            cfg,
            positions,
            sink,
            notifier,
            breaker,
            stability,
            state: StrategyState::new(),
        }
    }

    /// Drive the lifecycle until cancellation or a halt. Cancellation stops
    /// the loop between operations and sends no cleanup transactions; an
    /// open position simply stays open.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), StrategyError> {
        self.startup().await?;
        let started = self.base_report(
            "strategy_started",
            &format!(
                "monitoring every {}s in phase {}",
                self.cfg.monitor_interval_secs, self.state.phase
            ),
        );
        self.emit(started).await;

        let mut monitor = interval(self.cfg.monitor_interval());
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut snapshots = interval(SNAPSHOT_INTERVAL);
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("shutdown requested; stopping without cleanup transactions");
                    return Err(StrategyError::Cancelled);
                }
                _ = snapshots.tick() => {
                    self.snapshot("periodic").await;
                }
                _ = monitor.tick() => {
                    self.step().await?;
                }
            }
        }
    }

    /// Adopt the wallet's existing position if one survives a restart, or
    /// start from scratch. A position that exists but cannot be managed is
    /// a fatal startup error, never silently ignored.
    async fn startup(&mut self) -> Result<(), StrategyError> {
        let existing = self
            .positions
            .first_owned_position()
            .await
            .map_err(|e| StrategyError::Startup(format!("position lookup: {:#}", e)))?;

        let Some(token_id) = existing else {
            info!("no existing position found, starting fresh");
            self.state.phase = Phase::Initializing;
            return Ok(());
        };

        let info = self
            .positions
            .position_info(token_id)
            .await
            .map_err(|e| StrategyError::Startup(format!("position {}: {:#}", token_id, e)))?;
        let params = &self.positions.params;
        if info.token0 != params.token0 || info.token1 != params.token1 {
            return Err(StrategyError::Startup(format!(
                "position {} holds a different token pair than configured",
                token_id
            )));
        }
        if info.liquidity.is_zero() {
            return Err(StrategyError::Startup(format!(
                "position {} has no liquidity; burn it before restarting",
                token_id
            )));
        }

        info!(
            %token_id,
            tick_lower = info.tick_lower,
            tick_upper = info.tick_upper,
            "adopted existing position"
        );
        self.state.position_id = Some(token_id);
        self.state.range = Some(PositionRange::new(info.tick_lower, info.tick_upper));
        self.state.phase = Phase::ActiveMonitoring;
        Ok(())
    }

    async fn step(&mut self) -> Result<(), StrategyError> {
        match self.state.phase {
            Phase::Initializing => self.run_initial_entry().await,
            Phase::ActiveMonitoring => self.monitor_position().await,
            Phase::RebalancingRequired => self.run_rebalance().await,
            Phase::WaitingForStability => self.await_stability().await,
            Phase::Halted => Err(self.finalize().await),
        }
    }

    // ----- Initializing -----

    async fn run_initial_entry(&mut self) -> Result<(), StrategyError> {
        let gas_before = self.state.cumulative_gas;
        match self.enter_position().await {
            Ok(()) => {
                self.state.phase = Phase::ActiveMonitoring;
                let spent = self.state.cumulative_gas.saturating_sub(gas_before);
                let range = self.state.range;
                let message = match range {
                    Some(r) => format!(
                        "position opened over [{}, {}] at tick {}",
                        r.tick_lower, r.tick_upper, self.state.last_tick
                    ),
                    None => "position opened".to_string(),
                };
                let mut report = self.base_report("position_opened", &message);
                report.gas_cost = wei_to_eth(spent);
                report.position_details = range.map(|r| PositionDetails {
                    tick_lower: r.tick_lower,
                    tick_upper: r.tick_upper,
                    current_tick: self.state.last_tick,
                });
                self.emit(report).await;
                self.snapshot("position_opened").await;
                Ok(())
            }
            Err(message) => {
                // Re-entering straight away after a failed entry tends to
                // repeat the failure; wait for a fresh stability streak.
                self.stability.reset();
                self.handle_failure("initial entry", message, Phase::WaitingForStability)
                    .await
            }
        }
    }

    /// Swap toward a 50/50 value split when the imbalance warrants it, then
    /// mint with everything the wallet holds and stake the new NFT.
    async fn enter_position(&mut self) -> Result<(), String> {
        let pool = self
            .positions
            .pool_state()
            .await
            .map_err(|e| format!("pool state: {:#}", e))?;
        let params = self.positions.params.clone();
        let price = sqrt_price_x96_to_price(pool.sqrt_price_x96, params.decimals0, params.decimals1);
        self.state.last_price = price;
        self.state.last_tick = pool.tick;
        if price <= 0.0 {
            return Err("pool reports a zero price".to_string());
        }

        let owner = self.positions.owner();
        let balance0 = self
            .positions
            .token_balance(&self.positions.erc20_0, owner)
            .await
            .map_err(|e| format!("token0 balance: {:#}", e))?;
        let balance1 = self
            .positions
            .token_balance(&self.positions.erc20_1, owner)
            .await
            .map_err(|e| format!("token1 balance: {:#}", e))?;

        let value0 = to_ui_amount(balance0, params.decimals0) * price;
        let value1 = to_ui_amount(balance1, params.decimals1);
        let imbalance = (value0 - value1).abs();
        if imbalance > self.cfg.min_swap_value_quote {
            // Move half the surplus across so both sides of the mint carry
            // roughly equal value.
            let (zero_for_one, amount_in) = if value0 > value1 {
                (true, ui_amount_to_raw(imbalance / 2.0 / price, params.decimals0))
            } else {
                (false, ui_amount_to_raw(imbalance / 2.0, params.decimals1))
            };
            if !amount_in.is_zero() {
                info!(zero_for_one, %amount_in, imbalance, "pre-entry rebalance swap");
                let swap = self.positions.swap(zero_for_one, amount_in).await;
                self.absorb(&swap.records);
                let fee_quote = if zero_for_one {
                    to_ui_amount(swap.fee_paid, params.decimals0) * price
                } else {
                    to_ui_amount(swap.fee_paid, params.decimals1)
                };
                self.state.swap_fees_quote += fee_quote;
                if !swap.success {
                    return Err(swap.error.unwrap_or_else(|| "swap failed".to_string()));
                }
            }
        }

        let budget0 = self
            .positions
            .token_balance(&self.positions.erc20_0, owner)
            .await
            .map_err(|e| format!("token0 balance: {:#}", e))?;
        let budget1 = self
            .positions
            .token_balance(&self.positions.erc20_1, owner)
            .await
            .map_err(|e| format!("token1 balance: {:#}", e))?;

        let mint = self.positions.mint(budget0, budget1).await;
        self.absorb(&mint.records);
        if !mint.success {
            return Err(mint.error.unwrap_or_else(|| "mint failed".to_string()));
        }
        let token_id = mint
            .token_id
            .ok_or_else(|| "mint confirmed without a token id".to_string())?;
        self.state.position_id = Some(token_id);
        self.state.range = mint.range;

        let staking = self.positions.stake(token_id).await;
        self.absorb(&staking.records);
        if !staking.success {
            return Err(staking.error.unwrap_or_else(|| "stake failed".to_string()));
        }
        Ok(())
    }

    // ----- ActiveMonitoring -----

    async fn monitor_position(&mut self) -> Result<(), StrategyError> {
        let pool = match self.positions.pool_state().await {
            Ok(p) => p,
            Err(e) => {
                return self
                    .handle_failure("monitoring", format!("{:#}", e), Phase::ActiveMonitoring)
                    .await
            }
        };
        if let Some(report) = self.observe(&pool) {
            self.emit(report).await;
        }
        Ok(())
    }

    /// Pure monitoring decision: compare the pool tick against the active
    /// range and transition when it has escaped. Returns the report to emit,
    /// if any.
    fn observe(&mut self, pool: &AmmState) -> Option<StrategyReport> {
        let params = &self.positions.params;
        self.state.last_price =
            sqrt_price_x96_to_price(pool.sqrt_price_x96, params.decimals0, params.decimals1);
        self.state.last_tick = pool.tick;

        let range = self.state.range?;
        if range.contains(pool.tick) {
            debug!(
                tick = pool.tick,
                lower = range.tick_lower,
                upper = range.tick_upper,
                "tick inside range"
            );
            return None;
        }

        self.state.phase = Phase::RebalancingRequired;
        let message = format!(
            "tick {} left range [{}, {}], rebalancing",
            pool.tick, range.tick_lower, range.tick_upper
        );
        warn!("{}", message);
        let mut report = self.base_report("out_of_range", &message);
        report.position_details = Some(PositionDetails {
            tick_lower: range.tick_lower,
            tick_upper: range.tick_upper,
            current_tick: pool.tick,
        });
        Some(report)
    }

    // ----- RebalancingRequired -----

    async fn run_rebalance(&mut self) -> Result<(), StrategyError> {
        let token_id = match self.state.position_id {
            Some(id) => Some(id),
            // Lost track of the id (e.g. restart mid-rebalance): fall back
            // to whatever the wallet actually holds.
            None => match self.positions.first_owned_position().await {
                Ok(found) => found,
                Err(e) => {
                    return self
                        .handle_failure(
                            "rebalance",
                            format!("position lookup: {:#}", e),
                            Phase::ActiveMonitoring,
                        )
                        .await
                }
            },
        };
        let Some(token_id) = token_id else {
            info!("no position on-chain to unwind, moving to stability wait");
            self.state.position_id = None;
            self.state.range = None;
            self.stability.reset();
            self.state.phase = Phase::WaitingForStability;
            return Ok(());
        };

        let workflow = self.unwind(token_id).await;
        self.state.cumulative_gas = self.state.cumulative_gas.saturating_add(workflow.gas_cost());
        self.state.rewards_native += wei_to_eth(workflow.rewards());
        if !workflow.success {
            let message = workflow
                .error
                .unwrap_or_else(|| "rebalance failed".to_string());
            // Monitoring will re-detect the escaped tick and retry the
            // unwind on a later interval.
            return self
                .handle_failure("rebalance", message, Phase::ActiveMonitoring)
                .await;
        }

        self.state.position_id = None;
        self.state.range = None;
        self.stability.reset();
        self.state.phase = Phase::WaitingForStability;

        let mut report = self.base_report(
            "rebalanced",
            &format!("position {} unwound, waiting for price stability", token_id),
        );
        report.gas_cost = wei_to_eth(workflow.gas_cost());
        report.position_id = Some(token_id.to_string());
        self.emit(report).await;
        self.snapshot("rebalanced").await;
        Ok(())
    }

    /// Unstake then withdraw. The workflow keeps both step results so gas
    /// spent by a failed step still enters the accounting.
    async fn unwind(&self, token_id: U256) -> RebalanceWorkflow {
        let mut workflow = RebalanceWorkflow::default();

        let unstake = self.positions.unstake(token_id).await;
        let ok = unstake.success;
        let err = unstake.error.clone();
        workflow.unstake = Some(unstake);
        if !ok {
            workflow.error = err;
            return workflow;
        }

        let withdraw = self.positions.withdraw(token_id).await;
        let ok = withdraw.success;
        let err = withdraw.error.clone();
        workflow.withdraw = Some(withdraw);
        if !ok {
            workflow.error = err;
            return workflow;
        }

        workflow.success = true;
        workflow
    }

    // ----- WaitingForStability -----

    async fn await_stability(&mut self) -> Result<(), StrategyError> {
        let pool = match self.positions.pool_state().await {
            Ok(p) => p,
            Err(e) => {
                return self
                    .handle_failure(
                        "stability check",
                        format!("{:#}", e),
                        Phase::WaitingForStability,
                    )
                    .await
            }
        };
        let params = &self.positions.params;
        let price =
            sqrt_price_x96_to_price(pool.sqrt_price_x96, params.decimals0, params.decimals1);
        self.state.last_price = price;
        self.state.last_tick = pool.tick;

        if self.stability.check_stability(price) {
            self.state.phase = Phase::Initializing;
            let report = self.base_report(
                "stability_reached",
                &format!("price settled at {:.6}, re-entering", price),
            );
            self.emit(report).await;
        } else {
            let (seen, required) = self.stability.progress();
            debug!(price, seen, required, "price not yet stable");
        }
        Ok(())
    }

    // ----- failure handling and teardown -----

    /// Count the error, emit a report, and either retry in `retry_phase` on
    /// the next tick or halt when the breaker trips.
    async fn handle_failure(
        &mut self,
        context: &str,
        message: String,
        retry_phase: Phase,
    ) -> Result<(), StrategyError> {
        self.state.error_count += 1;
        let critical = is_critical(&message);
        let halt = self.breaker.record_error(&message, critical);

        let report = self
            .base_report("error", &format!("{} failed", context))
            .with_error(message);
        self.emit(report).await;

        if halt {
            self.state.phase = Phase::Halted;
            Err(self.finalize().await)
        } else {
            self.state.phase = retry_phase;
            Ok(())
        }
    }

    /// Terminal teardown: emit the halt report with the final accounting and
    /// hand the caller the halt error. No positions are touched.
    async fn finalize(&mut self) -> StrategyError {
        self.state.phase = Phase::Halted;
        let net_pnl = self.net_pnl();
        error!(
            net_pnl,
            errors = self.state.error_count,
            "strategy halted, manual intervention required"
        );
        let report = self.base_report(
            "halted",
            &format!(
                "halted after {} errors, open positions left untouched",
                self.state.error_count
            ),
        );
        self.emit(report).await;
        self.snapshot("halted").await;
        StrategyError::Halted { net_pnl }
    }

    /// Spot value of one native-token unit in token1, from the last
    /// observed pool price.
    fn native_price_quote(&self) -> f64 {
        match self.cfg.native_side {
            NativeSide::Token0 => self.state.last_price,
            NativeSide::Token1 => 1.0,
        }
    }

    /// rewards - gas - swap fees since strategy start, all in token1 units.
    /// Gas and rewards accrue in native units and convert at the pool price.
    fn net_pnl(&self) -> f64 {
        let native_price = self.native_price_quote();
        (self.state.rewards_native - wei_to_eth(self.state.cumulative_gas)) * native_price
            - self.state.swap_fees_quote
    }

    fn absorb(&mut self, records: &[TransactionRecord]) {
        self.state.cumulative_gas = self.state.cumulative_gas.saturating_add(sum_gas(records));
    }

    // ----- reporting -----

    fn base_report(&self, event_type: &str, message: &str) -> StrategyReport {
        let mut report = StrategyReport::new(event_type, message, &self.state.phase.to_string())
            .with_costs(
                0.0,
                wei_to_eth(self.state.cumulative_gas),
                self.state.rewards_native,
                self.net_pnl(),
            );
        if let Some(id) = self.state.position_id {
            report.position_id = Some(id.to_string());
        }
        report
    }

    /// Notification first (non-blocking, best-effort), then the durable
    /// sink. A sink failure is logged, never fatal.
    async fn emit(&self, report: StrategyReport) {
        match report.to_json() {
            Ok(json) => self.notifier.try_notify(json),
            Err(e) => warn!("report serialization failed: {}", e),
        }
        if let Err(e) = self.sink.record_report(&report).await {
            warn!("telemetry sink rejected report: {:#}", e);
        }
    }

    async fn snapshot(&self, trigger: &str) {
        match self.build_snapshot(trigger).await {
            Ok(snapshot) => {
                if let Err(e) = self.sink.record_snapshot(&snapshot).await {
                    warn!("telemetry sink rejected snapshot: {:#}", e);
                }
            }
            Err(e) => warn!(trigger, "snapshot skipped: {:#}", e),
        }
    }

    /// Value wallet balances plus whatever sits inside the open position,
    /// all expressed in token1.
    async fn build_snapshot(&self, trigger: &str) -> Result<CurrentAssetSnapshot> {
        let params = &self.positions.params;
        let owner = self.positions.owner();
        let pool = self.positions.pool_state().await?;
        let price =
            sqrt_price_x96_to_price(pool.sqrt_price_x96, params.decimals0, params.decimals1);

        let wallet_amount0 = to_ui_amount(
            self.positions
                .token_balance(&self.positions.erc20_0, owner)
                .await?,
            params.decimals0,
        );
        let wallet_amount1 = to_ui_amount(
            self.positions
                .token_balance(&self.positions.erc20_1, owner)
                .await?,
            params.decimals1,
        );

        let (position_amount0, position_amount1) = match self.state.position_id {
            Some(token_id) => {
                let info = self.positions.position_info(token_id).await?;
                let (a0, a1) = amounts_for_liquidity(
                    pool.sqrt_price_x96,
                    info.tick_lower,
                    info.tick_upper,
                    info.liquidity,
                )?;
                (
                    to_ui_amount(a0, params.decimals0),
                    to_ui_amount(a1, params.decimals1),
                )
            }
            None => (0.0, 0.0),
        };

        Ok(CurrentAssetSnapshot {
            timestamp: Utc::now(),
            trigger: trigger.to_string(),
            phase: self.state.phase.to_string(),
            wallet_amount0,
            wallet_amount1,
            position_amount0,
            position_amount1,
            price,
            total_value_quote: (wallet_amount0 + position_amount0) * price
                + wallet_amount1
                + position_amount1,
        })
    }
}
