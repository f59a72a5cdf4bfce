use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

use crate::shared::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCfg {
    /// Path to a file holding the hex-encoded signing key. The key itself is
    /// never logged.
    pub key_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCfg {
    pub token0: TokenInfo,
    pub token1: TokenInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsCfg {
    pub pool: String,
    pub position_manager: String,
    pub gauge: String,
    pub router: String,
    /// Directory holding the ABI JSON files (pool.json, position_manager.json,
    /// gauge.json, router.json, erc20.json).
    pub abi_dir: String,
}

/// Which side of the pool holds the chain's wrapped native token. Gas and
/// rewards accrue in native units and are converted through the pool price
/// into token1 for the P&L, so the pool must carry the native token on one
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeSide {
    Token0,
    Token1,
}

/// Immutable strategy run parameters, validated once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyCfg {
    pub monitor_interval_secs: u64,
    /// Fractional price-change tolerance per interval, 0 < t < 0.1.
    pub stability_threshold: f64,
    pub required_stable_intervals: u32,
    /// Position width in tick units, even and positive.
    pub range_width: i32,
    pub tick_spacing: i32,
    /// Percent, 1-50.
    pub slippage_pct: u8,
    pub breaker_window_secs: u64,
    pub breaker_threshold: usize,
    /// Minimum value imbalance (token1 units) before the entry workflow
    /// swaps toward a 50/50 split.
    pub min_swap_value_quote: f64,
    /// Pool fee in pips (1e-6), e.g. 3000 = 0.3%.
    pub pool_fee_pips: u32,
    pub native_side: NativeSide,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCfg {
    pub default_gas_limit: u64,
    pub priority_fee_gwei: u64,
    pub poll_interval_secs: u64,
    pub confirm_timeout_secs: u64,
    /// Transaction deadline offset for mint/swap calls.
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryCfg {
    pub record_path: String,
    pub notify_buffer: usize,
    /// Optional endpoint to POST reports to; when unset, reports go to the
    /// log only.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub tokens: TokenCfg,
    pub contracts: ContractsCfg,
    pub strategy: StrategyCfg,
    pub execution: ExecutionCfg,
    pub telemetry: TelemetryCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse config file")?;
        Ok(cfg)
    }

    /// Invalid configuration is a fatal startup error; nothing touches the
    /// chain before this passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        parse_address("pool", &self.contracts.pool)?;
        parse_address("position_manager", &self.contracts.position_manager)?;
        parse_address("gauge", &self.contracts.gauge)?;
        parse_address("router", &self.contracts.router)?;
        parse_address("token0", &self.tokens.token0.address)?;
        parse_address("token1", &self.tokens.token1.address)?;
        if self.execution.poll_interval_secs == 0 || self.execution.confirm_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll interval and confirm timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl StrategyCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_secs < 60 {
            return Err(ConfigError::MonitorIntervalTooShort(
                self.monitor_interval_secs,
            ));
        }
        if !(self.stability_threshold > 0.0 && self.stability_threshold < 0.1) {
            return Err(ConfigError::InvalidStabilityThreshold(
                self.stability_threshold,
            ));
        }
        if self.required_stable_intervals < 3 {
            return Err(ConfigError::InvalidStableIntervals(
                self.required_stable_intervals,
            ));
        }
        if self.range_width <= 0 || self.range_width % 2 != 0 {
            return Err(ConfigError::InvalidRangeWidth(self.range_width));
        }
        if !(1..=50).contains(&self.slippage_pct) {
            return Err(ConfigError::InvalidSlippage(self.slippage_pct));
        }
        if self.breaker_threshold < 3 {
            return Err(ConfigError::InvalidBreakerThreshold(self.breaker_threshold));
        }
        if self.breaker_window_secs == 0 {
            return Err(ConfigError::InvalidBreakerWindow);
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn breaker_window(&self) -> Duration {
        Duration::from_secs(self.breaker_window_secs)
    }
}

pub fn parse_address(label: &'static str, value: &str) -> Result<Address, ConfigError> {
    value
        .parse::<Address>()
        .map_err(|e| ConfigError::InvalidAddress(label, format!("{}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> StrategyCfg {
        StrategyCfg {
            monitor_interval_secs: 120,
            stability_threshold: 0.02,
            required_stable_intervals: 3,
            range_width: 1200,
            tick_spacing: 60,
            slippage_pct: 5,
            breaker_window_secs: 3600,
            breaker_threshold: 5,
            min_swap_value_quote: 10.0,
            pool_fee_pips: 3000,
            native_side: NativeSide::Token0,
        }
    }

    #[test]
    fn test_valid_strategy_passes() {
        assert!(strategy().validate().is_ok());
    }

    #[test]
    fn test_interval_floor() {
        let mut cfg = strategy();
        cfg.monitor_interval_secs = 59;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MonitorIntervalTooShort(59))
        ));
        cfg.monitor_interval_secs = 60;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        let mut cfg = strategy();
        for bad in [0.0, -0.5, 0.1, 1.0] {
            cfg.stability_threshold = bad;
            assert!(cfg.validate().is_err(), "threshold {} must fail", bad);
        }
    }

    #[test]
    fn test_range_width_must_be_even_positive() {
        let mut cfg = strategy();
        cfg.range_width = 0;
        assert!(cfg.validate().is_err());
        cfg.range_width = -200;
        assert!(cfg.validate().is_err());
        cfg.range_width = 121;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_slippage_bounds() {
        let mut cfg = strategy();
        cfg.slippage_pct = 0;
        assert!(cfg.validate().is_err());
        cfg.slippage_pct = 51;
        assert!(cfg.validate().is_err());
        cfg.slippage_pct = 50;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_breaker_rules() {
        let mut cfg = strategy();
        cfg.breaker_threshold = 2;
        assert!(cfg.validate().is_err());
        cfg.breaker_threshold = 3;
        cfg.breaker_window_secs = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBreakerWindow)
        ));
    }

    #[test]
    fn test_stable_intervals_floor() {
        let mut cfg = strategy();
        cfg.required_stable_intervals = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_native_side_parses_lowercase() {
        let side: NativeSide = serde_json::from_str("\"token0\"").unwrap();
        assert_eq!(side, NativeSide::Token0);
        let side: NativeSide = serde_json::from_str("\"token1\"").unwrap();
        assert_eq!(side, NativeSide::Token1);
        assert!(serde_json::from_str::<NativeSide>("\"weth\"").is_err());
    }

    #[test]
    fn test_address_parsing() {
        assert!(parse_address("pool", "0x1f98431c8ad98523631ae4a59f267346ea31f984").is_ok());
        assert!(parse_address("pool", "not-an-address").is_err());
    }
}
