//! Common types used across the application

use chrono::{DateTime, Utc};
use ethers::types::{TransactionReceipt, H256, U256};
use serde::{Deserialize, Serialize};

/// Active price band of one open position. Created whole by a mint and
/// replaced whole by the next mint after a rebalance, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub tick_lower: i32,
    pub tick_upper: i32,
}

impl PositionRange {
    pub fn new(tick_lower: i32, tick_upper: i32) -> Self {
        Self {
            tick_lower,
            tick_upper,
        }
    }

    /// True while the pool tick sits inside the band (bounds inclusive).
    pub fn contains(&self, tick: i32) -> bool {
        tick >= self.tick_lower && tick <= self.tick_upper
    }
}

/// Read-only snapshot of a pool, fetched once per monitoring tick.
#[derive(Debug, Clone)]
pub struct AmmState {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub active_liquidity: u128,
}

/// Fee priority applied when building a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPriority {
    Normal,
    High,
}

/// Immutable receipt summary, appended per transaction to operation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: H256,
    pub gas_used: U256,
    pub gas_price: U256,
    /// gas_used * gas_price, in wei
    pub cost: U256,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn from_receipt(receipt: &TransactionReceipt, operation: &str) -> Self {
        let gas_used = receipt.gas_used.unwrap_or_default();
        let gas_price = receipt.effective_gas_price.unwrap_or_default();
        Self {
            tx_hash: receipt.transaction_hash,
            gas_used,
            gas_price,
            cost: gas_used.saturating_mul(gas_price),
            operation: operation.to_string(),
            timestamp: Utc::now(),
        }
    }
}
