//! Operation result types
//!
//! Every operation returns one of these exactly once. On failure the error
//! message is populated and whatever transaction records were produced
//! before the failing step are preserved, so gas already spent is never
//! lost from the accounting.

use ethers::types::U256;

use crate::shared::types::{PositionRange, TransactionRecord};

pub fn sum_gas(records: &[TransactionRecord]) -> U256 {
    records
        .iter()
        .fold(U256::zero(), |acc, r| acc.saturating_add(r.cost))
}

#[derive(Debug, Default)]
pub struct MintResult {
    pub success: bool,
    pub error: Option<String>,
    pub token_id: Option<U256>,
    pub range: Option<PositionRange>,
    pub amount0: U256,
    pub amount1: U256,
    pub liquidity: U256,
    pub records: Vec<TransactionRecord>,
}

#[derive(Debug, Default)]
pub struct StakingResult {
    pub success: bool,
    pub error: Option<String>,
    pub records: Vec<TransactionRecord>,
}

#[derive(Debug, Default)]
pub struct UnstakeResult {
    pub success: bool,
    pub error: Option<String>,
    /// Claimed reward amount. Reward parsing from the claim receipt is a
    /// known upstream gap; this stays zero until the gauge exposes it.
    pub rewards: U256,
    pub records: Vec<TransactionRecord>,
}

#[derive(Debug, Default)]
pub struct WithdrawResult {
    pub success: bool,
    pub error: Option<String>,
    pub amount0: U256,
    pub amount1: U256,
    pub records: Vec<TransactionRecord>,
}

#[derive(Debug, Default)]
pub struct SwapOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub amount_out: U256,
    /// Pool fee charged on the input amount, token-in units.
    pub fee_paid: U256,
    pub records: Vec<TransactionRecord>,
}

/// Combined outcome of the unstake + withdraw sequence a rebalance runs.
#[derive(Debug, Default)]
pub struct RebalanceWorkflow {
    pub success: bool,
    pub error: Option<String>,
    pub unstake: Option<UnstakeResult>,
    pub withdraw: Option<WithdrawResult>,
}

impl RebalanceWorkflow {
    pub fn gas_cost(&self) -> U256 {
        let mut total = U256::zero();
        if let Some(u) = &self.unstake {
            total = total.saturating_add(sum_gas(&u.records));
        }
        if let Some(w) = &self.withdraw {
            total = total.saturating_add(sum_gas(&w.records));
        }
        total
    }

    pub fn rewards(&self) -> U256 {
        self.unstake.as_ref().map(|u| u.rewards).unwrap_or_default()
    }
}
