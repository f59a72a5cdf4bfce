//! Mint - open a new two-sided position around the current price

use anyhow::{bail, Result};
use ethers::abi::Token;
use ethers::types::{H256, U256};
use tracing::{info, warn};

use super::manager::{i32_to_int_token, PositionManager};
use super::types::MintResult;
use crate::domain::amm::{calculate_min_amount, calculate_tick_bounds, compute_amounts};
use crate::shared::types::{PositionRange, TxPriority};

impl PositionManager {
    /// Open a position using up to `budget0`/`budget1` of each token.
    ///
    /// Queries pool state, derives tick bounds and optimal amounts, checks
    /// balances, ensures approvals, submits the mint and recovers the new
    /// position id from the receipt's transfer-from-zero event.
    pub async fn mint(&self, budget0: U256, budget1: U256) -> MintResult {
        let mut result = MintResult::default();
        match self.mint_inner(budget0, budget1, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                let message = format!("mint failed: {:#}", e);
                warn!("{}", message);
                result.error = Some(message);
            }
        }
        result
    }

    async fn mint_inner(
        &self,
        budget0: U256,
        budget1: U256,
        result: &mut MintResult,
    ) -> Result<()> {
        if budget0.is_zero() && budget1.is_zero() {
            bail!("both token budgets are zero");
        }

        let state = self.pool_state().await?;
        let (tick_lower, tick_upper) = calculate_tick_bounds(
            state.tick,
            self.params.range_width,
            self.params.tick_spacing,
        )?;
        let (amount0, amount1, liquidity) = compute_amounts(
            state.sqrt_price_x96,
            state.tick,
            tick_lower,
            tick_upper,
            budget0,
            budget1,
        )?;
        if liquidity.is_zero() {
            bail!("budgets produce zero liquidity for range [{}, {}]", tick_lower, tick_upper);
        }
        result.range = Some(PositionRange::new(tick_lower, tick_upper));
        result.amount0 = amount0;
        result.amount1 = amount1;
        result.liquidity = liquidity;

        warn_on_low_utilization("token0", amount0, budget0);
        warn_on_low_utilization("token1", amount1, budget1);

        let balance0 = self.token_balance(&self.erc20_0, self.owner()).await?;
        let balance1 = self.token_balance(&self.erc20_1, self.owner()).await?;
        if balance0 < amount0 || balance1 < amount1 {
            bail!(
                "insufficient balance: need {}/{} have {}/{}",
                amount0,
                amount1,
                balance0,
                balance1
            );
        }

        if !amount0.is_zero() {
            self.ensure_approval(&self.erc20_0, self.npm.address, amount0, &mut result.records)
                .await?;
        }
        if !amount1.is_zero() {
            self.ensure_approval(&self.erc20_1, self.npm.address, amount1, &mut result.records)
                .await?;
        }

        let mint_params = Token::Tuple(vec![
            Token::Address(self.params.token0),
            Token::Address(self.params.token1),
            Token::Uint(U256::from(self.params.pool_fee_pips)),
            i32_to_int_token(tick_lower),
            i32_to_int_token(tick_upper),
            Token::Uint(amount0),
            Token::Uint(amount1),
            Token::Uint(calculate_min_amount(amount0, self.params.slippage_pct)),
            Token::Uint(calculate_min_amount(amount1, self.params.slippage_pct)),
            Token::Address(self.owner()),
            Token::Uint(self.deadline()),
        ]);

        info!(
            tick_lower,
            tick_upper,
            %amount0,
            %amount1,
            %liquidity,
            "submitting mint"
        );
        let tx_hash = self
            .npm
            .send(
                TxPriority::Normal,
                &self.wallet,
                "mint",
                &[mint_params],
                U256::zero(),
            )
            .await?;
        let receipt = self.confirm(tx_hash, "mint", &mut result.records).await?;

        let token_id = self
            .minted_token_id(&receipt)?
            .ok_or_else(|| anyhow::anyhow!("mint receipt carried no transfer-from-zero event"))?;
        info!(%token_id, "position minted");
        result.token_id = Some(token_id);
        Ok(())
    }

    /// The new position's id is the tokenId of the ERC-721 Transfer emitted
    /// by the position manager with the zero address as sender.
    fn minted_token_id(
        &self,
        receipt: &ethers::types::TransactionReceipt,
    ) -> Result<Option<U256>> {
        let transfer = self.npm.event_signature("Transfer")?;
        for log in &receipt.logs {
            if log.address != self.npm.address || log.topics.len() != 4 {
                continue;
            }
            if log.topics[0] == transfer && log.topics[1] == H256::zero() {
                return Ok(Some(U256::from_big_endian(log.topics[3].as_bytes())));
            }
        }
        Ok(None)
    }
}

/// Capital-efficiency warning when the computed amount leaves more than 10%
/// of a budget idle.
fn warn_on_low_utilization(label: &str, amount: U256, budget: U256) {
    if budget.is_zero() {
        return;
    }
    let utilization_pct = amount.saturating_mul(U256::from(100u64)) / budget;
    if utilization_pct < U256::from(90u64) {
        warn!(
            "{} utilization {}% of budget; range is skewed against current price",
            label, utilization_pct
        );
    }
}
