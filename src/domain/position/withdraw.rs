//! Withdraw - decrease, collect and burn in one atomic multicall

use anyhow::{bail, Result};
use ethers::abi::Token;
use ethers::types::U256;
use tracing::{info, warn};

use super::manager::PositionManager;
use super::types::WithdrawResult;
use crate::domain::amm::{amounts_for_liquidity, calculate_min_amount};
use crate::shared::types::TxPriority;

/// uint128 max, the sentinel `collect` takes for "everything owed".
fn u128_max() -> U256 {
    U256::from(u128::MAX)
}

impl PositionManager {
    /// Remove all liquidity, collect what is owed and burn the NFT, batched
    /// into one multicall so the position can never be left in a
    /// collected-but-not-burned state.
    pub async fn withdraw(&self, token_id: U256) -> WithdrawResult {
        let mut result = WithdrawResult::default();
        match self.withdraw_inner(token_id, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                let message = format!("withdraw of position {} failed: {:#}", token_id, e);
                warn!("{}", message);
                result.error = Some(message);
            }
        }
        result
    }

    async fn withdraw_inner(&self, token_id: U256, result: &mut WithdrawResult) -> Result<()> {
        self.require_position_owner(token_id).await?;

        let position = self.position_info(token_id).await?;
        let (tick_lower, tick_upper, liquidity) =
            (position.tick_lower, position.tick_upper, position.liquidity);
        if liquidity.is_zero() {
            bail!("position {} has no liquidity to withdraw", token_id);
        }

        // Expected amounts at the current price set the slippage floor for
        // decreaseLiquidity.
        let state = self.pool_state().await?;
        let (expected0, expected1) =
            amounts_for_liquidity(state.sqrt_price_x96, tick_lower, tick_upper, liquidity)?;
        let min0 = calculate_min_amount(expected0, self.params.slippage_pct);
        let min1 = calculate_min_amount(expected1, self.params.slippage_pct);

        let decrease_call = self.npm.encode(
            "decreaseLiquidity",
            &[Token::Tuple(vec![
                Token::Uint(token_id),
                Token::Uint(liquidity),
                Token::Uint(min0),
                Token::Uint(min1),
                Token::Uint(self.deadline()),
            ])],
        )?;
        let collect_call = self.npm.encode(
            "collect",
            &[Token::Tuple(vec![
                Token::Uint(token_id),
                Token::Address(self.owner()),
                Token::Uint(u128_max()),
                Token::Uint(u128_max()),
            ])],
        )?;
        let burn_call = self.npm.encode("burn", &[Token::Uint(token_id)])?;

        info!(%token_id, %liquidity, "withdrawing position (multicall: decrease, collect, burn)");
        let tx_hash = self
            .npm
            .send(
                TxPriority::High,
                &self.wallet,
                "multicall",
                &[Token::Array(vec![
                    Token::Bytes(decrease_call.to_vec()),
                    Token::Bytes(collect_call.to_vec()),
                    Token::Bytes(burn_call.to_vec()),
                ])],
                U256::zero(),
            )
            .await?;
        let receipt = self
            .confirm(tx_hash, "withdraw", &mut result.records)
            .await?;

        // Collect is the last amount-bearing event the position manager
        // emits here, so the decoded map holds the collected totals.
        let decoded = self.npm.parse_receipt(&receipt);
        if let Some(Token::Uint(amount0)) = decoded.get("amount0") {
            result.amount0 = *amount0;
        }
        if let Some(Token::Uint(amount1)) = decoded.get("amount1") {
            result.amount1 = *amount1;
        }
        info!(%token_id, amount0 = %result.amount0, amount1 = %result.amount1, "position withdrawn");
        Ok(())
    }

    /// First position NFT the wallet owns, for rebalances that lost track
    /// of the identifier.
    pub async fn first_owned_position(&self) -> Result<Option<U256>> {
        let out = self
            .npm
            .call(self.owner(), "balanceOf", &[Token::Address(self.owner())])
            .await?;
        let count = match out.first() {
            Some(Token::Uint(v)) => *v,
            _ => bail!("balanceOf returned no value"),
        };
        if count.is_zero() {
            return Ok(None);
        }
        let out = self
            .npm
            .call(
                self.owner(),
                "tokenOfOwnerByIndex",
                &[Token::Address(self.owner()), Token::Uint(U256::zero())],
            )
            .await?;
        match out.first() {
            Some(Token::Uint(id)) => Ok(Some(*id)),
            _ => bail!("tokenOfOwnerByIndex returned no value"),
        }
    }
}
