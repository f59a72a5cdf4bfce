//! Swap - single-hop router swap used to rebalance idle balances

use anyhow::{bail, Result};
use ethers::abi::Token;
use ethers::types::U256;
use tracing::{info, warn};

use super::manager::PositionManager;
use super::types::SwapOutcome;
use crate::domain::amm::tick_math::mul_div;
use crate::domain::amm::{calculate_min_amount, Q96};
use crate::shared::types::TxPriority;

impl PositionManager {
    /// Swap `amount_in` of one pool token for the other through the router,
    /// with the minimum output derived from the pool's spot price and the
    /// configured slippage tolerance.
    pub async fn swap(&self, zero_for_one: bool, amount_in: U256) -> SwapOutcome {
        let mut result = SwapOutcome::default();
        match self.swap_inner(zero_for_one, amount_in, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                let message = format!("swap failed: {:#}", e);
                warn!("{}", message);
                result.error = Some(message);
            }
        }
        result
    }

    async fn swap_inner(
        &self,
        zero_for_one: bool,
        amount_in: U256,
        result: &mut SwapOutcome,
    ) -> Result<()> {
        if amount_in.is_zero() {
            bail!("swap amount is zero");
        }
        let (token_in_client, token_in, token_out) = if zero_for_one {
            (&self.erc20_0, self.params.token0, self.params.token1)
        } else {
            (&self.erc20_1, self.params.token1, self.params.token0)
        };

        let balance = self.token_balance(token_in_client, self.owner()).await?;
        if balance < amount_in {
            bail!(
                "insufficient balance for swap: need {} have {}",
                amount_in,
                balance
            );
        }

        self.ensure_approval(
            token_in_client,
            self.router.address,
            amount_in,
            &mut result.records,
        )
        .await?;

        // Spot-price expectation: out = in * P for 0->1, out = in / P for
        // 1->0, with P = (sqrtPrice/2^96)^2 evaluated in integer space.
        let state = self.pool_state().await?;
        let expected_out = if zero_for_one {
            mul_div(
                mul_div(amount_in, state.sqrt_price_x96, Q96)?,
                state.sqrt_price_x96,
                Q96,
            )?
        } else {
            mul_div(
                mul_div(amount_in, Q96, state.sqrt_price_x96)?,
                Q96,
                state.sqrt_price_x96,
            )?
        };
        let min_out = calculate_min_amount(expected_out, self.params.slippage_pct);

        let swap_params = Token::Tuple(vec![
            Token::Address(token_in),
            Token::Address(token_out),
            Token::Uint(U256::from(self.params.pool_fee_pips)),
            Token::Address(self.owner()),
            Token::Uint(self.deadline()),
            Token::Uint(amount_in),
            Token::Uint(min_out),
            Token::Uint(U256::zero()), // no sqrt price limit
        ]);

        info!(zero_for_one, %amount_in, %min_out, "submitting rebalance swap");
        let tx_hash = self
            .router
            .send(
                TxPriority::Normal,
                &self.wallet,
                "exactInputSingle",
                &[swap_params],
                U256::zero(),
            )
            .await?;
        let receipt = self.confirm(tx_hash, "swap", &mut result.records).await?;

        result.amount_out = self
            .received_amount(&receipt, token_out)?
            .unwrap_or(expected_out);
        result.fee_paid = amount_in * U256::from(self.params.pool_fee_pips)
            / U256::from(1_000_000u64);
        Ok(())
    }

    /// Amount of `token` transferred to the wallet within `receipt`, read
    /// from the token's Transfer log.
    fn received_amount(
        &self,
        receipt: &ethers::types::TransactionReceipt,
        token: ethers::types::Address,
    ) -> Result<Option<U256>> {
        let transfer = self.erc20_0.event_signature("Transfer")?;
        let owner_topic = ethers::types::H256::from(self.owner());
        for log in &receipt.logs {
            if log.address == token
                && log.topics.len() == 3
                && log.topics[0] == transfer
                && log.topics[2] == owner_topic
            {
                return Ok(Some(U256::from_big_endian(&log.data)));
            }
        }
        Ok(None)
    }
}
