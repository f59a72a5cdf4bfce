//! Unstake - leave the farm and claim rewards in one atomic multicall

use anyhow::{bail, Result};
use ethers::abi::Token;
use ethers::types::U256;
use tracing::{info, warn};

use super::manager::PositionManager;
use super::types::UnstakeResult;
use crate::shared::types::TxPriority;

impl PositionManager {
    /// Exit farming and claim accrued rewards for `token_id`. Both calls
    /// ride one multicall so the position can never end up out of the farm
    /// with its rewards stranded.
    pub async fn unstake(&self, token_id: U256) -> UnstakeResult {
        let mut result = UnstakeResult::default();
        match self.unstake_inner(token_id, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                let message = format!("unstake of position {} failed: {:#}", token_id, e);
                warn!("{}", message);
                result.error = Some(message);
            }
        }
        result
    }

    async fn unstake_inner(&self, token_id: U256, result: &mut UnstakeResult) -> Result<()> {
        self.require_position_owner(token_id).await?;

        let deposit = self
            .gauge
            .call(self.owner(), "deposits", &[Token::Uint(token_id)])
            .await?;
        match deposit.first() {
            Some(Token::Address(depositor)) if *depositor == self.owner() => {}
            Some(Token::Address(_)) | None => {
                bail!("position {} is not currently farmed by this wallet", token_id)
            }
            _ => bail!("deposits returned unexpected data for position {}", token_id),
        }

        let exit_call = self
            .gauge
            .encode("exitFarming", &[Token::Uint(token_id)])?;
        let claim_call = self
            .gauge
            .encode("claimReward", &[Token::Address(self.owner())])?;

        info!(%token_id, "exiting farm and claiming rewards (multicall)");
        let tx_hash = self
            .gauge
            .send(
                TxPriority::Normal,
                &self.wallet,
                "multicall",
                &[Token::Array(vec![
                    Token::Bytes(exit_call.to_vec()),
                    Token::Bytes(claim_call.to_vec()),
                ])],
                U256::zero(),
            )
            .await?;
        self.confirm(tx_hash, "unstake", &mut result.records).await?;

        // Reward amount parsing from the claim receipt is a known gap in the
        // gauge interface; record zero rather than guessing.
        result.rewards = U256::zero();
        warn!(%token_id, "reward amount not parsed from claim receipt, recording zero");
        Ok(())
    }
}
