//! Stake - deposit the position NFT into the reward gauge

use anyhow::Result;
use ethers::abi::Token;
use ethers::types::U256;
use tracing::{info, warn};

use super::manager::PositionManager;
use super::types::StakingResult;
use crate::shared::types::TxPriority;

impl PositionManager {
    pub async fn stake(&self, token_id: U256) -> StakingResult {
        let mut result = StakingResult::default();
        match self.stake_inner(token_id, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                let message = format!("stake of position {} failed: {:#}", token_id, e);
                warn!("{}", message);
                result.error = Some(message);
            }
        }
        result
    }

    async fn stake_inner(&self, token_id: U256, result: &mut StakingResult) -> Result<()> {
        self.require_position_owner(token_id).await?;
        self.ensure_nft_approval(self.gauge.address, token_id, &mut result.records)
            .await?;

        info!(%token_id, gauge = ?self.gauge.address, "depositing position into gauge");
        let tx_hash = self
            .gauge
            .send(
                TxPriority::Normal,
                &self.wallet,
                "deposit",
                &[Token::Uint(token_id)],
                U256::zero(),
            )
            .await?;
        self.confirm(tx_hash, "stake", &mut result.records).await?;
        Ok(())
    }
}
