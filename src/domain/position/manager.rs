//! Shared state and helpers for the position operations

use anyhow::{anyhow, bail, Result};
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use tracing::{debug, info};

use crate::infrastructure::chain::{ProtocolClient, TxListener};
use crate::shared::errors::ExecutionError;
use crate::shared::types::{AmmState, TransactionRecord, TxPriority};

/// Static parameters the operations need, resolved once from config.
#[derive(Debug, Clone)]
pub struct PositionParams {
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    pub tick_spacing: i32,
    pub range_width: i32,
    pub slippage_pct: u8,
    pub pool_fee_pips: u32,
    pub deadline_secs: u64,
}

/// Subset of the `positions(tokenId)` tuple the operations care about.
#[derive(Debug, Clone, Copy)]
pub struct PositionInfo {
    pub token0: Address,
    pub token1: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: U256,
}

/// Composes the protocol clients, the confirmation listener and the AMM
/// math into validated, gas-tracked position operations.
pub struct PositionManager {
    pub pool: ProtocolClient,
    pub npm: ProtocolClient,
    pub gauge: ProtocolClient,
    pub router: ProtocolClient,
    pub erc20_0: ProtocolClient,
    pub erc20_1: ProtocolClient,
    pub listener: TxListener,
    pub(crate) wallet: LocalWallet,
    pub params: PositionParams,
}

impl PositionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: ProtocolClient,
        npm: ProtocolClient,
        gauge: ProtocolClient,
        router: ProtocolClient,
        erc20_0: ProtocolClient,
        erc20_1: ProtocolClient,
        listener: TxListener,
        wallet: LocalWallet,
        params: PositionParams,
    ) -> Self {
        Self {
            pool,
            npm,
            gauge,
            router,
            erc20_0,
            erc20_1,
            listener,
            wallet,
            params,
        }
    }

    pub fn owner(&self) -> Address {
        self.wallet.address()
    }

    /// Current pool snapshot: sqrt price, tick and active liquidity.
    pub async fn pool_state(&self) -> Result<AmmState> {
        let (slot0, liquidity) = futures::try_join!(
            self.pool.call(self.owner(), "slot0", &[]),
            self.pool.call(self.owner(), "liquidity", &[])
        )?;
        let sqrt_price_x96 = match slot0.first() {
            Some(Token::Uint(v)) => *v,
            _ => bail!("slot0 returned no sqrt price"),
        };
        let tick = match slot0.get(1) {
            Some(Token::Int(v)) => int_token_to_i32(*v)?,
            _ => bail!("slot0 returned no tick"),
        };
        let active_liquidity = match liquidity.first() {
            Some(Token::Uint(v)) => v.as_u128(),
            _ => bail!("liquidity call returned no value"),
        };
        Ok(AmmState {
            sqrt_price_x96,
            tick,
            active_liquidity,
        })
    }

    pub async fn token_balance(&self, token: &ProtocolClient, who: Address) -> Result<U256> {
        let out = token
            .call(self.owner(), "balanceOf", &[Token::Address(who)])
            .await?;
        match out.first() {
            Some(Token::Uint(v)) => Ok(*v),
            _ => bail!("balanceOf returned no value"),
        }
    }

    /// Query the allowance and approve exactly `required` only when the
    /// existing allowance does not already cover it. Skipping the redundant
    /// approval keeps gas spend minimal and makes the helper idempotent.
    pub async fn ensure_approval(
        &self,
        token: &ProtocolClient,
        spender: Address,
        required: U256,
        records: &mut Vec<TransactionRecord>,
    ) -> Result<()> {
        let out = token
            .call(
                self.owner(),
                "allowance",
                &[Token::Address(self.owner()), Token::Address(spender)],
            )
            .await?;
        let current = match out.first() {
            Some(Token::Uint(v)) => *v,
            _ => bail!("allowance returned no value"),
        };
        if !approval_needed(current, required) {
            debug!(?spender, %current, %required, "allowance already sufficient, skipping approval");
            return Ok(());
        }

        info!(token = ?token.address, ?spender, %required, "approving token spend");
        let tx_hash = token
            .send(
                TxPriority::Normal,
                &self.wallet,
                "approve",
                &[Token::Address(spender), Token::Uint(required)],
                U256::zero(),
            )
            .await?;
        self.confirm(tx_hash, "approve", records).await?;
        Ok(())
    }

    /// ERC-721 flavor of the approval check, for handing the position NFT
    /// to the reward gauge.
    pub async fn ensure_nft_approval(
        &self,
        spender: Address,
        token_id: U256,
        records: &mut Vec<TransactionRecord>,
    ) -> Result<()> {
        let out = self
            .npm
            .call(self.owner(), "getApproved", &[Token::Uint(token_id)])
            .await?;
        if let Some(Token::Address(approved)) = out.first() {
            if *approved == spender {
                debug!(%token_id, "position already approved for gauge");
                return Ok(());
            }
        }
        let tx_hash = self
            .npm
            .send(
                TxPriority::Normal,
                &self.wallet,
                "approve",
                &[Token::Address(spender), Token::Uint(token_id)],
                U256::zero(),
            )
            .await?;
        self.confirm(tx_hash, "approve_nft", records).await?;
        Ok(())
    }

    /// Wait for confirmation and append the transaction record. A reverted
    /// transaction still produces a record (the gas was spent) before the
    /// error is raised.
    pub(crate) async fn confirm(
        &self,
        tx_hash: H256,
        label: &str,
        records: &mut Vec<TransactionRecord>,
    ) -> Result<TransactionReceipt> {
        match self.listener.wait_for_transaction(tx_hash).await {
            Ok(receipt) => {
                records.push(TransactionRecord::from_receipt(&receipt, label));
                Ok(receipt)
            }
            Err(ExecutionError::TransactionFailed { tx_hash, receipt }) => {
                records.push(TransactionRecord::from_receipt(&receipt, label));
                Err(anyhow!(
                    "{} execution reverted on-chain (tx {:?})",
                    label,
                    tx_hash
                ))
            }
            Err(e) => Err(anyhow!("{} confirmation: {}", label, e)),
        }
    }

    /// Decoded subset of the position manager's `positions(tokenId)` data.
    pub async fn position_info(&self, token_id: U256) -> Result<PositionInfo> {
        let out = self
            .npm
            .call(self.owner(), "positions", &[Token::Uint(token_id)])
            .await?;
        // (nonce, operator, token0, token1, fee, tickLower, tickUpper,
        //  liquidity, feeGrowth0, feeGrowth1, tokensOwed0, tokensOwed1)
        match (out.get(2), out.get(3), out.get(5), out.get(6), out.get(7)) {
            (
                Some(Token::Address(token0)),
                Some(Token::Address(token1)),
                Some(Token::Int(lower)),
                Some(Token::Int(upper)),
                Some(Token::Uint(liquidity)),
            ) => Ok(PositionInfo {
                token0: *token0,
                token1: *token1,
                tick_lower: int_token_to_i32(*lower)?,
                tick_upper: int_token_to_i32(*upper)?,
                liquidity: *liquidity,
            }),
            _ => bail!("positions({}) returned unexpected shape", token_id),
        }
    }

    /// Owner of a position NFT, or an error naming the mismatch.
    pub(crate) async fn require_position_owner(&self, token_id: U256) -> Result<()> {
        let out = self
            .npm
            .call(self.owner(), "ownerOf", &[Token::Uint(token_id)])
            .await?;
        match out.first() {
            Some(Token::Address(holder)) if *holder == self.owner() => Ok(()),
            Some(Token::Address(holder)) => bail!(
                "wallet {:?} is not the owner of position {} (held by {:?})",
                self.owner(),
                token_id,
                holder
            ),
            _ => bail!("ownerOf returned no value for position {}", token_id),
        }
    }

    pub(crate) fn deadline(&self) -> U256 {
        let now = chrono::Utc::now().timestamp() as u64;
        U256::from(now + self.params.deadline_secs)
    }
}

/// True when the existing allowance does not cover the required amount.
pub(crate) fn approval_needed(current: U256, required: U256) -> bool {
    current < required
}

/// Decode an ABI int token (sign-extended to 256 bits) into an i32 tick.
pub(crate) fn int_token_to_i32(value: U256) -> Result<i32> {
    if value <= U256::from(i32::MAX as u64) {
        return Ok(value.low_u64() as i32);
    }
    let negated = (!value).overflowing_add(U256::one()).0;
    if negated > U256::from(i32::MAX as u64) {
        bail!("int token out of i32 range");
    }
    Ok(-(negated.low_u64() as i64) as i32)
}

/// Encode an i32 tick as a two's-complement ABI int token.
pub(crate) fn i32_to_int_token(value: i32) -> Token {
    if value >= 0 {
        Token::Int(U256::from(value as u64))
    } else {
        Token::Int(U256::MAX - U256::from((-(value as i64) - 1) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_needed_boundary() {
        let required = U256::from(1_000u64);
        assert!(approval_needed(U256::zero(), required));
        assert!(approval_needed(U256::from(999u64), required));
        // equal or larger allowance skips the second approval entirely
        assert!(!approval_needed(required, required));
        assert!(!approval_needed(U256::MAX, required));
    }

    #[test]
    fn test_int_token_roundtrip() {
        for tick in [-887_272, -600, -1, 0, 1, 600, 887_272] {
            let token = i32_to_int_token(tick);
            let Token::Int(raw) = token else { panic!() };
            assert_eq!(int_token_to_i32(raw).unwrap(), tick);
        }
    }

    #[test]
    fn test_negative_one_is_all_ones() {
        let Token::Int(raw) = i32_to_int_token(-1) else {
            panic!()
        };
        assert_eq!(raw, U256::MAX);
    }
}
