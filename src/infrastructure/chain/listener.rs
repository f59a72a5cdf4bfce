//! Transaction confirmation polling

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::{TransactionReceipt, H256, U64};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::shared::errors::ExecutionError;

/// Polls for a submitted transaction's receipt until it succeeds, reverts
/// or the timeout elapses. "Not found" responses are treated as not yet
/// mined and silently retried; transport errors propagate immediately.
pub struct TxListener<P: JsonRpcClient = Http> {
    provider: Arc<Provider<P>>,
    poll_interval: Duration,
    timeout: Duration,
}

impl<P: JsonRpcClient> TxListener<P> {
    pub fn new(provider: Arc<Provider<P>>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            provider,
            poll_interval,
            timeout,
        }
    }

    pub async fn wait_for_transaction(
        &self,
        tx_hash: H256,
    ) -> Result<TransactionReceipt, ExecutionError> {
        let deadline = Instant::now() + self.timeout;
        debug!(?tx_hash, "waiting for confirmation");
        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    return if receipt.status == Some(U64::one()) {
                        debug!(?tx_hash, block = ?receipt.block_number, "transaction confirmed");
                        Ok(receipt)
                    } else {
                        Err(ExecutionError::TransactionFailed {
                            tx_hash,
                            receipt: Box::new(receipt),
                        })
                    };
                }
                Ok(None) => {
                    trace!(?tx_hash, "not yet mined");
                }
                Err(e) => {
                    return Err(ExecutionError::NetworkError(format!(
                        "receipt lookup for {:?}: {}",
                        tx_hash, e
                    )));
                }
            }
            if Instant::now() >= deadline {
                return Err(ExecutionError::Timeout(tx_hash));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
