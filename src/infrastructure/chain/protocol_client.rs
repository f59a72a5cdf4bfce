//! Contract call encoding, transaction construction and receipt decoding

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::{Abi, Function, RawLog, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Eip1559TransactionRequest, TransactionReceipt, H256, U256,
};
use tracing::{debug, warn};

use crate::shared::errors::ProtocolError;
use crate::shared::types::TxPriority;

const CALL_RETRIES: usize = 3;
const CALL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A decoded transaction payload with a human-readable rendering.
#[derive(Debug, Clone)]
pub struct DecodedCall {
    pub name: String,
    pub signature: String,
    pub args: Vec<(String, Token)>,
}

impl DecodedCall {
    pub fn pretty(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, args)
    }
}

/// One contract on one chain: encodes calls against its ABI, executes
/// read-only calls with retry, and builds, signs and submits EIP-1559
/// transactions.
///
/// Every `send` consumes the sender's next nonce; callers must serialize
/// sends for the same signer externally.
pub struct ProtocolClient {
    provider: Arc<Provider<Http>>,
    pub address: Address,
    abi: Abi,
    chain_id: u64,
    default_gas_limit: U256,
    priority_fee_gwei: u64,
}

impl ProtocolClient {
    pub fn new(
        provider: Arc<Provider<Http>>,
        address: Address,
        abi: Abi,
        chain_id: u64,
        default_gas_limit: U256,
        priority_fee_gwei: u64,
    ) -> Self {
        Self {
            provider,
            address,
            abi,
            chain_id,
            default_gas_limit,
            priority_fee_gwei,
        }
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }

    fn function(&self, method: &str) -> Result<&Function, ProtocolError> {
        self.abi
            .function(method)
            .map_err(|_| ProtocolError::MethodNotFound(method.to_string()))
    }

    /// Topic0 of a named event in this contract's ABI.
    pub fn event_signature(&self, name: &str) -> Result<H256, ProtocolError> {
        self.abi
            .event(name)
            .map(|e| e.signature())
            .map_err(|_| ProtocolError::Abi(format!("event not found: {}", name)))
    }

    /// ABI-encode a call to `method`, selector included.
    pub fn encode(&self, method: &str, args: &[Token]) -> Result<Bytes, ProtocolError> {
        let function = self.function(method)?;
        let data = function
            .encode_input(args)
            .map_err(|e| ProtocolError::Abi(format!("encode {}: {}", method, e)))?;
        Ok(Bytes::from(data))
    }

    /// Read-only contract call. Transport failures are retried a few times
    /// before giving up; decode failures are terminal.
    pub async fn call(
        &self,
        from: Address,
        method: &str,
        args: &[Token],
    ) -> Result<Vec<Token>, ProtocolError> {
        let function = self.function(method)?;
        let data = function
            .encode_input(args)
            .map_err(|e| ProtocolError::Abi(format!("encode {}: {}", method, e)))?;
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(self.address)
            .data(Bytes::from(data))
            .into();

        let mut last_error = String::new();
        for attempt in 1..=CALL_RETRIES {
            match self.provider.call(&tx, None).await {
                Ok(output) => {
                    return function
                        .decode_output(&output)
                        .map_err(|e| ProtocolError::Abi(format!("decode {}: {}", method, e)));
                }
                Err(e) => {
                    last_error = e.to_string();
                    // Reverts will not succeed on retry.
                    if last_error.contains("execution reverted") {
                        return Err(ProtocolError::Rpc(last_error));
                    }
                    debug!(method, attempt, error = %last_error, "eth_call failed, retrying");
                    tokio::time::sleep(CALL_RETRY_DELAY).await;
                }
            }
        }
        Err(ProtocolError::Rpc(format!(
            "{} failed after {} attempts: {}",
            method, CALL_RETRIES, last_error
        )))
    }

    /// Build, sign and submit an EIP-1559 transaction invoking `method`.
    ///
    /// Gas is estimated with headroom, falling back to the configured default
    /// limit when estimation fails. A fixed priority-fee premium is applied
    /// on top of the suggested fees, doubled for high priority.
    pub async fn send(
        &self,
        priority: TxPriority,
        wallet: &LocalWallet,
        method: &str,
        args: &[Token],
        value: U256,
    ) -> Result<H256, ProtocolError> {
        let from = wallet.address();
        let data = self.encode(method, args)?;

        let mut request = Eip1559TransactionRequest::new()
            .from(from)
            .to(self.address)
            .data(data)
            .value(value)
            .chain_id(self.chain_id);

        let probe: TypedTransaction = request.clone().into();
        let gas_limit = match self.provider.estimate_gas(&probe, None).await {
            Ok(estimate) => estimate * U256::from(120u64) / U256::from(100u64),
            Err(e) => {
                warn!(method, error = %e, default = %self.default_gas_limit,
                    "gas estimation failed, using default limit");
                self.default_gas_limit
            }
        };

        let (max_fee, max_priority_fee) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| ProtocolError::Rpc(format!("fee estimation: {}", e)))?;
        let mut premium = U256::from(self.priority_fee_gwei) * U256::exp10(9);
        if priority == TxPriority::High {
            premium = premium * U256::from(2u64);
        }

        let nonce = self
            .provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| ProtocolError::Rpc(format!("nonce lookup: {}", e)))?;

        request = request
            .gas(gas_limit)
            .max_fee_per_gas(max_fee + premium)
            .max_priority_fee_per_gas(max_priority_fee + premium)
            .nonce(nonce);

        let typed: TypedTransaction = request.into();
        let signature = wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| ProtocolError::Signing(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);

        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| ProtocolError::Rpc(format!("submit {}: {}", method, e)))?;
        let tx_hash = pending.tx_hash();
        debug!(method, ?tx_hash, %gas_limit, %nonce, "transaction submitted");
        Ok(tx_hash)
    }

    /// Raw receipt lookup. `Ok(None)` means the transaction is not yet
    /// mined; any other failure is a transport error.
    pub async fn get_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ProtocolError> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ProtocolError::Rpc(format!("receipt lookup: {}", e)))
    }

    /// Decode every log this contract emitted in `receipt` into a flat
    /// name -> value map. Logs from other contracts or with unknown
    /// signatures are skipped.
    pub fn parse_receipt(&self, receipt: &TransactionReceipt) -> HashMap<String, Token> {
        let mut decoded = HashMap::new();
        for log in &receipt.logs {
            if log.address != self.address {
                continue;
            }
            let Some(topic0) = log.topics.first() else {
                continue;
            };
            for event in self.abi.events() {
                if event.signature() != *topic0 {
                    continue;
                }
                let raw = RawLog {
                    topics: log.topics.clone(),
                    data: log.data.to_vec(),
                };
                match event.parse_log(raw) {
                    Ok(parsed) => {
                        for param in parsed.params {
                            decoded.insert(param.name, param.value);
                        }
                    }
                    Err(e) => debug!(event = %event.name, error = %e, "log did not decode"),
                }
                break;
            }
        }
        decoded
    }

    /// Decode transaction calldata by selector lookup.
    pub fn decode_transaction(&self, data: &[u8]) -> Result<DecodedCall, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::Abi("calldata shorter than selector".into()));
        }
        let selector = &data[..4];
        for function in self.abi.functions() {
            if function.short_signature() == selector {
                let values = function
                    .decode_input(&data[4..])
                    .map_err(|e| ProtocolError::Abi(format!("decode input: {}", e)))?;
                let args = function
                    .inputs
                    .iter()
                    .map(|p| p.name.clone())
                    .zip(values)
                    .collect();
                return Ok(DecodedCall {
                    name: function.name.clone(),
                    signature: function.signature(),
                    args,
                });
            }
        }
        Err(ProtocolError::SelectorNotFound(hex::encode(selector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::chain::abi::parse_abi;
    use ethers::types::Log;

    const ERC20_ABI: &str = r#"[
        {"type":"function","name":"approve","stateMutability":"nonpayable",
         "inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"event","name":"Transfer","anonymous":false,
         "inputs":[{"name":"from","type":"address","indexed":true},
                    {"name":"to","type":"address","indexed":true},
                    {"name":"value","type":"uint256","indexed":false}]}
    ]"#;

    fn client() -> ProtocolClient {
        let provider = Provider::<Http>::try_from("http://127.0.0.1:8545").unwrap();
        ProtocolClient::new(
            Arc::new(provider),
            Address::repeat_byte(0x11),
            parse_abi(ERC20_ABI).unwrap(),
            31337,
            U256::from(500_000u64),
            2,
        )
    }

    #[test]
    fn test_encode_and_decode_roundtrip() {
        let client = client();
        let spender = Address::repeat_byte(0x22);
        let amount = U256::from(1_000u64);
        let data = client
            .encode(
                "approve",
                &[Token::Address(spender), Token::Uint(amount)],
            )
            .unwrap();

        let decoded = client.decode_transaction(&data).unwrap();
        assert_eq!(decoded.name, "approve");
        assert_eq!(decoded.args.len(), 2);
        assert_eq!(decoded.args[0].0, "spender");
        assert_eq!(decoded.args[1].1, Token::Uint(amount));
        assert!(decoded.pretty().starts_with("approve(spender="));
    }

    #[test]
    fn test_unknown_selector_rejected() {
        let client = client();
        let err = client.decode_transaction(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(matches!(err, ProtocolError::SelectorNotFound(_)));
        assert!(client.decode_transaction(&[0x01]).is_err());
    }

    #[test]
    fn test_parse_receipt_decodes_own_logs_only() {
        let client = client();
        let event = parse_abi(ERC20_ABI).unwrap().event("Transfer").unwrap().clone();

        let mut value_bytes = [0u8; 32];
        U256::from(42u64).to_big_endian(&mut value_bytes);
        let make_log = |address: Address| Log {
            address,
            topics: vec![
                event.signature(),
                H256::from(Address::repeat_byte(0x33)),
                H256::from(Address::repeat_byte(0x44)),
            ],
            data: Bytes::from(value_bytes.to_vec()),
            ..Default::default()
        };

        let mut receipt = TransactionReceipt::default();
        receipt.logs = vec![
            make_log(Address::repeat_byte(0x99)), // foreign contract, skipped
            make_log(client.address),
        ];

        let decoded = client.parse_receipt(&receipt);
        assert_eq!(decoded.get("value"), Some(&Token::Uint(U256::from(42u64))));
        assert_eq!(
            decoded.get("to"),
            Some(&Token::Address(Address::repeat_byte(0x44)))
        );
    }

    #[test]
    fn test_unknown_method_rejected() {
        let client = client();
        assert!(matches!(
            client.encode("transferFrom", &[]),
            Err(ProtocolError::MethodNotFound(_))
        ));
    }
}
