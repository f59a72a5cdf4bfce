//! Error handling for the application

use ethers::types::{TransactionReceipt, H256};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Monitor interval too short: {0}s (minimum 60s)")]
    MonitorIntervalTooShort(u64),

    #[error("Stability threshold out of range: {0} (expected 0 < t < 0.1)")]
    InvalidStabilityThreshold(f64),

    #[error("Required stable intervals too low: {0} (minimum 3)")]
    InvalidStableIntervals(u32),

    #[error("Range width must be even and positive: {0}")]
    InvalidRangeWidth(i32),

    #[error("Slippage percent out of range: {0} (expected 1-50)")]
    InvalidSlippage(u8),

    #[error("Circuit breaker threshold too low: {0} (minimum 3)")]
    InvalidBreakerThreshold(usize),

    #[error("Circuit breaker window must be positive")]
    InvalidBreakerWindow,

    #[error("Invalid address for {0}: {1}")]
    InvalidAddress(&'static str, String),

    #[error("Configuration error: {0}")]
    Invalid(String),
}

/// AMM math errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Tick {0} outside valid range [-887272, 887272]")]
    TickOutOfRange(i32),

    #[error("Invalid tick range: lower {lower} must be below upper {upper}")]
    InvalidRange { lower: i32, upper: i32 },

    #[error("Tick bounds collapsed after clamping: lower {lower}, upper {upper}")]
    BoundsCollapsed { lower: i32, upper: i32 },

    #[error("Tick spacing must be positive: {0}")]
    InvalidTickSpacing(i32),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Protocol client errors (ABI handling, RPC transport, encoding)
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Method not found in ABI: {0}")]
    MethodNotFound(String),

    #[error("Selector not found in ABI: 0x{0}")]
    SelectorNotFound(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Unexpected return data for {0}")]
    UnexpectedReturnData(String),
}

/// Transaction execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The receipt exists and reports a reverted execution. The receipt is
    /// retained so gas already spent still enters the accounting.
    #[error("Transaction {tx_hash:?} reverted on-chain")]
    TransactionFailed {
        tx_hash: H256,
        receipt: Box<TransactionReceipt>,
    },

    #[error("Timed out waiting for transaction {0:?}")]
    Timeout(H256),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Strategy lifecycle errors
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy halted by circuit breaker (net PnL: {net_pnl:.6})")]
    Halted { net_pnl: f64 },

    #[error("Strategy run cancelled")]
    Cancelled,

    #[error("Startup validation failed: {0}")]
    Startup(String),
}

const CRITICAL_PHRASES: [&str; 8] = [
    "insufficient funds",
    "insufficient balance",
    "not the owner",
    "non-ownership",
    "unauthorized",
    "execution reverted",
    "paused",
    "nonexistent token",
];

/// Classify an error message as critical. Critical errors indicate the
/// strategy's assumptions about wallet or position state no longer hold and
/// force an immediate halt regardless of circuit breaker counters.
pub fn is_critical(message: &str) -> bool {
    let lower = message.to_lowercase();
    CRITICAL_PHRASES.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_classification() {
        assert!(is_critical("RPC: insufficient funds for gas * price"));
        assert!(is_critical("execution reverted: STF"));
        assert!(is_critical("caller is not the owner of token 42"));
        assert!(is_critical("ERC721: operator query for nonexistent token"));
        assert!(is_critical("Pausable: paused"));
        assert!(!is_critical("connection reset by peer"));
        assert!(!is_critical("timed out waiting for receipt"));
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        assert!(is_critical("Execution Reverted"));
        assert!(is_critical("INSUFFICIENT BALANCE"));
    }
}
