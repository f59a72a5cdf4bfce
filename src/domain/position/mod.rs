//! Position operations - mint, stake, unstake, withdraw, swap
//!
//! Each operation validates its inputs, executes one or more chain
//! transactions waiting for confirmation after each, and returns a result
//! struct carrying every transaction record produced, failures included.

pub mod manager;
mod mint;
mod stake;
mod swap;
pub mod types;
mod unstake;
mod withdraw;

pub use manager::{PositionInfo, PositionManager, PositionParams};
pub use types::{
    MintResult, RebalanceWorkflow, StakingResult, SwapOutcome, UnstakeResult, WithdrawResult,
};
