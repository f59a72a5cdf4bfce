//! AMM fixed-point mathematics
//!
//! Pure functions only; no chain access. Results must match the on-chain
//! integer arithmetic exactly.

pub mod liquidity;
pub mod tick_math;

pub use liquidity::{
    amounts_for_liquidity, calculate_min_amount, calculate_tick_bounds, compute_amounts,
};
pub use tick_math::{sqrt_price_x96_to_price, tick_to_sqrt_price_x96, MAX_TICK, MIN_TICK, Q96};
