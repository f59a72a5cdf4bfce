//! Small conversion helpers shared across modules

use ethers::types::U256;

/// Lossy conversion of a U256 into f64 (display and valuation only, never
/// used to gate on-chain amounts).
pub fn u256_to_f64(value: U256) -> f64 {
    let mut acc = 0f64;
    for i in (0..4).rev() {
        acc = acc * 18_446_744_073_709_551_616.0 + value.0[i] as f64;
    }
    acc
}

/// Wei to native-currency units.
pub fn wei_to_eth(wei: U256) -> f64 {
    u256_to_f64(wei) / 1e18
}

/// Raw token amount to UI units given the token's decimals.
pub fn to_ui_amount(raw: U256, decimals: u8) -> f64 {
    u256_to_f64(raw) / 10f64.powi(decimals as i32)
}

/// UI units back to a raw token amount, floored. Non-finite or non-positive
/// input maps to zero so callers can treat the result as "nothing to do".
pub fn ui_amount_to_raw(amount: f64, decimals: u8) -> U256 {
    let scaled = amount * 10f64.powi(decimals as i32);
    if !scaled.is_finite() || scaled < 1.0 {
        return U256::zero();
    }
    U256::from(scaled as u128)
}
