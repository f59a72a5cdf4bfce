//! Tick index to sqrt-price conversion
//!
//! Reproduces the on-chain fixed-point algorithm bit for bit: the result
//! gates which mint and swap amounts the pool accepts, so floating point is
//! never involved.

use ethers::types::{U256, U512};

use crate::shared::errors::MathError;

/// Lowest tick usable in any pool.
pub const MIN_TICK: i32 = -887_272;
/// Highest tick usable in any pool.
pub const MAX_TICK: i32 = 887_272;

/// 2^96, the Q96 fixed-point scale.
pub const Q96: U256 = U256([0x0, 0x100000000, 0x0, 0x0]);

/// 2^128, the Q128 scale used for intermediate precision.
const Q128: U256 = U256([0x0, 0x0, 0x1, 0x0]);

/// Per-bit Q128 multipliers for the binary expansion of |tick|. Entry `i`
/// holds sqrt(1/1.0001)^(2^i) in Q128.
const SQRT_RATIO_MULTIPLIERS: [U256; 20] = [
    U256([0xaa2d162d1a594001, 0xfffcb933bd6fad37, 0x0, 0x0]),
    U256([0x59a46990580e213a, 0xfff97272373d4132, 0x0, 0x0]),
    U256([0xef12357cf3c7fdcc, 0xfff2e50f5f656932, 0x0, 0x0]),
    U256([0x1c3624eaa0941cd0, 0xffe5caca7e10e4e6, 0x0, 0x0]),
    U256([0xc9db58835c926644, 0xffcb9843d60f6159, 0x0, 0x0]),
    U256([0x472e6896dfb254c0, 0xff973b41fa98c081, 0x0, 0x0]),
    U256([0x43ec78b326b52861, 0xff2ea16466c96a38, 0x0, 0x0]),
    U256([0x11c461f1969c3053, 0xfe5dee046a99a2a8, 0x0, 0x0]),
    U256([0xdcffc83b479aa3a4, 0xfcbe86c7900a88ae, 0x0, 0x0]),
    U256([0x6f2b074cf7815e54, 0xf987a7253ac41317, 0x0, 0x0]),
    U256([0x940c7a398e4b70f3, 0xf3392b0822b70005, 0x0, 0x0]),
    U256([0x43b29c7fa6e889d9, 0xe7159475a2c29b74, 0x0, 0x0]),
    U256([0x845ad8f792aa5825, 0xd097f3bdfd2022b8, 0x0, 0x0]),
    U256([0x8a65dc1f90e061e5, 0xa9f746462d870fdf, 0x0, 0x0]),
    U256([0x90bb3df62baf32f7, 0x70d869a156d2a1b8, 0x0, 0x0]),
    U256([0x81231505542fcfa6, 0x31be135f97d08fd9, 0x0, 0x0]),
    U256([0xc677de54f3e99bc9, 0x9aa508b5b7a84e1, 0x0, 0x0]),
    U256([0x6699c329225ee604, 0x5d6af8dedb8119, 0x0, 0x0]),
    U256([0x1ea926041bedfe98, 0x2216e584f5fa, 0x0, 0x0]),
    U256([0x91f7dc42444e8fa2, 0x48a1703, 0x0, 0x0]),
];

/// Convert a tick index to the pool's sqrt price in Q96.
///
/// Binary expansion of |tick| against the per-bit multipliers at Q128
/// precision, reciprocal for positive ticks, then a rounding-up right shift
/// down to Q96.
pub fn tick_to_sqrt_price_x96(tick: i32) -> Result<U256, MathError> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(MathError::TickOutOfRange(tick));
    }

    let mut ratio = if abs_tick & 1 != 0 {
        SQRT_RATIO_MULTIPLIERS[0]
    } else {
        Q128
    };
    for (i, multiplier) in SQRT_RATIO_MULTIPLIERS.iter().enumerate().skip(1) {
        if abs_tick & (1 << i) != 0 {
            let wide = ratio.full_mul(*multiplier) >> 128;
            ratio = U256::try_from(wide).map_err(|_| MathError::Overflow("tick ratio"))?;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128 -> Q96, rounding up so the result matches the on-chain value.
    let shifted = ratio >> 32;
    let round_up = !(ratio & U256::from(0xffff_ffffu64)).is_zero();
    Ok(if round_up {
        shifted + U256::one()
    } else {
        shifted
    })
}

/// Spot price (token1 per token0, decimal-adjusted) from a Q96 sqrt price.
/// Lossy; used for valuation and stability tracking only.
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    let sqrt = crate::shared::utils::u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
    sqrt * sqrt * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

/// Full-width multiply then divide, truncating toward zero.
pub(crate) fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::Overflow("division by zero"));
    }
    let wide: U512 = a.full_mul(b) / U512::from(denominator);
    U256::try_from(wide).map_err(|_| MathError::Overflow("mul_div"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_zero_is_q96() {
        assert_eq!(tick_to_sqrt_price_x96(0).unwrap(), Q96);
    }

    #[test]
    fn test_known_onchain_values() {
        // Reference values produced by the deployed pool contracts.
        assert_eq!(
            tick_to_sqrt_price_x96(-249_428).unwrap(),
            U256::from_dec_str("304011615425126403287043").unwrap()
        );
        assert_eq!(
            tick_to_sqrt_price_x96(MIN_TICK).unwrap(),
            U256::from(4_295_128_739u64)
        );
        assert_eq!(
            tick_to_sqrt_price_x96(MAX_TICK).unwrap(),
            U256::from_dec_str("1461446703485210103287273052203988822378723970342").unwrap()
        );
        assert_eq!(
            tick_to_sqrt_price_x96(1).unwrap(),
            U256::from_dec_str("79232123823359799118286999568").unwrap()
        );
        assert_eq!(
            tick_to_sqrt_price_x96(-1).unwrap(),
            U256::from_dec_str("79224201403219477170569942574").unwrap()
        );
        assert_eq!(
            tick_to_sqrt_price_x96(193_200).unwrap(),
            U256::from_dec_str("1241522311423856267567483590187225").unwrap()
        );
    }

    #[test]
    fn test_out_of_range_ticks_rejected() {
        assert_eq!(
            tick_to_sqrt_price_x96(MAX_TICK + 1),
            Err(MathError::TickOutOfRange(MAX_TICK + 1))
        );
        assert_eq!(
            tick_to_sqrt_price_x96(MIN_TICK - 1),
            Err(MathError::TickOutOfRange(MIN_TICK - 1))
        );
    }

    #[test]
    fn test_deterministic_and_monotonic() {
        let mut previous = U256::zero();
        for tick in [-887_272, -100_000, -1, 0, 1, 100_000, 887_272] {
            let a = tick_to_sqrt_price_x96(tick).unwrap();
            let b = tick_to_sqrt_price_x96(tick).unwrap();
            assert_eq!(a, b);
            assert!(a > previous, "sqrt price must grow with tick");
            previous = a;
        }
    }

    #[test]
    fn test_price_conversion() {
        let price = sqrt_price_x96_to_price(Q96, 18, 18);
        assert!((price - 1.0).abs() < 1e-12);
        // 1.0001^100 with equal decimals
        let sqrt = tick_to_sqrt_price_x96(100).unwrap();
        let price = sqrt_price_x96_to_price(sqrt, 18, 18);
        assert!((price - 1.0001f64.powi(100)).abs() < 1e-9);
    }
}
