//! Two-sided position sizing: liquidity and token amounts for a price range
//!
//! All intermediate arithmetic runs at 512-bit width so nothing overflows,
//! and every final division truncates toward zero so a computed amount can
//! never exceed the budget that produced it.

use ethers::types::{U256, U512};

use super::tick_math::{mul_div, tick_to_sqrt_price_x96, MAX_TICK, Q96};
use crate::shared::errors::MathError;

/// Liquidity implied by an amount of token0 over [sqrt_a, sqrt_b].
pub fn liquidity_for_amount0(sqrt_a: U256, sqrt_b: U256, amount0: U256) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    let intermediate = mul_div(sqrt_a, sqrt_b, Q96)?;
    mul_div(amount0, intermediate, sqrt_b - sqrt_a)
}

/// Liquidity implied by an amount of token1 over [sqrt_a, sqrt_b].
pub fn liquidity_for_amount1(sqrt_a: U256, sqrt_b: U256, amount1: U256) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    mul_div(amount1, Q96, sqrt_b - sqrt_a)
}

/// Token0 owed for `liquidity` over [sqrt_a, sqrt_b], truncated.
pub fn amount0_for_liquidity(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: U256,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_a.is_zero() {
        return Err(MathError::Overflow("zero sqrt price"));
    }
    // (L << 96) * (sqrt_b - sqrt_a) / sqrt_b / sqrt_a
    let numerator = (U512::from(liquidity) << 96) * U512::from(sqrt_b - sqrt_a);
    let wide = numerator / U512::from(sqrt_b) / U512::from(sqrt_a);
    U256::try_from(wide).map_err(|_| MathError::Overflow("amount0"))
}

/// Token1 owed for `liquidity` over [sqrt_a, sqrt_b], truncated.
pub fn amount1_for_liquidity(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: U256,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    mul_div(liquidity, sqrt_b - sqrt_a, Q96)
}

/// Token amounts and liquidity for a two-sided position.
///
/// Three cases: a tick at or below the lower bound needs only token0, at or
/// above the upper bound only token1, inside the range the liquidity is the
/// minimum implied by either budget and both amounts are recomputed from it
/// so neither budget is exceeded. The case split keys on the tick, not the
/// sqrt price: the pool's sqrt price sits anywhere inside the current tick,
/// so a position minted with the tick exactly on a bound must still be
/// single-sided.
pub fn compute_amounts(
    sqrt_price_x96: U256,
    tick: i32,
    tick_lower: i32,
    tick_upper: i32,
    budget0: U256,
    budget1: U256,
) -> Result<(U256, U256, U256), MathError> {
    if tick_lower >= tick_upper {
        return Err(MathError::InvalidRange {
            lower: tick_lower,
            upper: tick_upper,
        });
    }
    let sqrt_a = tick_to_sqrt_price_x96(tick_lower)?;
    let sqrt_b = tick_to_sqrt_price_x96(tick_upper)?;

    if tick <= tick_lower || sqrt_price_x96 <= sqrt_a {
        let liquidity = liquidity_for_amount0(sqrt_a, sqrt_b, budget0)?;
        let amount0 = amount0_for_liquidity(sqrt_a, sqrt_b, liquidity)?;
        Ok((amount0, U256::zero(), liquidity))
    } else if tick >= tick_upper || sqrt_price_x96 >= sqrt_b {
        let liquidity = liquidity_for_amount1(sqrt_a, sqrt_b, budget1)?;
        let amount1 = amount1_for_liquidity(sqrt_a, sqrt_b, liquidity)?;
        Ok((U256::zero(), amount1, liquidity))
    } else {
        let liquidity0 = liquidity_for_amount0(sqrt_price_x96, sqrt_b, budget0)?;
        let liquidity1 = liquidity_for_amount1(sqrt_a, sqrt_price_x96, budget1)?;
        let liquidity = liquidity0.min(liquidity1);
        let amount0 = amount0_for_liquidity(sqrt_price_x96, sqrt_b, liquidity)?;
        let amount1 = amount1_for_liquidity(sqrt_a, sqrt_price_x96, liquidity)?;
        Ok((amount0, amount1, liquidity))
    }
}

/// Token amounts a position of `liquidity` over [tick_lower, tick_upper]
/// holds at the given pool price. Used to value open positions and to set
/// withdrawal minimums.
pub fn amounts_for_liquidity(
    sqrt_price_x96: U256,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: U256,
) -> Result<(U256, U256), MathError> {
    let sqrt_a = tick_to_sqrt_price_x96(tick_lower)?;
    let sqrt_b = tick_to_sqrt_price_x96(tick_upper)?;
    if sqrt_price_x96 <= sqrt_a {
        Ok((amount0_for_liquidity(sqrt_a, sqrt_b, liquidity)?, U256::zero()))
    } else if sqrt_price_x96 >= sqrt_b {
        Ok((U256::zero(), amount1_for_liquidity(sqrt_a, sqrt_b, liquidity)?))
    } else {
        Ok((
            amount0_for_liquidity(sqrt_price_x96, sqrt_b, liquidity)?,
            amount1_for_liquidity(sqrt_a, sqrt_price_x96, liquidity)?,
        ))
    }
}

/// Floor of `desired * (100 - slippage_pct) / 100`.
pub fn calculate_min_amount(desired: U256, slippage_pct: u8) -> U256 {
    let keep = U256::from(100u64.saturating_sub(slippage_pct as u64));
    desired * keep / U256::from(100u64)
}

/// Symmetric tick bounds around the current tick.
///
/// The current tick is rounded to the nearest spacing multiple, the
/// half-width is aligned down to spacing (never below one spacing), and the
/// bounds are clamped to the spacing-aligned tick limits.
pub fn calculate_tick_bounds(
    current_tick: i32,
    range_width: i32,
    tick_spacing: i32,
) -> Result<(i32, i32), MathError> {
    if tick_spacing <= 0 {
        return Err(MathError::InvalidTickSpacing(tick_spacing));
    }
    if range_width <= 0 || range_width % 2 != 0 {
        return Err(MathError::InvalidRange {
            lower: 0,
            upper: range_width,
        });
    }

    let remainder = current_tick.rem_euclid(tick_spacing);
    let mut center = current_tick - remainder;
    if remainder * 2 >= tick_spacing {
        center += tick_spacing;
    }

    let half = ((range_width / 2) / tick_spacing).max(1) * tick_spacing;
    let limit = (MAX_TICK / tick_spacing) * tick_spacing;
    let lower = (center - half).clamp(-limit, limit);
    let upper = (center + half).clamp(-limit, limit);

    if lower >= upper {
        return Err(MathError::BoundsCollapsed { lower, upper });
    }
    Ok((lower, upper))
}

fn ordered(a: U256, b: U256) -> (U256, U256) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e18() -> U256 {
        U256::exp10(18)
    }

    #[test]
    fn test_amounts_inside_range() {
        let sqrt = tick_to_sqrt_price_x96(0).unwrap();
        let (amount0, amount1, liquidity) =
            compute_amounts(sqrt, 0, -600, 600, e18(), e18()).unwrap();
        // Symmetric range around the price consumes both budgets (minus
        // truncation dust).
        assert_eq!(amount0, U256::from_dec_str("999999999999999999").unwrap());
        assert_eq!(amount1, U256::from_dec_str("999999999999999999").unwrap());
        assert_eq!(
            liquidity,
            U256::from_dec_str("33837499809738371427").unwrap()
        );
        assert!(amount0 <= e18() && amount1 <= e18());
    }

    #[test]
    fn test_amounts_below_range_token0_only() {
        let sqrt = tick_to_sqrt_price_x96(-900).unwrap();
        let (amount0, amount1, liquidity) =
            compute_amounts(sqrt, -900, -600, 600, e18(), e18()).unwrap();
        assert_eq!(amount1, U256::zero());
        assert!(amount0 <= e18());
        assert_eq!(
            liquidity,
            U256::from_dec_str("16665000373539200203").unwrap()
        );
    }

    #[test]
    fn test_amounts_above_range_token1_only() {
        let sqrt = tick_to_sqrt_price_x96(900).unwrap();
        let (amount0, amount1, _) = compute_amounts(sqrt, 900, -600, 600, e18(), e18()).unwrap();
        assert_eq!(amount0, U256::zero());
        assert!(amount1 <= e18());
    }

    #[test]
    fn test_skewed_budgets_never_exceeded() {
        let sqrt = tick_to_sqrt_price_x96(120).unwrap();
        let budget1 = e18() * 2;
        let (amount0, amount1, liquidity) =
            compute_amounts(sqrt, 120, -600, 600, e18(), budget1).unwrap();
        assert!(amount0 <= e18());
        assert!(amount1 <= budget1);
        // token0 is the binding side here
        assert_eq!(amount0, U256::from_dec_str("999999999999999999").unwrap());
        assert_eq!(
            liquidity,
            U256::from_dec_str("42424522212579892939").unwrap()
        );
    }

    #[test]
    fn test_tick_on_lower_bound_is_token0_only() {
        // The sqrt price sits mid-tick, above the bound's exact sqrt; the
        // tick comparison must still classify the position as single-sided.
        let mid = (tick_to_sqrt_price_x96(-600).unwrap() + tick_to_sqrt_price_x96(-599).unwrap())
            / U256::from(2u64);
        let (amount0, amount1, liquidity) =
            compute_amounts(mid, -600, -600, 600, e18(), e18()).unwrap();
        assert_eq!(amount1, U256::zero());
        assert!(amount0 <= e18());
        assert!(liquidity > U256::zero());
    }

    #[test]
    fn test_tick_on_upper_bound_is_token1_only() {
        let mid = (tick_to_sqrt_price_x96(600).unwrap() + tick_to_sqrt_price_x96(601).unwrap())
            / U256::from(2u64);
        let (amount0, amount1, liquidity) =
            compute_amounts(mid, 600, -600, 600, e18(), e18()).unwrap();
        assert_eq!(amount0, U256::zero());
        assert!(amount1 <= e18());
        assert!(liquidity > U256::zero());
    }

    #[test]
    fn test_invalid_range_rejected() {
        let sqrt = tick_to_sqrt_price_x96(0).unwrap();
        assert!(compute_amounts(sqrt, 0, 600, -600, e18(), e18()).is_err());
    }

    #[test]
    fn test_min_amount() {
        assert_eq!(
            calculate_min_amount(U256::from(1000u64), 5),
            U256::from(950u64)
        );
        assert_eq!(calculate_min_amount(U256::from(99u64), 1), U256::from(98u64));
        assert_eq!(calculate_min_amount(U256::zero(), 50), U256::zero());
    }

    #[test]
    fn test_tick_bounds_rounding_and_spacing() {
        // 193_185 rounds to 193_200 with spacing 60
        let (lower, upper) = calculate_tick_bounds(193_185, 1200, 60).unwrap();
        assert_eq!(lower, 193_200 - 600);
        assert_eq!(upper, 193_200 + 600);
        assert_eq!(lower % 60, 0);
        assert_eq!(upper % 60, 0);
        assert!(lower < upper);
    }

    #[test]
    fn test_tick_bounds_negative_tick() {
        let (lower, upper) = calculate_tick_bounds(-193_185, 1200, 60).unwrap();
        assert_eq!(upper - lower, 1200);
        assert_eq!(lower.rem_euclid(60), 0);
        assert_eq!(upper.rem_euclid(60), 0);
        assert!(lower < -193_185 && -193_185 < upper);
    }

    #[test]
    fn test_tick_bounds_clamped_at_limits() {
        let (lower, upper) = calculate_tick_bounds(887_000, 2400, 60).unwrap();
        let limit = (MAX_TICK / 60) * 60;
        assert_eq!(upper, limit);
        assert!(lower < upper);
        assert_eq!(lower % 60, 0);
    }

    #[test]
    fn test_tick_bounds_collapse_rejected() {
        // Everything clamps onto the upper limit.
        let err = calculate_tick_bounds(MAX_TICK, 120, 60);
        assert!(matches!(err, Err(MathError::BoundsCollapsed { .. })));
    }

    #[test]
    fn test_tick_bounds_input_validation() {
        assert!(calculate_tick_bounds(0, 1200, 0).is_err());
        assert!(calculate_tick_bounds(0, 0, 60).is_err());
        assert!(calculate_tick_bounds(0, 1201, 60).is_err());
    }

    #[test]
    fn test_amounts_for_liquidity_inverts_compute() {
        let sqrt = tick_to_sqrt_price_x96(0).unwrap();
        let (amount0, amount1, liquidity) =
            compute_amounts(sqrt, 0, -600, 600, e18(), e18()).unwrap();
        let (back0, back1) = amounts_for_liquidity(sqrt, -600, 600, liquidity).unwrap();
        assert_eq!(back0, amount0);
        assert_eq!(back1, amount1);

        // out-of-range positions hold a single token
        let below = tick_to_sqrt_price_x96(-900).unwrap();
        let (b0, b1) = amounts_for_liquidity(below, -600, 600, liquidity).unwrap();
        assert!(b0 > U256::zero());
        assert_eq!(b1, U256::zero());
    }

    #[test]
    fn test_narrow_width_falls_back_to_one_spacing() {
        let (lower, upper) = calculate_tick_bounds(30, 2, 10).unwrap();
        assert_eq!((lower, upper), (20, 40));
    }
}
