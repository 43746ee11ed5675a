//! Constant-product swap pricing.
//!
//! All token quantities are fixed-point integers in the token's smallest
//! unit. Intermediate math widens to u128 and every division truncates:
//! the minimum-out amount must never be rounded up, or the program-side
//! slippage check fails spuriously.

use thiserror::Error;

const BPS_DENOMINATOR: u128 = 10_000;

/// Quote for one swap attempt. Recomputed per attempt from fresh reserves.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub amount_in: u64,
    pub amount_out: u64,
    /// `amount_out` reduced by the slippage tolerance, truncated.
    pub min_amount_out: u64,
    /// Input amount consumed by the pool fee.
    pub fee: u64,
    /// Reserve ratio before the trade, in raw units.
    pub current_price: f64,
    /// `amount_in / amount_out`, in raw units.
    pub execution_price: f64,
    /// Relative price change caused by the trade's own size.
    pub price_impact: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("input amount cannot be zero")]
    ZeroAmountIn,
    #[error("reserves cannot be zero")]
    ZeroReserves,
    #[error("fee denominator cannot be zero")]
    ZeroFeeDenominator,
    #[error("output amount rounded to zero")]
    ZeroAmountOut,
}

/// Compute the output for `amount_in` against reserves `(reserve_in,
/// reserve_out)` with a proportional fee of `fee_numerator /
/// fee_denominator` and a slippage tolerance in basis points.
///
/// `dy = reserve_out * dx' / (reserve_in + dx')` where `dx'` is the input
/// net of fees.
pub fn compute_quote(
    reserve_in: u64,
    reserve_out: u64,
    amount_in: u64,
    fee_numerator: u64,
    fee_denominator: u64,
    slippage_bps: u64,
) -> Result<SwapQuote, QuoteError> {
    if amount_in == 0 {
        return Err(QuoteError::ZeroAmountIn);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(QuoteError::ZeroReserves);
    }
    if fee_denominator == 0 {
        return Err(QuoteError::ZeroFeeDenominator);
    }

    let fee_numerator = fee_numerator.min(fee_denominator);

    let amount_in_128 = amount_in as u128;
    let reserve_in_128 = reserve_in as u128;
    let reserve_out_128 = reserve_out as u128;
    let fee_den = fee_denominator as u128;

    let effective_in =
        amount_in_128 * (fee_den - fee_numerator as u128) / fee_den;
    let fee = (amount_in_128 - effective_in) as u64;

    let amount_out_128 =
        reserve_out_128 * effective_in / (reserve_in_128 + effective_in);
    if amount_out_128 == 0 {
        return Err(QuoteError::ZeroAmountOut);
    }
    let amount_out = amount_out_128 as u64;

    let min_amount_out = apply_slippage_floor(amount_out, slippage_bps);

    let current_price = reserve_in as f64 / reserve_out as f64;
    let execution_price = amount_in as f64 / amount_out as f64;
    let price_impact = (execution_price - current_price) / current_price;

    Ok(SwapQuote {
        amount_in,
        amount_out,
        min_amount_out,
        fee,
        current_price,
        execution_price,
        price_impact,
    })
}

/// Reduce `amount` by `slippage_bps` basis points, truncating.
pub fn apply_slippage_floor(amount: u64, slippage_bps: u64) -> u64 {
    let capped = slippage_bps.min(BPS_DENOMINATOR as u64);
    let numerator = amount as u128 * (BPS_DENOMINATOR - capped as u128);
    (numerator / BPS_DENOMINATOR) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_vector_is_reproducible() {
        // Rin=1_000_000, Rout=500_000, fee 0.25%, dx=10_000, slippage 10%.
        let quote = compute_quote(1_000_000, 500_000, 10_000, 25, 10_000, 1_000).unwrap();

        // dx' = 10_000 * 9975 / 10000 = 9975
        // dy  = 500_000 * 9975 / 1_009_975 = 4938 (truncated)
        assert_eq!(quote.amount_out, 4_938);
        // minOut = 4938 * 9000 / 10000 = 4444 (truncated)
        assert_eq!(quote.min_amount_out, 4_444);
        assert_eq!(quote.fee, 25);

        assert!((quote.current_price - 2.0).abs() < 1e-9);
        let expected_exec = 10_000.0 / 4_938.0;
        assert!((quote.execution_price - expected_exec).abs() < 1e-9);
        assert!((quote.price_impact - (expected_exec - 2.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn min_out_never_exceeds_out() {
        for slippage in [0, 1, 50, 9_999, 10_000, 20_000] {
            let quote =
                compute_quote(1_000_000, 500_000, 10_000, 25, 10_000, slippage).unwrap();
            assert!(quote.min_amount_out <= quote.amount_out);
        }
    }

    #[test]
    fn output_bounded_by_reserves() {
        // Even an absurdly large input cannot drain more than the reserve.
        let quote = compute_quote(1_000, 500_000, u64::MAX / 2, 25, 10_000, 0).unwrap();
        assert!(quote.amount_out < 500_000);
    }

    #[test]
    fn zero_inputs_are_rejected() {
        assert_eq!(
            compute_quote(0, 500_000, 10_000, 25, 10_000, 0),
            Err(QuoteError::ZeroReserves)
        );
        assert_eq!(
            compute_quote(1_000_000, 0, 10_000, 25, 10_000, 0),
            Err(QuoteError::ZeroReserves)
        );
        assert_eq!(
            compute_quote(1_000_000, 500_000, 0, 25, 10_000, 0),
            Err(QuoteError::ZeroAmountIn)
        );
    }

    #[test]
    fn full_slippage_floors_to_zero() {
        assert_eq!(apply_slippage_floor(4_938, 10_000), 0);
        assert_eq!(apply_slippage_floor(4_938, 0), 4_938);
        // Truncation, never rounding up.
        assert_eq!(apply_slippage_floor(999, 1), 998);
    }
}
