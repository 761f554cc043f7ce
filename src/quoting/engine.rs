use crate::errors::{Result, SdkError};
use crate::models::BPS_DENOMINATOR;
use alloy_primitives::{U256, U512};

/// Constant-product output amount with the fee taken from the input.
///
/// `floor(amount_in * (10000 - fee_bps) * reserve_out / (reserve_in * 10000 + amount_in * (10000 - fee_bps)))`
///
/// Intermediates are 512-bit so realistic uint256 inputs cannot overflow.
///
/// # Errors
/// `InvalidState` if either reserve is zero or the fee is not below 100%.
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u16,
) -> Result<U256> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SdkError::InvalidState(format!(
            "zero reserve (reserve_in={reserve_in}, reserve_out={reserve_out})"
        )));
    }
    if fee_bps >= BPS_DENOMINATOR {
        return Err(SdkError::InvalidState(format!(
            "fee {fee_bps} bps leaves nothing to swap"
        )));
    }
    if amount_in.is_zero() {
        return Ok(U256::ZERO);
    }

    let fee_multiplier = U512::from(BPS_DENOMINATOR - fee_bps);
    let denominator_bps = U512::from(BPS_DENOMINATOR);

    let amount_in_with_fee = U512::from(amount_in)
        .checked_mul(fee_multiplier)
        .ok_or(SdkError::Overflow("amount_in * fee multiplier"))?;
    let numerator = amount_in_with_fee
        .checked_mul(U512::from(reserve_out))
        .ok_or(SdkError::Overflow("amount_in_with_fee * reserve_out"))?;
    let denominator = U512::from(reserve_in)
        .checked_mul(denominator_bps)
        .and_then(|d| d.checked_add(amount_in_with_fee))
        .ok_or(SdkError::Overflow("reserve_in * 10000 + amount_in_with_fee"))?;

    let out = numerator / denominator;
    // out < reserve_out always holds for a positive reserve_in
    if out >= U512::from(reserve_out) {
        return Err(SdkError::InvalidState(format!(
            "computed output {out} drains reserve {reserve_out}"
        )));
    }
    Ok(U256::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn e(n: u64, decimals: u32) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(decimals))
    }

    #[test]
    fn weth_usdc_scenario_is_deterministic() {
        let reserve_weth = e(1_000, 18);
        let reserve_usdc = e(3_000_000, 6);
        let amount_in = e(1, 18);

        let out = get_amount_out(amount_in, reserve_weth, reserve_usdc, 30).unwrap();
        // 1e18 * 9970 * 3e12 / (1000e18 * 10000 + 1e18 * 9970)
        assert_eq!(out, U256::from(2_988_020_943u64));
        assert_eq!(
            get_amount_out(amount_in, reserve_weth, reserve_usdc, 30).unwrap(),
            out
        );
    }

    #[test]
    fn zero_fee_matches_plain_constant_product() {
        let out = get_amount_out(U256::from(100u64), U256::from(1_000u64), U256::from(1_000u64), 0)
            .unwrap();
        // 100 * 1000 / 1100 = 90.9
        assert_eq!(out, U256::from(90u64));
    }

    #[test]
    fn zero_amount_yields_zero() {
        let out = get_amount_out(U256::ZERO, U256::from(5u64), U256::from(7u64), 30).unwrap();
        assert_eq!(out, U256::ZERO);
    }

    #[test]
    fn zero_reserves_are_invalid_state() {
        for (rin, rout) in [(0u64, 10u64), (10, 0), (0, 0)] {
            let res = get_amount_out(U256::from(1u64), U256::from(rin), U256::from(rout), 30);
            assert!(matches!(res, Err(SdkError::InvalidState(_))));
        }
        let res = get_amount_out(U256::from(1u64), U256::from(1u64), U256::from(1u64), 10_000);
        assert!(matches!(res, Err(SdkError::InvalidState(_))));
    }

    #[test]
    fn max_inputs_do_not_panic() {
        let res = get_amount_out(U256::MAX, U256::MAX, U256::MAX, 0);
        assert!(matches!(res, Err(SdkError::Overflow(_))));
        let out = get_amount_out(U256::MAX, U256::from(1u64), U256::from(u128::MAX), 30).unwrap();
        assert!(out < U256::from(u128::MAX));
    }

    fn reserve() -> impl Strategy<Value = U256> {
        (1u128..=u128::MAX).prop_map(U256::from)
    }

    fn amount() -> impl Strategy<Value = U256> {
        (0u128..=u128::MAX).prop_map(U256::from)
    }

    proptest! {
        #[test]
        fn output_is_monotone_and_bounded(
            reserve_in in reserve(),
            reserve_out in reserve(),
            fee in 0u16..10_000,
            a in amount(),
            b in amount(),
        ) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let out_small = get_amount_out(small, reserve_in, reserve_out, fee).unwrap();
            let out_large = get_amount_out(large, reserve_in, reserve_out, fee).unwrap();
            prop_assert!(out_small <= out_large);
            prop_assert!(out_large < reserve_out);
        }

        #[test]
        fn round_trip_never_gains(
            reserve_a in reserve(),
            reserve_b in reserve(),
            fee in 0u16..10_000,
            amount_in in amount(),
        ) {
            let there = get_amount_out(amount_in, reserve_a, reserve_b, fee).unwrap();
            let back = get_amount_out(there, reserve_b, reserve_a, fee).unwrap();
            prop_assert!(back <= amount_in);
        }
    }
}
