use crate::models::ProbePoint;
use alloy_primitives::{U256, U512};

/// Piecewise-linear interpolation over cumulative probe points.
///
/// The curve starts at the origin and passes through every probe; inputs past
/// the last probe are capped at its output. Division floors, matching uint256
/// semantics on-chain.
pub fn interpolate(probes: &[ProbePoint], amount_in: U256) -> U256 {
    let Some(first) = probes.first() else {
        return U256::ZERO;
    };
    if amount_in.is_zero() {
        return U256::ZERO;
    }

    let origin = ProbePoint::new(U256::ZERO, U256::ZERO);
    if amount_in <= first.amount_in {
        return segment(&origin, first, amount_in);
    }

    for window in probes.windows(2) {
        let (lower, upper) = (&window[0], &window[1]);
        if amount_in <= upper.amount_in {
            return segment(lower, upper, amount_in);
        }
    }

    probes.last().map(|p| p.amount_out).unwrap_or_default()
}

fn segment(lower: &ProbePoint, upper: &ProbePoint, amount_in: U256) -> U256 {
    let Some(delta_in) = upper.amount_in.checked_sub(lower.amount_in) else {
        return lower.amount_out;
    };
    if delta_in.is_zero() {
        return lower.amount_out;
    }
    let excess = U512::from(amount_in.saturating_sub(lower.amount_in));
    let delta_in = U512::from(delta_in);

    // Probes come from independent on-chain calls, so output may dip between points.
    if upper.amount_out >= lower.amount_out {
        let delta_out = U512::from(upper.amount_out - lower.amount_out);
        let step = U256::from(excess * delta_out / delta_in);
        lower.amount_out.saturating_add(step)
    } else {
        // floor of a negative step rounds away from zero
        let delta_out = U512::from(lower.amount_out - upper.amount_out);
        let step = (excess * delta_out + delta_in - U512::from(1u8)) / delta_in;
        lower.amount_out.saturating_sub(U256::from(step))
    }
}
