//! Shared data structures used throughout the SDK.
//!
//! All amounts are raw integers in the token's smallest unit.

use crate::errors::{Result, SdkError};
use alloy_primitives::{Address, U256};
use std::fmt;

/// Basis-point denominator used by every fee in the SDK.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Order-independent identifier of a token pair. `token0` is always the lower address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    token0: Address,
    token1: Address,
}

impl PairKey {
    pub fn new(a: Address, b: Address) -> Self {
        if a <= b {
            Self { token0: a, token1: b }
        } else {
            Self { token0: b, token1: a }
        }
    }

    pub fn token0(&self) -> Address {
        self.token0
    }

    pub fn token1(&self) -> Address {
        self.token1
    }

    pub fn contains(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.token0, self.token1)
    }
}

/// Single cumulative `(amount_in, amount_out)` measurement taken on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePoint {
    pub amount_in: U256,
    pub amount_out: U256,
}

impl ProbePoint {
    pub fn new(amount_in: U256, amount_out: U256) -> Self {
        Self {
            amount_in,
            amount_out,
        }
    }
}

/// Immutable snapshot of one tracked pair as of `block_number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairState {
    pub base: Address,
    pub quote: Address,
    pub reserve_base: U256,
    pub reserve_quote: U256,
    /// Swap fee in basis points (30 = 0.30%).
    pub fee_bps: u16,
    /// Block the reserves were read at.
    pub block_number: u64,
    /// quote -> base (user buys base), cumulative and sorted by `amount_in`.
    pub ask_probes: Vec<ProbePoint>,
    /// base -> quote (user sells base).
    pub bid_probes: Vec<ProbePoint>,
}

impl PairState {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.base, self.quote)
    }

    /// Checks the invariants every cached pair must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.base == self.quote {
            return Err(SdkError::InvalidState(format!(
                "pair {} has identical base and quote",
                self.base
            )));
        }
        if self.reserve_base.is_zero() || self.reserve_quote.is_zero() {
            return Err(SdkError::InvalidState(format!(
                "pair {} has a zero reserve (base={}, quote={})",
                self.key(),
                self.reserve_base,
                self.reserve_quote
            )));
        }
        if self.fee_bps >= BPS_DENOMINATOR {
            return Err(SdkError::InvalidState(format!(
                "pair {} fee {} bps is not below {}",
                self.key(),
                self.fee_bps,
                BPS_DENOMINATOR
            )));
        }
        Ok(())
    }

    /// `(reserve_in, reserve_out)` for a swap starting from `from_token`.
    pub fn reserves_for(&self, from_token: Address) -> Option<(U256, U256)> {
        if from_token == self.base {
            Some((self.reserve_base, self.reserve_quote))
        } else if from_token == self.quote {
            Some((self.reserve_quote, self.reserve_base))
        } else {
            None
        }
    }

    /// Probe curve for a swap starting from `from_token`.
    pub fn probes_for(&self, from_token: Address) -> Option<&[ProbePoint]> {
        if from_token == self.base {
            Some(&self.bid_probes)
        } else if from_token == self.quote {
            Some(&self.ask_probes)
        } else {
            None
        }
    }
}

/// Latest successfully processed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainState {
    pub current_block: u64,
    /// Unix seconds.
    pub block_timestamp: u64,
}

/// Result of a local quote calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteResult {
    pub from_token: Address,
    pub to_token: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    /// `ChainState::current_block` when the quote was computed.
    pub block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const WETH: Address = address!("4200000000000000000000000000000000000006");
    const USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    fn pair() -> PairState {
        PairState {
            base: WETH,
            quote: USDC,
            reserve_base: U256::from(10u64),
            reserve_quote: U256::from(20u64),
            fee_bps: 30,
            block_number: 1,
            ask_probes: vec![ProbePoint::new(U256::from(1u64), U256::from(2u64))],
            bid_probes: vec![],
        }
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(PairKey::new(WETH, USDC), PairKey::new(USDC, WETH));
        let key = PairKey::new(USDC, WETH);
        assert!(key.token0() < key.token1());
        assert!(key.contains(WETH) && key.contains(USDC));
    }

    #[test]
    fn reserves_follow_swap_side() {
        let p = pair();
        assert_eq!(
            p.reserves_for(WETH),
            Some((U256::from(10u64), U256::from(20u64)))
        );
        assert_eq!(
            p.reserves_for(USDC),
            Some((U256::from(20u64), U256::from(10u64)))
        );
        assert_eq!(p.reserves_for(Address::ZERO), None);
        assert_eq!(p.probes_for(USDC).map(|p| p.len()), Some(1));
        assert_eq!(p.probes_for(WETH).map(|p| p.len()), Some(0));
    }

    #[test]
    fn validate_rejects_zero_reserve_and_full_fee() {
        assert!(pair().validate().is_ok());

        let mut p = pair();
        p.reserve_quote = U256::ZERO;
        assert!(matches!(p.validate(), Err(SdkError::InvalidState(_))));

        let mut p = pair();
        p.fee_bps = BPS_DENOMINATOR;
        assert!(matches!(p.validate(), Err(SdkError::InvalidState(_))));
    }
}
