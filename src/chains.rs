//! Per-chain deployment table.

use crate::errors::{Result, SdkError};
use alloy_primitives::{Address, address};

/// Configuration for a single chain deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: &'static str,
    /// Address of the helper contract that publishes pair state.
    pub helper_address: Address,
}

pub const BASE: ChainConfig = ChainConfig {
    chain_id: 8453,
    name: "Base",
    helper_address: address!("c1b13606FC7227f2554067aFb3fb12De75C02d81"),
};

pub const CHAINS: &[ChainConfig] = &[BASE];

/// Look up a supported chain by id.
pub fn chain_config(chain_id: u64) -> Result<ChainConfig> {
    CHAINS
        .iter()
        .find(|c| c.chain_id == chain_id)
        .copied()
        .ok_or(SdkError::UnsupportedChain(chain_id))
}
