//! Local quote computation over cached snapshots.
//!
//! Quoting never touches the network: it reads the latest published
//! [`Snapshot`] and runs pure arithmetic on it.

use crate::errors::Result;
use crate::models::QuoteResult;
use crate::state::Snapshot;
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tokio::sync::watch;

pub mod engine;
pub mod probes;

pub use engine::get_amount_out;
pub use probes::interpolate;

/// Constant-product quote for swapping `amount_in` of `from` into `to`.
///
/// Returns `Ok(None)` when `from == to` or the pair is not cached.
///
/// # Errors
/// `NotRunning` unless the snapshot belongs to a running client.
pub fn quote(
    snapshot: &Snapshot,
    from: Address,
    to: Address,
    amount_in: U256,
) -> Result<Option<QuoteResult>> {
    snapshot.ensure_running()?;
    if from == to {
        return Ok(None);
    }
    let Some(pair) = snapshot.pair(from, to) else {
        return Ok(None);
    };
    let Some((reserve_in, reserve_out)) = pair.reserves_for(from) else {
        return Ok(None);
    };
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, pair.fee_bps)?;
    Ok(Some(QuoteResult {
        from_token: from,
        to_token: to,
        amount_in,
        amount_out,
        block_number: snapshot.chain().current_block,
    }))
}

/// Quote from the helper's measured probe curve instead of the reserves.
///
/// Returns `Ok(None)` when the pair is unknown or has no probes for this side.
pub fn quote_probed(
    snapshot: &Snapshot,
    from: Address,
    to: Address,
    amount_in: U256,
) -> Result<Option<QuoteResult>> {
    snapshot.ensure_running()?;
    if from == to {
        return Ok(None);
    }
    let probes = match snapshot.pair(from, to).and_then(|p| p.probes_for(from)) {
        Some(probes) if !probes.is_empty() => probes,
        _ => return Ok(None),
    };
    Ok(Some(QuoteResult {
        from_token: from,
        to_token: to,
        amount_in,
        amount_out: interpolate(probes, amount_in),
        block_number: snapshot.chain().current_block,
    }))
}

/// Cheap, cloneable read handle for quoting from any thread.
#[derive(Clone)]
pub struct Quoter {
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl Quoter {
    pub fn new(rx: watch::Receiver<Arc<Snapshot>>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot. The borrow is released before returning.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.rx.borrow().clone()
    }

    pub fn quote(&self, from: Address, to: Address, amount_in: U256) -> Result<Option<QuoteResult>> {
        quote(&self.snapshot(), from, to, amount_in)
    }

    pub fn quote_probed(
        &self,
        from: Address,
        to: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>> {
        quote_probed(&self.snapshot(), from, to, amount_in)
    }
}
