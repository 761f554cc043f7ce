//! Chain feed: block notifications and read-only contract calls.

use crate::errors::Result;
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod listener;
pub mod rpc;

pub use rpc::RpcChainFeed;

/// 4-byte function selector.
pub type Selector = [u8; 4];

/// Stream of new block numbers. Ends when the subscription is lost for good.
pub type BlockStream = BoxStream<'static, u64>;

/// Narrow view of a node endpoint.
#[async_trait]
pub trait ChainFeed: Send + Sync {
    /// Establish a new-block subscription.
    ///
    /// Fails with `Connection` if the subscription cannot be set up.
    async fn subscribe_new_blocks(&self) -> Result<BlockStream>;

    /// Execute a read-only call of `selector(args)` on `to`, at `at_block` or latest.
    async fn call_contract(
        &self,
        to: Address,
        selector: Selector,
        args: Bytes,
        at_block: Option<u64>,
    ) -> Result<Bytes>;
}
