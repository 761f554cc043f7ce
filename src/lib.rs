//! Client SDK for the elfomofi helper contract.
//!
//! The client subscribes to new blocks, refreshes the cached reserves of every
//! tracked pair from the on-chain helper, and answers swap quotes locally
//! without touching the network.

pub mod chains;
pub mod client;
pub mod config;
pub mod errors;
pub mod feed;
pub mod models;
pub mod quoting;
pub mod state;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use config::{ClientConfig, RetryPolicy, SyncSettings};
pub use errors::{Result, SdkError};
pub use feed::{ChainFeed, RpcChainFeed};
pub use models::{ChainState, PairKey, PairState, QuoteResult};
pub use quoting::Quoter;
