//! Public entry point: a started client answers quotes from local state.

use crate::config::{ClientConfig, SyncSettings};
use crate::errors::{Result, SdkError};
use crate::feed::{ChainFeed, RpcChainFeed};
use crate::models::{PairState, QuoteResult};
use crate::quoting::Quoter;
use crate::state::{HelperClient, StateCache};
use crate::sync::SyncController;
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::info;

/// Keeps pair reserves in sync with the chain and quotes swaps locally.
///
/// ```no_run
/// # async fn demo() -> elfomofi_sdk::errors::Result<()> {
/// use elfomofi_sdk::{Client, ClientConfig};
///
/// let config = ClientConfig::new("https://mainnet.base.org", "wss://base-rpc.publicnode.com", 8453)?;
/// let mut client = Client::new(config)?;
/// client.start().await?;
/// for &(base, quote) in client.pairs()?.iter() {
///     println!("{base} / {quote}");
/// }
/// client.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    sync: SyncController,
    quoter: Quoter,
}

impl Client {
    /// Client talking to the configured RPC and WebSocket endpoints.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let feed = RpcChainFeed::from_config(&config)?;
        info!(
            chain = config.chain.name,
            chain_id = config.chain.chain_id,
            helper = %config.sync.helper_address,
            "[INIT] client configured"
        );
        Ok(Self::with_feed(Arc::new(feed), config.sync))
    }

    /// Client over any [`ChainFeed`] implementation.
    pub fn with_feed(feed: Arc<dyn ChainFeed>, settings: SyncSettings) -> Self {
        let helper = HelperClient::new(feed.clone(), settings.helper_address);
        let cache = Arc::new(StateCache::new(helper, settings));
        let quoter = Quoter::new(cache.subscribe());
        Self {
            sync: SyncController::new(feed, cache),
            quoter,
        }
    }

    /// Subscribe to new blocks and load every tracked pair.
    ///
    /// Quotes are available as soon as this returns.
    pub async fn start(&mut self) -> Result<()> {
        self.sync.start().await
    }

    /// Stop syncing. Quotes fail with `NotRunning` until the next `start()`.
    pub async fn stop(&mut self) -> Result<()> {
        self.sync.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.sync.is_running()
    }

    /// Constant-product quote for `amount_in` of `from_token` into `to_token`.
    ///
    /// `Ok(None)` if the pair is not tracked. Never performs I/O.
    pub fn quote(
        &self,
        from_token: Address,
        to_token: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>> {
        self.quoter.quote(from_token, to_token, amount_in)
    }

    /// Quote from the helper's measured probe curve.
    pub fn quote_probed(
        &self,
        from_token: Address,
        to_token: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>> {
        self.quoter.quote_probed(from_token, to_token, amount_in)
    }

    /// Cloneable handle for quoting from other tasks or threads.
    pub fn quoter(&self) -> Quoter {
        self.quoter.clone()
    }

    pub fn current_block(&self) -> Result<u64> {
        let snap = self.quoter.snapshot();
        snap.ensure_running()?;
        Ok(snap.chain().current_block)
    }

    /// Unix timestamp of [`Client::current_block`].
    pub fn block_timestamp(&self) -> Result<u64> {
        let snap = self.quoter.snapshot();
        snap.ensure_running()?;
        Ok(snap.chain().block_timestamp)
    }

    /// Tracked `(base, quote)` pairs in configuration or helper order.
    pub fn pairs(&self) -> Result<Vec<(Address, Address)>> {
        let snap = self.quoter.snapshot();
        snap.ensure_running()?;
        Ok(snap.tracked().to_vec())
    }

    /// Cached state of `{a, b}`, if tracked and valid.
    pub fn pair(&self, a: Address, b: Address) -> Result<Option<Arc<PairState>>> {
        let snap = self.quoter.snapshot();
        snap.ensure_running()?;
        Ok(snap.pair(a, b).cloned())
    }

    /// Called for every refresh failure that is absorbed by the client.
    pub fn on_refresh_error<F>(&self, hook: F)
    where
        F: Fn(&SdkError) + Send + Sync + 'static,
    {
        self.sync.set_error_hook(Arc::new(hook));
    }
}
