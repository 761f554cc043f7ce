use crate::config::{ClientConfig, RetryPolicy};
use crate::errors::Result;
use crate::feed::{BlockStream, ChainFeed, Selector, listener};
use crate::state::helper::to_h160;
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{BlockId, BlockNumber, TransactionRequest, transaction::eip2718::TypedTransaction},
};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Chain feed backed by an HTTP JSON-RPC provider and a `newHeads` WebSocket.
#[derive(Clone)]
pub struct RpcChainFeed {
    provider: Provider<Http>,
    ws_url: Url,
    connect_timeout: Duration,
    reconnect: RetryPolicy,
}

impl RpcChainFeed {
    pub fn new(
        rpc_url: &Url,
        ws_url: Url,
        connect_timeout: Duration,
        reconnect: RetryPolicy,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())?;
        Ok(Self {
            provider,
            ws_url,
            connect_timeout,
            reconnect,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            &config.rpc_url,
            config.ws_url.clone(),
            config.connect_timeout,
            config.reconnect,
        )
    }
}

#[async_trait]
impl ChainFeed for RpcChainFeed {
    async fn subscribe_new_blocks(&self) -> Result<BlockStream> {
        let rx =
            listener::spawn_block_listener(self.ws_url.clone(), self.connect_timeout, self.reconnect)
                .await?;
        Ok(listener::watch_stream(rx))
    }

    async fn call_contract(
        &self,
        to: Address,
        selector: Selector,
        args: Bytes,
        at_block: Option<u64>,
    ) -> Result<Bytes> {
        let mut data = Vec::with_capacity(selector.len() + args.len());
        data.extend_from_slice(&selector);
        data.extend_from_slice(&args);

        let tx: TypedTransaction = TransactionRequest::new().to(to_h160(to)).data(data).into();
        let block = at_block.map(|n| BlockId::Number(BlockNumber::Number(n.into())));
        debug!(%to, ?at_block, "[FEED] eth_call");
        let out = self.provider.call(&tx, block).await?;
        Ok(Bytes::from(out.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_config() {
        let cfg = ClientConfig::new("http://localhost:8545", "ws://localhost:8546", 8453)
            .expect("valid config");
        let feed = RpcChainFeed::from_config(&cfg).expect("provider builds");
        assert_eq!(feed.ws_url.as_str(), "ws://localhost:8546/");
    }

    #[tokio::test]
    async fn unreachable_ws_is_a_connection_error() {
        let feed = RpcChainFeed::new(
            &Url::parse("http://127.0.0.1:1").unwrap(),
            Url::parse("ws://127.0.0.1:1").unwrap(),
            Duration::from_millis(500),
            RetryPolicy::no_retry(),
        )
        .unwrap();
        let res = feed.subscribe_new_blocks().await;
        assert!(matches!(res, Err(crate::errors::SdkError::Connection(_))));
    }
}
