//! In-memory chain feed serving helper responses for tests.

use crate::errors::{Result, SdkError};
use crate::feed::{BlockStream, ChainFeed, Selector, listener};
use crate::models::{PairKey, ProbePoint};
use crate::state::helper::{self, GET_ALL_ORDERBOOKS_SIG, GET_ORDERBOOK_SIG, RawPairData, encode};
use alloy_primitives::{Address, Bytes, U256, address};
use async_trait::async_trait;
use ethers::abi::{ParamType, Token};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub(crate) const HELPER: Address = address!("c1b13606FC7227f2554067aFb3fb12De75C02d81");
pub(crate) const WETH: Address = address!("4200000000000000000000000000000000000006");
pub(crate) const USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
pub(crate) const WBTC: Address = address!("0555E30da8f98308EdB960aa94C0Db47230d2B9c");

/// Pair with the given reserves and a two-point bid curve.
pub(crate) fn raw_pair(base: Address, quote: Address, reserve_base: u64, reserve_quote: u64) -> RawPairData {
    RawPairData {
        base,
        quote,
        ask_probes: vec![ProbePoint::new(U256::from(reserve_quote / 100), U256::from(reserve_base / 101))],
        bid_probes: vec![
            ProbePoint::new(U256::from(1u64), U256::from(reserve_quote / reserve_base.max(1))),
            ProbePoint::new(U256::from(10u64), U256::from(9 * reserve_quote / reserve_base.max(1))),
        ],
        balance_base: U256::from(reserve_base),
        balance_quote: U256::from(reserve_quote),
    }
}

pub(crate) struct MockFeed {
    books: Mutex<BTreeMap<PairKey, RawPairData>>,
    head: Mutex<(u64, u64)>,
    failing: Mutex<HashSet<PairKey>>,
    call_delay: Mutex<Duration>,
    refuse_subscribe: AtomicBool,
    calls: AtomicUsize,
    blocks: watch::Sender<u64>,
}

impl MockFeed {
    pub(crate) fn new() -> Arc<Self> {
        let (blocks, _rx) = watch::channel(0u64);
        Arc::new(Self {
            books: Mutex::new(BTreeMap::new()),
            head: Mutex::new((0, 0)),
            failing: Mutex::new(HashSet::new()),
            call_delay: Mutex::new(Duration::ZERO),
            refuse_subscribe: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            blocks,
        })
    }

    pub(crate) fn set_book(&self, raw: RawPairData) {
        let key = PairKey::new(raw.base, raw.quote);
        self.books.lock().unwrap().insert(key, raw);
    }

    pub(crate) fn remove_book(&self, a: Address, b: Address) {
        self.books.lock().unwrap().remove(&PairKey::new(a, b));
    }

    pub(crate) fn set_head(&self, block: u64, timestamp: u64) {
        *self.head.lock().unwrap() = (block, timestamp);
    }

    pub(crate) fn fail_pair(&self, a: Address, b: Address, failing: bool) {
        let key = PairKey::new(a, b);
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    pub(crate) fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    pub(crate) fn refuse_subscribe(&self, refuse: bool) {
        self.refuse_subscribe.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Move the head to `block` and notify subscribers.
    pub(crate) fn announce(&self, block: u64, timestamp: u64) {
        self.set_head(block, timestamp);
        self.blocks.send_replace(block);
    }

    /// Pairs in the order `getAllOrderbooks()` returns them.
    pub(crate) fn all_pairs(&self) -> Vec<(Address, Address)> {
        self.books
            .lock()
            .unwrap()
            .values()
            .map(|raw| (raw.base, raw.quote))
            .collect()
    }

    fn book(&self, base: Address, quote: Address) -> Result<RawPairData> {
        let key = PairKey::new(base, quote);
        if self.failing.lock().unwrap().contains(&key) {
            return Err(SdkError::Other(format!("execution reverted for {key}")));
        }
        self.books
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| SdkError::Other(format!("no orderbook for {key}")))
    }
}

#[async_trait]
impl ChainFeed for MockFeed {
    async fn subscribe_new_blocks(&self) -> Result<BlockStream> {
        if self.refuse_subscribe.load(Ordering::SeqCst) {
            return Err(SdkError::Connection("connection refused".into()));
        }
        Ok(listener::watch_stream(self.blocks.subscribe()))
    }

    async fn call_contract(
        &self,
        to: Address,
        selector: Selector,
        args: Bytes,
        at_block: Option<u64>,
    ) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if to != HELPER {
            return Err(SdkError::Other(format!("no contract at {to}")));
        }
        let (head, timestamp) = *self.head.lock().unwrap();
        let block = at_block.unwrap_or(head);

        if selector == helper::selector(GET_ORDERBOOK_SIG) {
            let tokens = ethers::abi::decode(&[ParamType::Address, ParamType::Address], &args)?;
            let (base, quote) = match tokens.as_slice() {
                [Token::Address(b), Token::Address(q)] => (Address::from(b.0), Address::from(q.0)),
                _ => return Err(SdkError::Other("bad getOrderbook args".into())),
            };
            let raw = self.book(base, quote)?;
            Ok(encode::orderbook_response(&raw, block, timestamp))
        } else if selector == helper::selector(GET_ALL_ORDERBOOKS_SIG) {
            let books: Vec<RawPairData> = self.books.lock().unwrap().values().cloned().collect();
            Ok(encode::all_orderbooks_response(&books, block, timestamp))
        } else {
            Err(SdkError::Other("unknown selector".into()))
        }
    }
}
