//! In-memory mirror of the helper contract's pair state.
//!
//! The cache is a single `watch` channel holding an immutable [`Snapshot`].
//! The sync controller is the only writer; every write builds the next snapshot
//! and swaps it in under the channel lock, so readers see either the previous
//! snapshot or the next one and never a half-applied refresh.

use crate::config::{RetryPolicy, SyncSettings};
use crate::errors::{Result, SdkError};
use crate::models::{ChainState, PairKey, PairState};
use crate::utils::with_retry;
use alloy_primitives::Address;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

pub mod helper;

pub use helper::{FetchResult, HelperClient, RawPairData};

/// Lifecycle of the cache contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Never started.
    Idle,
    /// `start()` is performing the initial refresh.
    Starting,
    Running,
    Stopped,
}

/// Immutable view of everything the client knows at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    status: CacheStatus,
    run_id: u64,
    chain: ChainState,
    tracked: Arc<Vec<(Address, Address)>>,
    pairs: HashMap<PairKey, Arc<PairState>>,
}

impl Snapshot {
    fn empty(status: CacheStatus, run_id: u64) -> Self {
        Self {
            status,
            run_id,
            chain: ChainState::default(),
            tracked: Arc::new(Vec::new()),
            pairs: HashMap::new(),
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == CacheStatus::Running
    }

    pub fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SdkError::NotRunning)
        }
    }

    pub fn chain(&self) -> ChainState {
        self.chain
    }

    /// Tracked `(base, quote)` pairs in helper/config order.
    pub fn tracked(&self) -> &[(Address, Address)] {
        &self.tracked
    }

    /// Cached entry for `{a, b}` in either order.
    pub fn pair(&self, a: Address, b: Address) -> Option<&Arc<PairState>> {
        self.pairs.get(&PairKey::new(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn accepts_writes_from(&self, run_id: u64) -> bool {
        self.run_id == run_id
            && matches!(self.status, CacheStatus::Starting | CacheStatus::Running)
    }
}

/// Outcome of one batch refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: usize,
    /// Pairs evicted because the helper returned invalid data.
    pub evicted: usize,
    pub failed: Vec<SdkError>,
    /// Chain state after the batch was applied.
    pub chain: ChainState,
    pub advanced: bool,
}

impl RefreshReport {
    /// First failure that was not caused by invalid on-chain data.
    pub fn first_transport_failure(&self) -> Option<&SdkError> {
        self.failed.iter().find(|e| !e.is_invalid_state())
    }
}

/// A successfully fetched pair and the timestamp of the block it came from.
#[derive(Debug, Clone)]
pub(crate) struct FetchedPair {
    pub state: PairState,
    pub block_timestamp: u64,
}

/// Latest pair reserves, refreshed from the helper contract.
pub struct StateCache {
    helper: HelperClient,
    settings: SyncSettings,
    tx: watch::Sender<Arc<Snapshot>>,
    next_run: AtomicU64,
}

impl StateCache {
    pub fn new(helper: HelperClient, settings: SyncSettings) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::empty(CacheStatus::Idle, 0)));
        Self {
            helper,
            settings,
            tx,
            next_run: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Read handle that always observes the latest published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// Current entry for `{a, b}`, or `None` if untracked or never refreshed.
    pub fn get(&self, a: Address, b: Address) -> Option<Arc<PairState>> {
        self.tx.borrow().pair(a, b).cloned()
    }

    /// Discard previous contents and open a new run. Returns its id.
    pub fn begin_run(&self) -> u64 {
        let run_id = self.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .send_replace(Arc::new(Snapshot::empty(CacheStatus::Starting, run_id)));
        run_id
    }

    /// Make the run's snapshot quotable.
    pub fn mark_running(&self, run_id: u64) -> bool {
        self.tx.send_if_modified(|snap| {
            if snap.run_id != run_id || snap.status != CacheStatus::Starting {
                return false;
            }
            let mut next = (**snap).clone();
            next.status = CacheStatus::Running;
            *snap = Arc::new(next);
            true
        })
    }

    /// Discard all state. Writes from any earlier run are rejected from here on.
    pub fn stop(&self) {
        self.tx.send_modify(|snap| {
            *snap = Arc::new(Snapshot::empty(CacheStatus::Stopped, snap.run_id));
        });
    }

    /// Replace the tracked pair list for `run_id`.
    pub fn set_tracked(&self, run_id: u64, pairs: Vec<(Address, Address)>) -> Result<()> {
        let tracked = Arc::new(pairs);
        let applied = self.tx.send_if_modified(|snap| {
            if !snap.accepts_writes_from(run_id) {
                return false;
            }
            let mut next = (**snap).clone();
            next.tracked = tracked;
            *snap = Arc::new(next);
            true
        });
        if applied { Ok(()) } else { Err(SdkError::NotRunning) }
    }

    /// Fetch the latest reserves of one pair and replace its entry.
    ///
    /// Invalid data evicts the entry. ChainState is left to the batch refresh.
    pub async fn refresh(
        &self,
        run_id: u64,
        base: Address,
        quote: Address,
        at_block: Option<u64>,
    ) -> Result<Arc<PairState>> {
        let key = PairKey::new(base, quote);
        let fetched = self.fetch_pair(base, quote, at_block).await;
        let mut report = self.apply(run_id, vec![(key, fetched)], None, false)?;
        if let Some(err) = report.failed.pop() {
            return Err(err);
        }
        self.get(base, quote)
            .ok_or_else(|| SdkError::Other(format!("pair {key} missing after refresh")))
    }

    /// Refresh every tracked pair concurrently and publish the result as one snapshot.
    ///
    /// Per-pair failures are collected in the report. ChainState advances when
    /// at least one pair refreshed and the helper's block is newer than the current one.
    pub async fn refresh_all(
        &self,
        run_id: u64,
        at_block: Option<u64>,
        retry: &RetryPolicy,
    ) -> Result<RefreshReport> {
        let tracked = self.snapshot().tracked.clone();
        let fetches = tracked.iter().map(|&(base, quote)| async move {
            let key = PairKey::new(base, quote);
            let what = format!("getOrderbook {key}");
            let res = with_retry(retry, &what, || self.fetch_pair(base, quote, at_block)).await;
            (key, res)
        });
        let results = futures::future::join_all(fetches).await;
        self.apply(run_id, results, None, true)
    }

    /// Replace the tracked set with the helper's `getAllOrderbooks()` listing and
    /// load every pair from that single call.
    ///
    /// Pairs the helper no longer lists are dropped from the cache.
    pub async fn refresh_discovered(
        &self,
        run_id: u64,
        at_block: Option<u64>,
        retry: &RetryPolicy,
    ) -> Result<RefreshReport> {
        let result = with_retry(retry, "getAllOrderbooks", || {
            self.helper.fetch_all_orderbooks(at_block)
        })
        .await
        .map_err(|e| e.fetching("helper getAllOrderbooks"))?;

        let tracked = result.pairs.iter().map(|raw| (raw.base, raw.quote)).collect();
        let results = result
            .pairs
            .into_iter()
            .map(|raw| {
                let key = PairKey::new(raw.base, raw.quote);
                let fetched = self
                    .build_pair(raw, result.block_number, result.block_timestamp)
                    .map_err(|e| e.for_pair(key));
                (key, fetched)
            })
            .collect();
        self.apply(run_id, results, Some(tracked), true)
    }

    async fn fetch_pair(
        &self,
        base: Address,
        quote: Address,
        at_block: Option<u64>,
    ) -> Result<FetchedPair> {
        let key = PairKey::new(base, quote);
        let result = self
            .helper
            .fetch_orderbook(base, quote, at_block)
            .await
            .map_err(|e| e.for_pair(key))?;
        let raw = result
            .pairs
            .into_iter()
            .find(|raw| PairKey::new(raw.base, raw.quote) == key)
            .ok_or_else(|| {
                SdkError::InvalidState("helper returned a different pair".into()).for_pair(key)
            })?;
        self.build_pair(raw, result.block_number, result.block_timestamp)
            .map_err(|e| e.for_pair(key))
    }

    fn build_pair(&self, raw: RawPairData, block_number: u64, block_timestamp: u64) -> Result<FetchedPair> {
        let key = PairKey::new(raw.base, raw.quote);
        let state = PairState {
            base: raw.base,
            quote: raw.quote,
            reserve_base: raw.balance_base,
            reserve_quote: raw.balance_quote,
            fee_bps: self.settings.fee_for(&key),
            block_number,
            ask_probes: raw.ask_probes,
            bid_probes: raw.bid_probes,
        };
        state.validate()?;
        Ok(FetchedPair {
            state,
            block_timestamp,
        })
    }

    /// Publish a batch of fetch results atomically.
    ///
    /// Fails with `NotRunning` if the cache was stopped or restarted since `run_id` began.
    pub(crate) fn apply(
        &self,
        run_id: u64,
        results: Vec<(PairKey, Result<FetchedPair>)>,
        tracked: Option<Vec<(Address, Address)>>,
        advance_chain: bool,
    ) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let mut fetched = Vec::new();
        let mut evict = Vec::new();
        for (key, res) in results {
            match res {
                Ok(pair) => fetched.push(pair),
                Err(e) => {
                    if e.is_invalid_state() {
                        evict.push(key);
                    }
                    report.failed.push(e);
                }
            }
        }

        let applied = self.tx.send_if_modified(|snap| {
            if !snap.accepts_writes_from(run_id) {
                return false;
            }
            let mut next = (**snap).clone();
            if let Some(tracked) = tracked {
                let listed: HashSet<PairKey> =
                    tracked.iter().map(|&(a, b)| PairKey::new(a, b)).collect();
                next.pairs.retain(|key, _| {
                    let keep = listed.contains(key);
                    if !keep {
                        debug!(%key, "[CACHE] dropping pair no longer listed");
                    }
                    keep
                });
                next.tracked = Arc::new(tracked);
            }

            let mut newest: Option<(u64, u64)> = None;
            for FetchedPair {
                state,
                block_timestamp,
            } in fetched
            {
                let block = state.block_number;
                newest = match newest {
                    Some((b, _)) if b >= block => newest,
                    _ => Some((block, block_timestamp)),
                };
                let key = state.key();
                let is_stale = next
                    .pairs
                    .get(&key)
                    .is_some_and(|old| old.block_number > block);
                if is_stale {
                    debug!(%key, block, "[CACHE] ignoring older pair data");
                    continue;
                }
                next.pairs.insert(key, Arc::new(state));
                report.refreshed += 1;
            }
            for key in &evict {
                if next.pairs.remove(key).is_some() {
                    warn!(%key, "[CACHE] evicted pair with invalid on-chain state");
                    report.evicted += 1;
                }
            }

            if let Some((block, timestamp)) = newest.filter(|_| advance_chain) {
                if block > next.chain.current_block {
                    next.chain = ChainState {
                        current_block: block,
                        block_timestamp: timestamp.max(next.chain.block_timestamp),
                    };
                    report.advanced = true;
                }
            }

            report.chain = next.chain;
            *snap = Arc::new(next);
            true
        });

        if applied { Ok(report) } else { Err(SdkError::NotRunning) }
    }
}
