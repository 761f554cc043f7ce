//! Block-driven refresh loop and client lifecycle.

use crate::config::RetryPolicy;
use crate::errors::{Result, SdkError};
use crate::feed::{BlockStream, ChainFeed};
use crate::state::{CacheStatus, RefreshReport, StateCache};
use futures::StreamExt;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback invoked for every refresh failure that does not stop the client.
pub type ErrorHook = Arc<dyn Fn(&SdkError) + Send + Sync>;

#[derive(Clone, Default)]
struct HookSlot(Arc<RwLock<Option<ErrorHook>>>);

impl HookSlot {
    fn set(&self, hook: ErrorHook) {
        if let Ok(mut slot) = self.0.write() {
            *slot = Some(hook);
        }
    }

    fn report(&self, err: &SdkError) {
        let hook = self.0.read().ok().and_then(|slot| slot.clone());
        if let Some(hook) = hook {
            hook(err);
        }
    }
}

/// Owns the block subscription and is the only writer of the [`StateCache`].
pub struct SyncController {
    feed: Arc<dyn ChainFeed>,
    cache: Arc<StateCache>,
    task: Option<JoinHandle<()>>,
    hook: HookSlot,
}

impl SyncController {
    pub fn new(feed: Arc<dyn ChainFeed>, cache: Arc<StateCache>) -> Self {
        Self {
            feed,
            cache,
            task: None,
            hook: HookSlot::default(),
        }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Install the refresh-failure hook. Takes effect immediately, also for a running loop.
    pub fn set_error_hook(&self, hook: ErrorHook) {
        self.hook.set(hook);
    }

    pub fn is_running(&self) -> bool {
        self.cache.snapshot().is_running()
    }

    /// Subscribe to new blocks, load every tracked pair, then spawn the refresh loop.
    ///
    /// Calling `start()` on a running controller is a no-op.
    ///
    /// # Errors
    /// `Connection` if the subscription cannot be established, `StateFetch` if
    /// the initial refresh fails after the startup retries.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("[SYNC] start() while running, ignoring");
            return Ok(());
        }
        self.abort_task().await;

        let run_id = self.cache.begin_run();
        info!(run_id, "[SYNC] starting");

        let blocks = match self.feed.subscribe_new_blocks().await {
            Ok(blocks) => blocks,
            Err(e) => {
                self.cache.stop();
                error!(error = %e, "[SYNC] block subscription failed");
                return Err(match e {
                    SdkError::Connection(_) => e,
                    other => SdkError::Connection(other.to_string()),
                });
            }
        };

        if let Err(e) = self.initial_refresh(run_id).await {
            self.cache.stop();
            error!(error = %e, "[SYNC] initial refresh failed");
            return Err(e);
        }

        if !self.cache.mark_running(run_id) {
            return Err(SdkError::NotRunning);
        }
        let snap = self.cache.snapshot();
        info!(
            run_id,
            pairs = snap.len(),
            block = snap.chain().current_block,
            "[SYNC] running"
        );

        let settings = self.cache.settings();
        let mode = if settings.pairs.is_empty() {
            RefreshMode::Discover
        } else {
            RefreshMode::Tracked
        };
        let refresh_retry = settings.refresh_retry;
        self.task = Some(tokio::spawn(run_loop(
            self.cache.clone(),
            blocks,
            run_id,
            mode,
            refresh_retry,
            self.hook.clone(),
        )));
        Ok(())
    }

    async fn initial_refresh(&self, run_id: u64) -> Result<()> {
        let settings = self.cache.settings();
        let retry = settings.startup_retry;
        let report = if settings.pairs.is_empty() {
            info!("[SYNC] no pairs configured, discovering from helper");
            self.cache.refresh_discovered(run_id, None, &retry).await?
        } else {
            self.cache.set_tracked(run_id, settings.pairs.clone())?;
            self.cache.refresh_all(run_id, None, &retry).await?
        };

        let RefreshReport { failed, .. } = report;
        let mut fatal = None;
        for e in failed {
            if e.is_invalid_state() {
                warn!(error = %e, "[SYNC] skipping pair with invalid state");
                self.hook.report(&e);
            } else if fatal.is_none() {
                fatal = Some(e);
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancel the refresh loop and discard all cached state.
    ///
    /// # Errors
    /// `NotRunning` if the controller was not started.
    pub async fn stop(&mut self) -> Result<()> {
        let status = self.cache.snapshot().status();
        if !matches!(status, CacheStatus::Running | CacheStatus::Starting) {
            return Err(SdkError::NotRunning);
        }
        // Rejects any write still in flight before the task is cancelled.
        self.cache.stop();
        self.abort_task().await;
        info!("[SYNC] stopped");
        Ok(())
    }

    async fn abort_task(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(error = %e, "[SYNC] refresh loop panicked"),
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// How each new block refreshes the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// One `getOrderbook` call per configured pair.
    Tracked,
    /// One `getAllOrderbooks` call; the tracked set follows the helper's listing.
    Discover,
}

async fn run_loop(
    cache: Arc<StateCache>,
    mut blocks: BlockStream,
    run_id: u64,
    mode: RefreshMode,
    retry: RetryPolicy,
    hook: HookSlot,
) {
    while let Some(block) = blocks.next().await {
        let current = cache.snapshot().chain().current_block;
        if block <= current {
            debug!(block, current, "[SYNC] skipping stale block");
            continue;
        }

        let refreshed = match mode {
            RefreshMode::Tracked => cache.refresh_all(run_id, Some(block), &retry).await,
            RefreshMode::Discover => cache.refresh_discovered(run_id, Some(block), &retry).await,
        };
        match refreshed {
            Ok(report) => {
                for e in &report.failed {
                    warn!(block, error = %e, "[SYNC] pair refresh failed");
                    hook.report(e);
                }
                if report.advanced {
                    debug!(
                        block = report.chain.current_block,
                        refreshed = report.refreshed,
                        "[SYNC] block processed"
                    );
                } else {
                    warn!(block, "[SYNC] no pair refreshed, chain state not advanced");
                }
            }
            Err(SdkError::NotRunning) => {
                debug!(run_id, "[SYNC] run superseded, exiting loop");
                return;
            }
            Err(e) => {
                error!(block, error = %e, "[SYNC] refresh failed");
                hook.report(&e);
            }
        }
    }
    error!(run_id, "[SYNC] block stream ended, cached state will go stale");
    hook.report(&SdkError::Connection("block stream ended".into()));
}
