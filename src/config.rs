//! Configuration loader and client settings.

use crate::chains::{ChainConfig, chain_config};
use crate::errors::{Result, SdkError};
use crate::models::PairKey;
use alloy_primitives::Address;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Default swap fee applied to pairs without an override (0.30%).
pub const DEFAULT_FEE_BPS: u16 = 30;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Settings the sync controller needs, independent of the transport.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub helper_address: Address,
    /// Tracked `(base, quote)` pairs. Empty means "discover from the helper".
    pub pairs: Vec<(Address, Address)>,
    pub default_fee_bps: u16,
    pub fee_overrides: HashMap<PairKey, u16>,
    /// Applied to the initial refresh performed by `start()`.
    pub startup_retry: RetryPolicy,
    /// Applied to each pair fetch triggered by a new block.
    pub refresh_retry: RetryPolicy,
}

impl SyncSettings {
    pub fn new(helper_address: Address) -> Self {
        Self {
            helper_address,
            pairs: Vec::new(),
            default_fee_bps: DEFAULT_FEE_BPS,
            fee_overrides: HashMap::new(),
            startup_retry: RetryPolicy::new(
                5,
                Duration::from_millis(200),
                Duration::from_secs(5),
            ),
            refresh_retry: RetryPolicy::new(
                2,
                Duration::from_millis(100),
                Duration::from_secs(1),
            ),
        }
    }

    pub fn fee_for(&self, key: &PairKey) -> u16 {
        self.fee_overrides
            .get(key)
            .copied()
            .unwrap_or(self.default_fee_bps)
    }
}

/// Consolidated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP endpoint used for contract calls.
    pub rpc_url: Url,
    /// WebSocket endpoint used for the `newHeads` subscription.
    pub ws_url: Url,
    pub chain: ChainConfig,
    pub connect_timeout: Duration,
    /// Reconnection policy of the block listener after the first connection.
    pub reconnect: RetryPolicy,
    pub sync: SyncSettings,
}

impl ClientConfig {
    pub fn new(rpc_url: &str, ws_url: &str, chain_id: u64) -> Result<Self> {
        let chain = chain_config(chain_id)?;
        Ok(Self {
            rpc_url: Url::parse(rpc_url)?,
            ws_url: Url::parse(ws_url)?,
            chain,
            connect_timeout: Duration::from_secs(10),
            reconnect: RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30)),
            sync: SyncSettings::new(chain.helper_address),
        })
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (env-like).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = lookup("RPC_URL").ok_or_else(|| missing("RPC_URL"))?;
        let ws_url = lookup("WS_URL").ok_or_else(|| missing("WS_URL"))?;
        let chain_id = match lookup("CHAIN_ID") {
            Some(raw) => parse_num::<u64>("CHAIN_ID", &raw)?,
            None => crate::chains::BASE.chain_id,
        };

        let mut config = Self::new(&rpc_url, &ws_url, chain_id)?;

        if let Some(raw) = lookup("PAIRS") {
            config.sync.pairs = parse_pairs(&raw)?;
        }
        if let Some(raw) = lookup("FEE_BPS") {
            let fee = parse_num::<u16>("FEE_BPS", &raw)?;
            if fee >= crate::models::BPS_DENOMINATOR {
                return Err(SdkError::Config(format!("FEE_BPS must be below 10000, got {fee}")));
            }
            config.sync.default_fee_bps = fee;
        }

        let base_delay = lookup("RETRY_BASE_DELAY_MS")
            .map(|raw| parse_num::<u64>("RETRY_BASE_DELAY_MS", &raw))
            .transpose()?
            .map(Duration::from_millis);
        let max_delay = lookup("RETRY_MAX_DELAY_MS")
            .map(|raw| parse_num::<u64>("RETRY_MAX_DELAY_MS", &raw))
            .transpose()?
            .map(Duration::from_millis);

        for policy in [&mut config.sync.startup_retry, &mut config.sync.refresh_retry] {
            if let Some(d) = base_delay {
                policy.base_delay = d;
            }
            if let Some(d) = max_delay {
                policy.max_delay = d;
            }
        }
        if let Some(raw) = lookup("STARTUP_MAX_ATTEMPTS") {
            config.sync.startup_retry.max_attempts =
                parse_num::<u32>("STARTUP_MAX_ATTEMPTS", &raw)?.max(1);
        }
        if let Some(raw) = lookup("REFRESH_MAX_ATTEMPTS") {
            config.sync.refresh_retry.max_attempts =
                parse_num::<u32>("REFRESH_MAX_ATTEMPTS", &raw)?.max(1);
        }

        Ok(config)
    }
}

fn missing(key: &str) -> SdkError {
    SdkError::Config(format!("Set {key} env var"))
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SdkError::Config(format!("{key} must be a number, got {raw:?}")))
}

/// Parse `base:quote,base:quote` into address pairs.
pub fn parse_pairs(raw: &str) -> Result<Vec<(Address, Address)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (base, quote) = entry
                .split_once(':')
                .ok_or_else(|| SdkError::Config(format!("pair {entry:?} is not base:quote")))?;
            let base: Address = base
                .trim()
                .parse()
                .map_err(|e| SdkError::Config(format!("bad base address {base:?}: {e}")))?;
            let quote: Address = quote
                .trim()
                .parse()
                .map_err(|e| SdkError::Config(format!("bad quote address {quote:?}: {e}")))?;
            if base == quote {
                return Err(SdkError::Config(format!("pair {entry:?} repeats one token")));
            }
            Ok((base, quote))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn loads_minimal_config_with_base_defaults() {
        let cfg = ClientConfig::from_lookup(env(&[
            ("RPC_URL", "https://base-rpc.publicnode.com"),
            ("WS_URL", "wss://base-rpc.publicnode.com"),
        ]))
        .expect("config should load");
        assert_eq!(cfg.chain.chain_id, 8453);
        assert_eq!(cfg.sync.helper_address, cfg.chain.helper_address);
        assert!(cfg.sync.pairs.is_empty());
        assert_eq!(cfg.sync.default_fee_bps, DEFAULT_FEE_BPS);
    }

    #[test]
    fn loads_pairs_fee_and_retry_overrides() {
        let cfg = ClientConfig::from_lookup(env(&[
            ("RPC_URL", "http://localhost:8545"),
            ("WS_URL", "ws://localhost:8546"),
            (
                "PAIRS",
                "0x4200000000000000000000000000000000000006:0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            ),
            ("FEE_BPS", "5"),
            ("STARTUP_MAX_ATTEMPTS", "3"),
            ("RETRY_BASE_DELAY_MS", "10"),
        ]))
        .expect("config should load");
        assert_eq!(cfg.sync.pairs.len(), 1);
        assert_eq!(cfg.sync.default_fee_bps, 5);
        assert_eq!(cfg.sync.startup_retry.max_attempts, 3);
        assert_eq!(cfg.sync.refresh_retry.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn rejects_missing_url_and_bad_values() {
        assert!(matches!(
            ClientConfig::from_lookup(env(&[("WS_URL", "ws://x")])),
            Err(SdkError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(env(&[
                ("RPC_URL", "http://x"),
                ("WS_URL", "ws://x"),
                ("CHAIN_ID", "1"),
            ])),
            Err(SdkError::UnsupportedChain(1))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(env(&[
                ("RPC_URL", "http://x"),
                ("WS_URL", "ws://x"),
                ("FEE_BPS", "10000"),
            ])),
            Err(SdkError::Config(_))
        ));
        assert!(parse_pairs("0x01:0x01").is_err());
        assert!(parse_pairs("nonsense").is_err());
    }
}
