//! Miscellaneous helper utilities.

use crate::config::RetryPolicy;
use crate::errors::Result;
use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::future::Future;
use std::str::FromStr;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Run `op` until it succeeds or `policy` is exhausted, sleeping between attempts.
///
/// Invalid-state errors are returned immediately: retrying cannot fix bad data.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && !e.is_invalid_state() => {
                let delay = policy.delay_for(attempt);
                warn!(what, attempt, ?delay, error = %e, "[RETRY] attempt failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Convert a raw token amount into a decimal with `decimals` fractional digits.
pub fn format_units(amount: U256, decimals: u8) -> BigDecimal {
    // U256 always renders as a plain decimal integer
    let digits = BigInt::from_str(&amount.to_string()).unwrap_or_default();
    BigDecimal::new(digits, i64::from(decimals))
}
