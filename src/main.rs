use alloy_primitives::{Address, U256, address};
use anyhow::Result;
use elfomofi_sdk::{Client, ClientConfig, utils};
use std::time::Duration;

const WETH: Address = address!("4200000000000000000000000000000000000006");
const USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = ClientConfig::from_env()?;
    tracing::info!(chain = config.chain.name, rpc = %config.rpc_url, "[INIT] elfomofi-sdk demo starting");

    let mut client = Client::new(config)?;
    client.on_refresh_error(|err| tracing::warn!(error = %err, "[DEMO] refresh error"));
    client.start().await?;

    tracing::info!(
        block = client.current_block()?,
        timestamp = client.block_timestamp()?,
        "[INIT] client started"
    );
    for (base, quote) in client.pairs()? {
        tracing::info!(%base, %quote, "[INIT] tracking pair");
    }

    // 1 WETH
    let amount_in = U256::from(10u64).pow(U256::from(18u64));
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.quote(WETH, USDC, amount_in)? {
                    Some(q) => tracing::info!(
                        block = q.block_number,
                        amount_in = %utils::format_units(q.amount_in, 18),
                        amount_out = %utils::format_units(q.amount_out, 6),
                        "[QUOTE] WETH -> USDC"
                    ),
                    None => tracing::info!("[QUOTE] WETH/USDC is not tracked"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[SHUTDOWN] ctrl-c received");
                break;
            }
        }
    }

    client.stop().await?;
    Ok(())
}
