//! `newHeads` WebSocket listener.
//!
//! Responsibilities:
//! • Open the socket and confirm an `eth_subscribe("newHeads")` subscription.
//! • Publish the highest block number seen into a `watch` channel.
//! • Reconnect with backoff when the connection drops.
//! • Exit once nobody is listening anymore.

use crate::config::RetryPolicy;
use crate::errors::{Result, SdkError};
use crate::feed::BlockStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionMsg {
    method: Option<String>,
    params: Option<SubscriptionParams>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    result: NewHead,
}

#[derive(Debug, Deserialize)]
struct NewHead {
    number: String,
}

/// Extract the block number from an `eth_subscription` notification.
pub fn parse_new_head(txt: &str) -> Option<u64> {
    let msg: SubscriptionMsg = serde_json::from_str(txt).ok()?;
    if msg.method.as_deref() != Some("eth_subscription") {
        return None;
    }
    let number = msg.params?.result.number;
    u64::from_str_radix(number.trim_start_matches("0x"), 16).ok()
}

/// Connect and confirm a `newHeads` subscription.
pub async fn connect_new_heads(url: &Url, connect_timeout: Duration) -> Result<WsStream> {
    let (mut ws, _resp) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| SdkError::Connection(format!("timed out connecting to {url}")))?
        .map_err(|e| SdkError::Connection(format!("connect to {url} failed: {e}")))?;

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["newHeads"],
    });
    ws.send(Message::Text(request.to_string())).await?;

    let confirmation = tokio::time::timeout(connect_timeout, async {
        while let Some(msg) = ws.next().await {
            match msg? {
                Message::Text(txt) => return Ok(txt),
                Message::Close(_) => break,
                _ => continue,
            }
        }
        Err::<String, SdkError>(SdkError::Connection(
            "socket closed before subscription was confirmed".into(),
        ))
    })
    .await
    .map_err(|_| SdkError::Connection("timed out waiting for eth_subscribe reply".into()))??;

    let resp: SubscribeResponse = serde_json::from_str(&confirmation)?;
    if let Some(err) = resp.error {
        return Err(SdkError::Connection(format!("eth_subscribe failed: {err}")));
    }
    let sub_id = resp
        .result
        .ok_or_else(|| SdkError::Connection(format!("unexpected eth_subscribe reply: {confirmation}")))?;
    info!(%url, %sub_id, "[FEED] subscribed to newHeads");
    Ok(ws)
}

/// Connect, subscribe, and spawn the listener task.
///
/// The first connection must succeed; later disconnects are retried per `reconnect`.
pub async fn spawn_block_listener(
    url: Url,
    connect_timeout: Duration,
    reconnect: RetryPolicy,
) -> Result<watch::Receiver<u64>> {
    let ws = connect_new_heads(&url, connect_timeout).await?;
    let (tx, rx) = watch::channel(0u64);
    tokio::spawn(run_listener(ws, url, connect_timeout, reconnect, tx));
    Ok(rx)
}

/// Turn the listener's latest-block channel into a [`BlockStream`].
///
/// Blocks published while the consumer is busy are coalesced into the latest one.
pub fn watch_stream(rx: watch::Receiver<u64>) -> BlockStream {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        let block = *rx.borrow_and_update();
        Some((block, rx))
    })
    .boxed()
}

enum PumpEnd {
    ConsumerGone,
    Disconnected(String),
}

async fn run_listener(
    ws: WsStream,
    url: Url,
    connect_timeout: Duration,
    reconnect: RetryPolicy,
    tx: watch::Sender<u64>,
) {
    let mut current = Some(ws);
    let mut failures: u32 = 0;

    loop {
        let ws = match current.take() {
            Some(ws) => ws,
            None => match connect_new_heads(&url, connect_timeout).await {
                Ok(ws) => {
                    failures = 0;
                    ws
                }
                Err(e) => {
                    failures += 1;
                    if failures >= reconnect.max_attempts {
                        error!(%url, failures, error = %e, "[FEED] giving up on newHeads subscription");
                        return;
                    }
                    let delay = reconnect.delay_for(failures);
                    warn!(%url, failures, ?delay, error = %e, "[FEED] reconnect failed");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = tx.closed() => return,
                    }
                }
            },
        };

        match pump(ws, &tx).await {
            PumpEnd::ConsumerGone => {
                debug!("[FEED] block consumer dropped, closing listener");
                return;
            }
            PumpEnd::Disconnected(reason) => {
                warn!(%url, %reason, "[FEED] websocket connection lost, reconnecting");
            }
        }
    }
}

async fn pump(ws: WsStream, tx: &watch::Sender<u64>) -> PumpEnd {
    let (mut sink, mut source) = ws.split();
    loop {
        tokio::select! {
            _ = tx.closed() => {
                let _ = sink.close().await;
                return PumpEnd::ConsumerGone;
            }
            msg = source.next() => match msg {
                Some(Ok(Message::Text(txt))) => {
                    if let Some(block) = parse_new_head(&txt) {
                        tx.send_if_modified(|latest| {
                            if block > *latest {
                                *latest = block;
                                true
                            } else {
                                false
                            }
                        });
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return PumpEnd::Disconnected(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return PumpEnd::Disconnected(format!("closed by server: {frame:?}"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpEnd::Disconnected(e.to_string()),
                None => return PumpEnd::Disconnected("stream ended".into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_head_notification() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xabc",
                "result": { "number": "0x1b4", "hash": "0x00", "timestamp": "0x5" }
            }
        }"#;
        assert_eq!(parse_new_head(raw), Some(0x1b4));
    }

    #[test]
    fn ignores_other_messages() {
        assert_eq!(parse_new_head(r#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#), None);
        assert_eq!(parse_new_head("not json"), None);
        let bad_number = r#"{"method":"eth_subscription","params":{"result":{"number":"0xzz"}}}"#;
        assert_eq!(parse_new_head(bad_number), None);
    }

    #[tokio::test]
    async fn watch_stream_coalesces_and_ends_with_sender() {
        let (tx, rx) = watch::channel(0u64);
        let mut stream = watch_stream(rx);

        tx.send(5).unwrap();
        tx.send(6).unwrap();
        assert_eq!(stream.next().await, Some(6));

        tx.send(7).unwrap();
        assert_eq!(stream.next().await, Some(7));

        drop(tx);
        assert_eq!(stream.next().await, None);
    }
}
