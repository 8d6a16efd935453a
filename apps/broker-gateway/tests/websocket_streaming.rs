//! WebSocket Streaming Integration Tests
//!
//! Runs the gateway on an ephemeral port and connects real WebSocket
//! clients: single-key streams, the multiplexed command protocol, error
//! frames and release of upstream subscriptions on disconnect.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{Gateway, wait_until};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    client
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .expect("no frame received in time")
}

/// Next JSON frame matching `predicate`.
async fn next_matching(client: &mut Client, predicate: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = next_json(client).await;
        if predicate(&frame) {
            return frame;
        }
    }
}

async fn expect_close(client: &mut Client, code: CloseCode) {
    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("no close frame received in time");
    match frame {
        Some(Ok(Message::Close(Some(close)))) => assert_eq!(close.code, code),
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn command(client: &mut Client, action: &str, channel: &str, key: &str) {
    let text = json!({"action": action, "channel": channel, "key": key}).to_string();
    client.send(Message::Text(text.into())).await.unwrap();
}

// =============================================================================
// Single-key Streams
// =============================================================================

#[tokio::test]
async fn ticker_stream_pushes_updates() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;

    let mut client = connect(addr, "/api/v1/market-data/stream/market-data/aapl").await;
    let first = next_json(&mut client).await;
    assert_eq!(first["symbol"], "AAPL");
    let second = next_json(&mut client).await;
    assert_eq!(second["symbol"], "AAPL");
    assert!(second["last"].as_f64().unwrap() > 0.0);

    assert_eq!(gateway.registry.stats().active_keys, 1);
    gateway.stop().await;
}

#[tokio::test]
async fn pnl_stream_pushes_account_updates() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;

    let mut client = connect(addr, "/api/v1/account/stream/pnl/DU123456").await;
    let update = next_json(&mut client).await;
    assert_eq!(update["account"], "DU123456");
    assert!(update["daily_pnl"].is_number());

    gateway.stop().await;
}

#[tokio::test]
async fn clients_share_one_upstream_stream() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;
    let path = "/api/v1/market-data/stream/market-data/MSFT";

    let mut a = connect(addr, path).await;
    let mut b = connect(addr, path).await;
    next_json(&mut a).await;
    next_json(&mut b).await;

    assert_eq!(gateway.broker.open_streams(), 1);
    assert_eq!(gateway.registry.stats().sinks, 2);

    a.close(None).await.unwrap();
    wait_until(|| gateway.registry.stats().sinks == 1).await;
    assert_eq!(gateway.broker.open_streams(), 1);
    next_json(&mut b).await;

    b.close(None).await.unwrap();
    wait_until(|| gateway.registry.stats().active_keys == 0).await;
    wait_until(|| gateway.broker.open_streams() == 0).await;

    gateway.stop().await;
}

#[tokio::test]
async fn invalid_key_gets_error_frame_and_close() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;

    let mut client = connect(addr, "/api/v1/market-data/stream/market-data/bad!key").await;
    let frame = next_json(&mut client).await;
    assert_eq!(frame["code"], "INVALID_KEY");
    expect_close(&mut client, CloseCode::Policy).await;

    assert_eq!(gateway.broker.open_streams(), 0);
    gateway.stop().await;
}

#[tokio::test]
async fn rejected_symbol_gets_error_frame_and_close() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;

    let mut client = connect(addr, "/api/v1/market-data/stream/market-data/XYZ").await;
    let frame = next_json(&mut client).await;
    assert_eq!(frame["code"], "UPSTREAM_UNAVAILABLE");
    expect_close(&mut client, CloseCode::Policy).await;

    assert!(gateway.registry.active_keys().await.is_empty());
    gateway.stop().await;
}

// =============================================================================
// Multiplexed Stream
// =============================================================================

#[tokio::test]
async fn multiplexed_subscribe_and_unsubscribe() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;
    let mut client = connect(addr, "/api/v1/stream").await;

    command(&mut client, "subscribe", "ticker", "spy").await;
    let ack = next_json(&mut client).await;
    assert_eq!(ack, json!({"type": "subscribed", "channel": "ticker", "key": "SPY"}));
    let update = next_matching(&mut client, |f| f["symbol"] == "SPY").await;
    assert!(update["bid"].is_number());

    command(&mut client, "subscribe", "pnl", "DU123456").await;
    next_matching(&mut client, |f| f["type"] == "subscribed" && f["channel"] == "pnl").await;
    next_matching(&mut client, |f| f["account"] == "DU123456").await;
    assert_eq!(gateway.registry.stats().active_keys, 2);

    command(&mut client, "unsubscribe", "ticker", "SPY").await;
    next_matching(&mut client, |f| f["type"] == "unsubscribed").await;
    wait_until(|| gateway.registry.stats().active_keys == 1).await;

    client.close(None).await.unwrap();
    wait_until(|| gateway.registry.stats() == Default::default()).await;
    wait_until(|| gateway.broker.open_streams() == 0).await;

    gateway.stop().await;
}

#[tokio::test]
async fn multiplexed_errors_keep_connection_open() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;
    let mut client = connect(addr, "/api/v1/stream").await;

    client.send(Message::Text("not json".into())).await.unwrap();
    let frame = next_json(&mut client).await;
    assert_eq!(frame["code"], "INVALID_REQUEST");

    command(&mut client, "subscribe", "pnl", "U999").await;
    let frame = next_json(&mut client).await;
    assert_eq!(frame["code"], "UPSTREAM_UNAVAILABLE");

    command(&mut client, "subscribe", "ticker", "").await;
    let frame = next_json(&mut client).await;
    assert_eq!(frame["code"], "INVALID_KEY");

    // Still usable after errors.
    command(&mut client, "subscribe", "ticker", "AAPL").await;
    let ack = next_json(&mut client).await;
    assert_eq!(ack["type"], "subscribed");

    gateway.stop().await;
}

#[tokio::test]
async fn shutdown_closes_streams() {
    let gateway = Gateway::default_fast().await;
    let addr = gateway.serve().await;
    let mut client = connect(addr, "/api/v1/market-data/stream/market-data/AAPL").await;
    next_json(&mut client).await;

    gateway.shutdown.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(Some(close)))) => return close.code,
                Some(Ok(_)) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .expect("stream not closed on shutdown");
    assert_eq!(closed, CloseCode::Away);

    gateway.stop().await;
}
