//! REST API Integration Tests
//!
//! Drives the full router over the simulated broker: a trading round trip
//! through positions and executions, session loss, read-only sessions and
//! the health surface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{Gateway, wait_until};

fn market_order(symbol: &str, action: &str, quantity: u32) -> serde_json::Value {
    json!({
        "contract": {"symbol": symbol},
        "action": action,
        "order_type": "MKT",
        "quantity": quantity,
    })
}

#[tokio::test]
async fn trading_round_trip_updates_positions() {
    let gateway = Gateway::start(&[]).await;

    let (status, bought) = gateway
        .send("POST", "/api/v1/trading/orders/place", Some(market_order("AAPL", "BUY", 100)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bought["status"], "Filled");

    let (status, sold) = gateway
        .send("POST", "/api/v1/trading/orders/place", Some(market_order("AAPL", "SELL", 40)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(sold["order_id"], bought["order_id"]);

    let (status, positions) = gateway.send("GET", "/api/v1/account/positions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(positions["count"], 1);
    assert_eq!(positions["positions"][0]["contract"]["symbol"], "AAPL");
    assert_eq!(positions["positions"][0]["position"], 60.0);

    let (_, executions) = gateway.send("GET", "/api/v1/trading/executions", None).await;
    assert_eq!(executions["count"], 2);

    let (_, open) = gateway.send("GET", "/api/v1/trading/orders/open", None).await;
    assert_eq!(open["count"], 0);

    let (_, portfolio) = gateway
        .send("GET", "/api/v1/account/portfolio?account=DU123456", None)
        .await;
    assert_eq!(portfolio["count"], 1);

    gateway.stop().await;
}

#[tokio::test]
async fn accounts_follow_configuration() {
    let gateway = Gateway::start(&[("SIM_ACCOUNTS", "DU111111,DU222222")]).await;

    let (_, accounts) = gateway.send("GET", "/api/v1/account/managed-accounts", None).await;
    assert_eq!(accounts, json!({"accounts": ["DU111111", "DU222222"], "count": 2}));

    let (status, summary) = gateway.send("GET", "/api/v1/account/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["account"], "DU111111");

    let (status, summary) = gateway
        .send("GET", "/api/v1/account/summary?account=DU222222", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["summary"]["NetLiquidation"]["value"], "1000000.00");

    gateway.stop().await;
}

#[tokio::test]
async fn read_only_session_refuses_orders() {
    let gateway = Gateway::start(&[("BROKER_READONLY", "true")]).await;

    let (status, body) = gateway
        .send("POST", "/api/v1/trading/orders/place", Some(market_order("MSFT", "BUY", 1)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "READ_ONLY");

    // Reads still work.
    let (status, _) = gateway.send("GET", "/api/v1/trading/orders/all", None).await;
    assert_eq!(status, StatusCode::OK);

    gateway.stop().await;
}

#[tokio::test]
async fn lost_session_reports_unavailable() {
    let gateway = Gateway::start(&[]).await;

    gateway.broker.disconnect("socket closed").await;
    wait_until(|| !gateway.session.is_connected()).await;

    let (status, body) = gateway.send("GET", "/api/v1/account/managed-accounts", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "BROKER_UNAVAILABLE");

    let (_, connection) = gateway.send("GET", "/api/v1/connection", None).await;
    assert_eq!(connection["connected"], false);

    let (status, _) = gateway.send("GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    gateway.broker.connect().await;
    wait_until(|| gateway.session.is_connected()).await;
    let (status, _) = gateway.send("GET", "/api/v1/account/managed-accounts", None).await;
    assert_eq!(status, StatusCode::OK);

    gateway.stop().await;
}

#[tokio::test]
async fn health_reports_session_and_subscriptions() {
    let gateway = Gateway::start(&[]).await;

    let (status, health) = gateway.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["broker"]["state"], "connected");
    assert_eq!(health["subscriptions"]["active_keys"], 0);

    let (status, _) = gateway.send("GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);

    gateway.stop().await;
}

#[tokio::test]
async fn validation_errors_carry_codes() {
    let gateway = Gateway::start(&[]).await;

    let (status, body) = gateway
        .send(
            "POST",
            "/api/v1/trading/orders/place",
            Some(json!({
                "contract": {"symbol": "AAPL"},
                "action": "BUY",
                "order_type": "LMT",
                "quantity": 5,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_ORDER");

    let (status, body) = gateway
        .send(
            "POST",
            "/api/v1/trading/contract/qualify",
            Some(json!({"symbol": "AAPL", "sec_type": "BOND"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_SEC_TYPE");

    let (status, body) = gateway
        .send("POST", "/api/v1/trading/orders/cancel", Some(json!({"order_id": 9_999})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    gateway.stop().await;
}
