//! HTTP and WebSocket API
//!
//! Axum router for the gateway. REST handlers translate requests into
//! Broker Session calls; the stream handlers attach WebSocket connections to
//! the subscription registry.
//!
//! # Routes
//!
//! All API routes live under `/api/v1`:
//!
//! - `/account/*` - accounts, summary, positions, portfolio
//! - `/trading/*` - orders, executions, contract qualification
//! - `/market-data/*` - bars, ticks, depth, snapshots
//! - `/research/contract-details`, `/scanner/*`
//! - `/connection` - Broker Session connection info
//! - `/market-data/stream/market-data/{symbol}`, `/account/stream/pnl/{account}`,
//!   `/stream` - WebSocket streams

mod account;
mod error;
mod market_data;
mod research;
mod stream;
mod trading;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub use error::{ApiError, ApiResult};
pub use stream::ChannelSink;

use crate::application::ports::{BrokerError, ConnectionInfo, SharedBroker};
use crate::application::services::SubscriptionRegistry;
use crate::infrastructure::health::{self, HealthState};
use crate::infrastructure::metrics;

/// State shared by every API handler.
#[derive(Clone)]
pub struct AppState {
    /// Broker Session.
    pub broker: SharedBroker,
    /// Streaming subscription registry.
    pub registry: Arc<SubscriptionRegistry>,
    /// Upper bound on a single broker call.
    pub request_timeout: Duration,
    /// Outbound queue length per streaming connection.
    pub sink_capacity: usize,
    /// Cancelled when the server shuts down; stream tasks exit on it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Run a broker call under the request timeout.
    ///
    /// Failures are logged and counted under `operation`.
    pub(crate) async fn call<T, F>(&self, operation: &'static str, call: F) -> ApiResult<T>
    where
        F: Future<Output = Result<T, BrokerError>>,
    {
        let result = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::Timeout(self.request_timeout)),
        };
        if let Err(e) = &result {
            metrics::record_broker_call_error(operation, e.status().as_u16());
            tracing::warn!(operation, error = %e, "Broker call failed");
        }
        result
    }

    /// First managed account, for endpoints where `account` is optional.
    pub(crate) async fn default_account(&self) -> ApiResult<String> {
        let accounts = self
            .call("managed_accounts", self.broker.managed_accounts())
            .await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound("No accounts found".to_string()))
    }
}

/// `{"<field>": [...], "count": n}` reply body.
pub(crate) fn listing<T: Serialize>(field: &str, items: &[T]) -> Json<Value> {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), json!(items));
    body.insert("count".to_string(), json!(items.len()));
    Json(Value::Object(body))
}

/// Full gateway router: API routes plus health and metrics.
pub fn router(state: AppState, health_state: Arc<HealthState>) -> Router {
    let api = Router::new()
        .route("/connection", get(connection))
        // account
        .route("/account/managed-accounts", get(account::managed_accounts))
        .route("/account/summary", get(account::summary))
        .route("/account/values", get(account::values))
        .route("/account/positions", get(account::positions))
        .route("/account/portfolio", get(account::portfolio))
        .route("/account/stream/pnl/{account}", get(stream::pnl_stream))
        // trading
        .route("/trading/orders/place", post(trading::place_order))
        .route("/trading/orders/cancel", post(trading::cancel_order))
        .route("/trading/orders/open", get(trading::open_orders))
        .route("/trading/orders/all", get(trading::all_orders))
        .route("/trading/executions", get(trading::executions))
        .route("/trading/contract/qualify", post(trading::qualify_contract))
        // market data
        .route("/market-data/historical-bars", post(market_data::historical_bars))
        .route("/market-data/realtime-bars", post(market_data::realtime_bars))
        .route("/market-data/market-data", post(market_data::snapshot))
        .route("/market-data/tick-data", post(market_data::tick_data))
        .route("/market-data/market-depth", post(market_data::market_depth))
        .route(
            "/market-data/stream/market-data/{symbol}",
            get(stream::ticker_stream),
        )
        // research and scanner
        .route("/research/contract-details", post(research::contract_details))
        .route("/scanner/scan", post(research::scan))
        .route("/scanner/scanner-parameters", get(research::scanner_parameters))
        // multiplexed stream
        .route("/stream", get(stream::multiplexed_stream));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .merge(health::router(health_state))
}

async fn connection(State(state): State<AppState>) -> Json<ConnectionInfo> {
    Json(state.broker.connection_info())
}

// =============================================================================
// Test Support
// =============================================================================


#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::test_support::{app, send};
    use super::*;

    #[tokio::test]
    async fn connection_reports_session() {
        let (status, body) = send(app(false).await, "GET", "/api/v1/connection", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["port"], 4002);
        assert_eq!(body["client_id"], 1);
    }

    #[tokio::test]
    async fn health_routes_are_mounted() {
        let (status, _) = send(app(false).await, "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn listing_carries_count() {
        let Json(body) = listing("accounts", &["DU1", "DU2"]);
        assert_eq!(body["count"], 2);
        assert_eq!(body["accounts"][1], "DU2");
    }

    #[tokio::test]
    async fn call_maps_timeout() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let broker = Arc::new(crate::infrastructure::broker::SimulatedBroker::new(
            crate::infrastructure::config::BrokerSettings::default(),
            crate::infrastructure::config::SimulatorSettings::default(),
            tx,
        ));
        let state = AppState {
            broker: broker.clone(),
            registry: Arc::new(SubscriptionRegistry::new(broker)),
            request_timeout: Duration::from_millis(10),
            sink_capacity: 1,
            shutdown: CancellationToken::new(),
        };
        let result: ApiResult<()> = state
            .call("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }
}
