//! Market data endpoints.

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use super::{ApiResult, AppState, listing};
use crate::domain::contract::create_contract;
use crate::domain::market_data::{
    BarDataRequest, DepthBook, MarketDataRequest, MarketDepthRequest, RealtimeBarsRequest,
    TickDataRequest,
};
use crate::domain::streaming::TickerUpdate;

pub async fn historical_bars(
    State(state): State<AppState>,
    Json(request): Json<BarDataRequest>,
) -> ApiResult<Json<Value>> {
    let query = request.query()?;
    let contract = create_contract(&request.contract)?;
    let bars = state
        .call("historical_bars", state.broker.historical_bars(&contract, &query))
        .await?;
    tracing::info!(
        symbol = %contract.symbol,
        bar_size = query.bar_size.as_str(),
        duration = %query.duration,
        count = bars.len(),
        "Historical bars served"
    );
    Ok(listing("bars", &bars))
}

pub async fn realtime_bars(
    State(state): State<AppState>,
    Json(request): Json<RealtimeBarsRequest>,
) -> ApiResult<Json<Value>> {
    let contract = create_contract(&request.contract)?;
    let bars = state
        .call(
            "realtime_bars",
            state
                .broker
                .realtime_bars(&contract, request.what_to_show, request.use_rth),
        )
        .await?;
    Ok(listing("bars", &bars))
}

pub async fn snapshot(
    State(state): State<AppState>,
    Json(request): Json<MarketDataRequest>,
) -> ApiResult<Json<TickerUpdate>> {
    let contract = create_contract(&request.contract)?;
    let ticker = state
        .call("ticker_snapshot", state.broker.ticker_snapshot(&contract))
        .await?;
    Ok(Json(ticker))
}

pub async fn tick_data(
    State(state): State<AppState>,
    Json(request): Json<TickDataRequest>,
) -> ApiResult<Json<Value>> {
    request.validate()?;
    let contract = create_contract(&request.contract)?;
    let ticks = state
        .call(
            "historical_ticks",
            state
                .broker
                .historical_ticks(&contract, request.tick_type, request.number_of_ticks),
        )
        .await?;
    Ok(listing("ticks", &ticks))
}

pub async fn market_depth(
    State(state): State<AppState>,
    Json(request): Json<MarketDepthRequest>,
) -> ApiResult<Json<DepthBook>> {
    let contract = create_contract(&request.contract)?;
    let book = state
        .call(
            "market_depth",
            state.broker.market_depth(&contract, request.num_rows),
        )
        .await?;
    Ok(Json(book))
}
