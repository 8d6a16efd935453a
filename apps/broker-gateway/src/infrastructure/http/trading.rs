//! Order management endpoints.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::{ApiError, ApiResult, AppState, listing};
use crate::domain::contract::{Contract, ContractRequest, create_contract};
use crate::domain::order::{OrderCancelRequest, OrderRequest, build_order};

/// Build and qualify a contract, taking the first match.
pub(super) async fn qualified(state: &AppState, request: &ContractRequest) -> ApiResult<Contract> {
    let contract = create_contract(request)?;
    state
        .call("qualify_contract", state.broker.qualify_contract(&contract))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("Contract not found".to_string()))
}

pub async fn place_order(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<Value>> {
    let order = build_order(&request)?;
    let contract = qualified(&state, &request.contract).await?;
    let trade = state
        .call("place_order", state.broker.place_order(&contract, &order))
        .await?;
    Ok(Json(json!({
        "order_id": trade.order_id,
        "status": trade.status,
    })))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Json(request): Json<OrderCancelRequest>,
) -> ApiResult<Json<Value>> {
    let trade = state
        .call("cancel_order", state.broker.cancel_order(request.order_id))
        .await?;
    Ok(Json(json!({
        "order_id": trade.order_id,
        "status": trade.status,
    })))
}

pub async fn open_orders(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let trades = state.call("open_trades", state.broker.open_trades()).await?;
    Ok(listing("orders", &trades))
}

pub async fn all_orders(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let trades = state.call("trades", state.broker.trades()).await?;
    Ok(listing("orders", &trades))
}

pub async fn executions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let fills = state.call("fills", state.broker.fills()).await?;
    Ok(listing("executions", &fills))
}

pub async fn qualify_contract(
    State(state): State<AppState>,
    Json(request): Json<ContractRequest>,
) -> ApiResult<Json<Value>> {
    let contract = create_contract(&request)?;
    let contracts = state
        .call("qualify_contract", state.broker.qualify_contract(&contract))
        .await?;
    if contracts.is_empty() {
        return Err(ApiError::NotFound("Contract not found".to_string()));
    }
    Ok(listing("contracts", &contracts))
}
