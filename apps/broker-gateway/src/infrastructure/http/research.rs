//! Contract research and market scanner endpoints.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::{ApiError, ApiResult, AppState, listing};
use crate::domain::contract::{ContractRequest, create_contract};
use crate::domain::scanner::ScannerRequest;

pub async fn contract_details(
    State(state): State<AppState>,
    Json(request): Json<ContractRequest>,
) -> ApiResult<Json<Value>> {
    let contract = create_contract(&request)?;
    let details = state
        .call("contract_details", state.broker.contract_details(&contract))
        .await?;
    if details.is_empty() {
        return Err(ApiError::NotFound("Contract details not found".to_string()));
    }
    Ok(listing("details", &details))
}

pub async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScannerRequest>,
) -> ApiResult<Json<Value>> {
    let results = state.call("scan", state.broker.scan(&request)).await?;
    if results.is_empty() {
        return Err(ApiError::BadRequest(
            "Scanner request failed - invalid parameters or no results".to_string(),
        ));
    }
    tracing::debug!(scan_code = %request.scan_code, rows = results.len(), "Scan complete");
    Ok(listing("results", &results))
}

pub async fn scanner_parameters(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let parameters = state
        .call("scanner_parameters", state.broker.scanner_parameters())
        .await?;
    Ok(Json(json!({ "parameters": parameters })))
}
