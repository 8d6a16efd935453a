//! Account and portfolio endpoints.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiResult, AppState, listing};
use crate::domain::account::{group_by_tag, summarize};

/// Optional `?account=` filter.
#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    account: Option<String>,
}

impl AccountQuery {
    async fn resolve(self, state: &AppState) -> ApiResult<String> {
        match self.account {
            Some(account) => Ok(account),
            None => state.default_account().await,
        }
    }
}

pub async fn managed_accounts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let accounts = state
        .call("managed_accounts", state.broker.managed_accounts())
        .await?;
    Ok(listing("accounts", &accounts))
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<Value>> {
    let account = query.resolve(&state).await?;
    let values = state
        .call("account_values", state.broker.account_values(&account))
        .await?;
    Ok(Json(json!({
        "account": account,
        "summary": summarize(&values),
    })))
}

pub async fn values(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<Value>> {
    let account = query.resolve(&state).await?;
    let values = state
        .call("account_values", state.broker.account_values(&account))
        .await?;
    Ok(Json(json!({
        "account": account,
        "values": group_by_tag(&values),
    })))
}

pub async fn positions(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<Value>> {
    let positions = state
        .call("positions", state.broker.positions(query.account.as_deref()))
        .await?;
    Ok(listing("positions", &positions))
}

pub async fn portfolio(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<Value>> {
    let items = state
        .call("portfolio", state.broker.portfolio(query.account.as_deref()))
        .await?;
    Ok(listing("portfolio", &items))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{app, send};

    #[tokio::test]
    async fn lists_managed_accounts() {
        let (status, body) =
            send(app(false).await, "GET", "/api/v1/account/managed-accounts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"accounts": ["DU123456"], "count": 1}));
    }

    #[tokio::test]
    async fn summary_defaults_to_first_account() {
        let (status, body) = send(app(false).await, "GET", "/api/v1/account/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account"], "DU123456");
        let summary = body["summary"].as_object().unwrap();
        assert_eq!(summary.len(), crate::domain::account::SUMMARY_TAGS.len());
        assert!(!summary.contains_key("AccountType"));
        assert_eq!(summary["NetLiquidation"]["currency"], "USD");
    }

    #[tokio::test]
    async fn values_group_every_tag() {
        let (status, body) = send(
            app(false).await,
            "GET",
            "/api/v1/account/values?account=DU123456",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["values"]["CashBalance"].as_array().unwrap().len(), 2);
        assert!(body["values"]["AccountType"].is_array());
    }

    #[tokio::test]
    async fn unknown_account_is_a_broker_error() {
        let (status, body) = send(
            app(false).await,
            "GET",
            "/api/v1/account/summary?account=U999",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "BROKER_REJECTED");
    }

    #[tokio::test]
    async fn empty_book_has_no_positions() {
        let (status, body) = send(app(false).await, "GET", "/api/v1/account/positions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        let (_, body) = send(app(false).await, "GET", "/api/v1/account/portfolio", None).await;
        assert_eq!(body["portfolio"], json!([]));
    }
}
