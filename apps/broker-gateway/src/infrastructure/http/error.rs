//! HTTP error mapping.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::ports::BrokerError;
use crate::domain::contract::ContractError;
use crate::domain::market_data::MarketDataError;
use crate::domain::order::OrderError;

/// Error returned by REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The contract description is invalid.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// The order description is invalid.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A market data setting is invalid.
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    /// The Broker Session failed the call.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Nothing matched the request.
    #[error("{0}")]
    NotFound(String),

    /// The request was understood but yields no usable result.
    #[error("{0}")]
    BadRequest(String),

    /// The broker did not answer in time.
    #[error("broker request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Contract(ContractError::UnsupportedSecType(_))
            | Self::Order(OrderError::UnsupportedOrderType(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Contract(_) | Self::Order(_) | Self::MarketData(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::NotFound(_) | Self::Broker(BrokerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Broker(BrokerError::ReadOnly) => StatusCode::FORBIDDEN,
            Self::Broker(BrokerError::NotConnected) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Broker(BrokerError::Rejected { .. } | BrokerError::Internal { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Contract(ContractError::UnsupportedSecType(_)) => "UNSUPPORTED_SEC_TYPE",
            Self::Contract(_) => "INVALID_CONTRACT",
            Self::Order(OrderError::UnsupportedOrderType(_)) => "UNSUPPORTED_ORDER_TYPE",
            Self::Order(_) => "INVALID_ORDER",
            Self::MarketData(_) => "INVALID_MARKET_DATA_REQUEST",
            Self::Broker(BrokerError::NotConnected) => "BROKER_UNAVAILABLE",
            Self::Broker(BrokerError::ReadOnly) => "READ_ONLY",
            Self::Broker(BrokerError::NotFound { .. }) | Self::NotFound(_) => "NOT_FOUND",
            Self::Broker(BrokerError::Rejected { .. }) => "BROKER_REJECTED",
            Self::Broker(BrokerError::Internal { .. }) => "BROKER_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "detail": self.to_string(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}

/// Result type for REST handlers.
pub type ApiResult<T> = Result<T, ApiError>;
