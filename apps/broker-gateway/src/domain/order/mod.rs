//! Order Types
//!
//! Order requests, the validated order handed to the broker, and the trade
//! and execution records the broker reports back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::contract::{Contract, ContractRequest};

/// Broker-assigned order id.
pub type OrderId = i64;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl OrderAction {
    /// Signed direction: `+1` for buys, `-1` for sells.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Market.
    #[serde(rename = "MKT")]
    Market,
    /// Limit.
    #[serde(rename = "LMT")]
    Limit,
    /// Stop.
    #[serde(rename = "STP")]
    Stop,
    /// Stop limit.
    #[serde(rename = "STP LMT")]
    StopLimit,
    /// Trailing stop.
    #[serde(rename = "TRAIL")]
    TrailingStop,
}

impl OrderType {
    /// Broker code for this order type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MKT",
            Self::Limit => "LMT",
            Self::Stop => "STP",
            Self::StopLimit => "STP LMT",
            Self::TrailingStop => "TRAIL",
        }
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Day order.
    #[default]
    Day,
    /// Good till cancelled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Good till date.
    Gtd,
}

/// Order placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Contract to trade.
    pub contract: ContractRequest,
    /// Side.
    pub action: OrderAction,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price (LMT, STP LMT).
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Stop trigger price (STP, STP LMT).
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Allocation account.
    #[serde(default)]
    pub account: Option<String>,
    /// Transmit immediately.
    #[serde(default = "default_transmit")]
    pub transmit: bool,
    /// Parent order id for bracket children.
    #[serde(default)]
    pub parent_id: Option<OrderId>,
    /// One-cancels-all group.
    #[serde(default)]
    pub oca_group: Option<String>,
}

const fn default_transmit() -> bool {
    true
}

/// Order cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelRequest {
    /// Order to cancel.
    pub order_id: OrderId,
}

/// Validated order ready for the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Side.
    pub action: OrderAction,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity (positive).
    pub total_quantity: Decimal,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Stop trigger price.
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Allocation account.
    pub account: Option<String>,
    /// Transmit immediately.
    pub transmit: bool,
    /// Parent order id.
    pub parent_id: Option<OrderId>,
    /// One-cancels-all group.
    pub oca_group: Option<String>,
}

/// Validate an order request into an [`Order`].
///
/// # Errors
///
/// Returns [`OrderError`] if the quantity is not positive, prices required
/// by the order type are missing or not positive, or the order type is not
/// supported.
pub fn build_order(request: &OrderRequest) -> Result<Order, OrderError> {
    if request.quantity <= Decimal::ZERO {
        return Err(OrderError::NonPositiveQuantity(request.quantity));
    }

    let (needs_limit, needs_stop) = match request.order_type {
        OrderType::Market => (false, false),
        OrderType::Limit => (true, false),
        OrderType::Stop => (false, true),
        OrderType::StopLimit => (true, true),
        OrderType::TrailingStop => return Err(OrderError::UnsupportedOrderType(request.order_type)),
    };

    let limit_price = required_price(needs_limit, request.limit_price, "limit_price")?;
    let stop_price = required_price(needs_stop, request.stop_price, "stop_price")?;

    Ok(Order {
        action: request.action,
        order_type: request.order_type,
        total_quantity: request.quantity,
        limit_price,
        stop_price,
        time_in_force: request.time_in_force,
        account: request.account.clone(),
        transmit: request.transmit,
        parent_id: request.parent_id,
        oca_group: request.oca_group.clone(),
    })
}

fn required_price(
    needed: bool,
    price: Option<Decimal>,
    field: &'static str,
) -> Result<Option<Decimal>, OrderError> {
    if !needed {
        return Ok(None);
    }
    match price {
        None => Err(OrderError::MissingPrice(field)),
        Some(p) if p <= Decimal::ZERO => Err(OrderError::NonPositivePrice { field, price: p }),
        Some(p) => Ok(Some(p)),
    }
}

/// Order request validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// Quantity is zero or negative.
    #[error("order quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),
    /// A price required by the order type is missing.
    #[error("{0} is required for this order type")]
    MissingPrice(&'static str),
    /// A price is zero or negative.
    #[error("{field} must be positive, got {price}")]
    NonPositivePrice {
        /// Field name.
        field: &'static str,
        /// Offending price.
        price: Decimal,
    },
    /// The order type is not accepted by the gateway.
    #[error("unsupported order type: {}", .0.as_str())]
    UnsupportedOrderType(OrderType),
}

/// Order status as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted locally, not yet at the broker.
    PendingSubmit,
    /// Cancel requested, not yet confirmed.
    PendingCancel,
    /// Held by the broker until conditions trigger.
    PreSubmitted,
    /// Working at the exchange.
    Submitted,
    /// Cancelled.
    Cancelled,
    /// Completely filled.
    Filled,
    /// Inactive (rejected or held).
    Inactive,
}

impl OrderStatus {
    /// Whether the order can still fill or be cancelled.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(
            self,
            Self::PendingSubmit | Self::PendingCancel | Self::PreSubmitted | Self::Submitted
        )
    }
}

/// An order together with its broker-side state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Order id.
    pub order_id: OrderId,
    /// Permanent id.
    pub perm_id: i64,
    /// Client id of the session that placed the order.
    pub client_id: i32,
    /// Qualified contract.
    pub contract: Contract,
    /// The order.
    pub order: Order,
    /// Current status.
    pub status: OrderStatus,
    /// Filled quantity.
    pub filled: Decimal,
    /// Remaining quantity.
    pub remaining: Decimal,
    /// Average fill price.
    pub avg_fill_price: Decimal,
    /// Last fill price.
    pub last_fill_price: Decimal,
    /// Reason the order is held, if any.
    pub why_held: String,
}

/// Execution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Execution id.
    pub exec_id: String,
    /// Execution time.
    pub time: DateTime<Utc>,
    /// Account.
    pub account: String,
    /// Symbol.
    pub symbol: String,
    /// Security type code.
    pub sec_type: String,
    /// `BOT` or `SLD`.
    pub side: String,
    /// Executed quantity.
    pub shares: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Permanent id of the order.
    pub perm_id: i64,
    /// Client id of the session.
    pub client_id: i32,
    /// Order id.
    pub order_id: OrderId,
    /// Cumulative filled quantity.
    pub cum_qty: Decimal,
    /// Average price across fills.
    pub avg_price: Decimal,
    /// Commission charged.
    pub commission: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn request(order_type: OrderType) -> OrderRequest {
        OrderRequest {
            contract: ContractRequest::stock("AAPL"),
            action: OrderAction::Buy,
            order_type,
            quantity: Decimal::new(10, 0),
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            account: None,
            transmit: true,
            parent_id: None,
            oca_group: None,
        }
    }

    #[test]
    fn market_order_needs_no_prices() {
        let order = build_order(&request(OrderType::Market)).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert!(order.limit_price.is_none());
    }

    #[test]
    fn limit_order_needs_limit_price() {
        assert_eq!(
            build_order(&request(OrderType::Limit)),
            Err(OrderError::MissingPrice("limit_price"))
        );

        let req = OrderRequest {
            limit_price: Some(Decimal::new(15025, 2)),
            ..request(OrderType::Limit)
        };
        assert_eq!(
            build_order(&req).unwrap().limit_price,
            Some(Decimal::new(15025, 2))
        );
    }

    #[test]
    fn stop_limit_needs_both_prices() {
        let req = OrderRequest {
            limit_price: Some(Decimal::new(150, 0)),
            ..request(OrderType::StopLimit)
        };
        assert_eq!(build_order(&req), Err(OrderError::MissingPrice("stop_price")));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let req = OrderRequest {
            quantity: Decimal::ZERO,
            ..request(OrderType::Market)
        };
        assert!(matches!(
            build_order(&req),
            Err(OrderError::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn rejects_trailing_stop() {
        assert_eq!(
            build_order(&request(OrderType::TrailingStop)),
            Err(OrderError::UnsupportedOrderType(OrderType::TrailingStop))
        );
    }

    #[test]
    fn order_request_json_defaults() {
        let req: OrderRequest = serde_json::from_str(
            r#"{"contract":{"symbol":"AAPL"},"action":"BUY","order_type":"STP LMT","quantity":"5"}"#,
        )
        .unwrap();
        assert_eq!(req.order_type, OrderType::StopLimit);
        assert_eq!(req.time_in_force, TimeInForce::Day);
        assert!(req.transmit);
    }

    #[test]
    fn open_statuses() {
        assert!(OrderStatus::Submitted.is_open());
        assert!(!OrderStatus::Filled.is_open());
        assert!(!OrderStatus::Cancelled.is_open());
    }
}
