//! Broker Port (Driven Port)
//!
//! Request/response interface to the Broker Session. Contract
//! qualification, order routing and data pulls are owned by the broker; the
//! gateway only forwards validated requests and reshapes the replies.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::account::{AccountValue, PortfolioItem, Position};
use crate::domain::contract::Contract;
use crate::domain::market_data::{
    Bar, DepthBook, HistoricalBarsQuery, RealtimeBar, Tick, TickType, WhatToShow,
};
use crate::domain::order::{Fill, Order, OrderId, Trade};
use crate::domain::scanner::{ContractDetails, ScanResult, ScannerRequest};
use crate::domain::streaming::TickerUpdate;

/// Broker error code for an unknown contract.
pub const NO_SECURITY_DEFINITION: i32 = 200;

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The session is not connected.
    #[error("broker session not connected")]
    NotConnected,

    /// The broker rejected the request.
    #[error("Error {code}: {message}")]
    Rejected {
        /// Broker error code.
        code: i32,
        /// Error text.
        message: String,
    },

    /// Nothing matched the request.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The session is read-only.
    #[error("session is read-only, order placement is disabled")]
    ReadOnly,

    /// Unexpected broker failure.
    #[error("broker error: {message}")]
    Internal {
        /// Error details.
        message: String,
    },
}

impl BrokerError {
    /// Rejection with the unknown-contract code.
    #[must_use]
    pub fn no_security_definition(symbol: &str) -> Self {
        Self::Rejected {
            code: NO_SECURITY_DEFINITION,
            message: format!("No security definition has been found for the request: {symbol}"),
        }
    }
}

/// Session endpoint details reported by the connection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Whether the session is connected.
    pub connected: bool,
    /// Client id of this session.
    pub client_id: i32,
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
}

/// Port for request/response broker calls.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Session endpoint and connection state.
    fn connection_info(&self) -> ConnectionInfo;

    // ---- Account ----

    /// Accounts managed by this session.
    async fn managed_accounts(&self) -> Result<Vec<String>, BrokerError>;

    /// All tagged values of an account.
    async fn account_values(&self, account: &str) -> Result<Vec<AccountValue>, BrokerError>;

    /// Positions, optionally limited to one account.
    async fn positions(&self, account: Option<&str>) -> Result<Vec<Position>, BrokerError>;

    /// Portfolio items, optionally limited to one account.
    async fn portfolio(&self, account: Option<&str>) -> Result<Vec<PortfolioItem>, BrokerError>;

    // ---- Trading ----

    /// Resolve a contract. Returns an empty list when nothing matches.
    async fn qualify_contract(&self, contract: &Contract) -> Result<Vec<Contract>, BrokerError>;

    /// Place an order on a qualified contract.
    async fn place_order(&self, contract: &Contract, order: &Order) -> Result<Trade, BrokerError>;

    /// Cancel an open order.
    async fn cancel_order(&self, order_id: OrderId) -> Result<Trade, BrokerError>;

    /// Trades whose order is still open.
    async fn open_trades(&self) -> Result<Vec<Trade>, BrokerError>;

    /// All trades of the session.
    async fn trades(&self) -> Result<Vec<Trade>, BrokerError>;

    /// Executions of the session.
    async fn fills(&self) -> Result<Vec<Fill>, BrokerError>;

    // ---- Market data ----

    /// Historical bars.
    async fn historical_bars(
        &self,
        contract: &Contract,
        query: &HistoricalBarsQuery,
    ) -> Result<Vec<Bar>, BrokerError>;

    /// Most recent 5-second bars.
    async fn realtime_bars(
        &self,
        contract: &Contract,
        what_to_show: WhatToShow,
        use_rth: bool,
    ) -> Result<Vec<RealtimeBar>, BrokerError>;

    /// Current ticker snapshot.
    async fn ticker_snapshot(&self, contract: &Contract) -> Result<TickerUpdate, BrokerError>;

    /// Historical ticks, most recent last.
    async fn historical_ticks(
        &self,
        contract: &Contract,
        tick_type: TickType,
        count: u32,
    ) -> Result<Vec<Tick>, BrokerError>;

    /// Order book snapshot.
    async fn market_depth(&self, contract: &Contract, rows: u32)
    -> Result<DepthBook, BrokerError>;

    // ---- Research / scanner ----

    /// Contract details. Returns an empty list when nothing matches.
    async fn contract_details(
        &self,
        contract: &Contract,
    ) -> Result<Vec<ContractDetails>, BrokerError>;

    /// Run a market scan.
    async fn scan(&self, request: &ScannerRequest) -> Result<Vec<ScanResult>, BrokerError>;

    /// Scanner parameter document (XML).
    async fn scanner_parameters(&self) -> Result<String, BrokerError>;
}

/// Shared broker handle.
pub type SharedBroker = Arc<dyn BrokerPort>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_security_definition_code() {
        let err = BrokerError::no_security_definition("XYZ");
        assert!(matches!(err, BrokerError::Rejected { code: 200, .. }));
        assert!(err.to_string().starts_with("Error 200:"));
        assert!(err.to_string().contains("XYZ"));
    }
}
