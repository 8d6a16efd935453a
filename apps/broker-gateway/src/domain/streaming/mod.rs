//! Streaming Message Types
//!
//! Frames pushed to streaming clients. These are the canonical internal
//! representation of upstream updates; the WebSocket layer serialises them
//! as JSON text frames unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::subscription::{ResourceKey, StreamChannel};

/// Real-time ticker state for one symbol.
///
/// Fields the broker has not reported yet are `None` and serialise as
/// `null`, so every frame carries the full field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerUpdate {
    /// Ticker symbol.
    pub symbol: String,
    /// Best bid.
    pub bid: Option<f64>,
    /// Best ask.
    pub ask: Option<f64>,
    /// Last trade price.
    pub last: Option<f64>,
    /// Size at the best bid.
    pub bid_size: Option<f64>,
    /// Size at the best ask.
    pub ask_size: Option<f64>,
    /// Size of the last trade.
    pub last_size: Option<f64>,
    /// Session volume.
    pub volume: Option<f64>,
    /// Session high.
    pub high: Option<f64>,
    /// Session low.
    pub low: Option<f64>,
    /// Previous close.
    pub close: Option<f64>,
    /// Session open.
    pub open: Option<f64>,
    /// Trading halted indicator.
    pub halted: Option<f64>,
    /// Time of the update.
    pub time: DateTime<Utc>,
}

impl TickerUpdate {
    /// Empty ticker for a symbol.
    #[must_use]
    pub fn empty(symbol: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            bid: None,
            ask: None,
            last: None,
            bid_size: None,
            ask_size: None,
            last_size: None,
            volume: None,
            high: None,
            low: None,
            close: None,
            open: None,
            halted: None,
            time,
        }
    }

    /// Midpoint of bid and ask, when both sides are present.
    #[must_use]
    pub fn midpoint(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

/// Real-time profit and loss for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlUpdate {
    /// Account id.
    pub account: String,
    /// Profit and loss since the start of the day.
    pub daily_pnl: f64,
    /// Unrealised profit and loss of open positions.
    pub unrealized_pnl: f64,
    /// Realised profit and loss of closed positions.
    pub realized_pnl: f64,
    /// Time of the update.
    pub time: DateTime<Utc>,
}

/// A message pushed to a streaming client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamMessage {
    /// Ticker update.
    Ticker(TickerUpdate),
    /// PnL update.
    Pnl(PnlUpdate),
}

impl StreamMessage {
    /// Channel this message belongs to.
    #[must_use]
    pub const fn channel(&self) -> StreamChannel {
        match self {
            Self::Ticker(_) => StreamChannel::Ticker,
            Self::Pnl(_) => StreamChannel::Pnl,
        }
    }

    /// Whether this message is an update for `key`.
    #[must_use]
    pub fn is_for(&self, key: &ResourceKey) -> bool {
        match (self, key) {
            (Self::Ticker(t), ResourceKey::Ticker(symbol)) => &t.symbol == symbol,
            (Self::Pnl(p), ResourceKey::Pnl(account)) => &p.account == account,
            _ => false,
        }
    }
}

/// Terminal error frame sent before a stream is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Human-readable error.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
}

impl ErrorFrame {
    /// Create an error frame.
    #[must_use]
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}
