//! Market Data Types
//!
//! Request and reply types for historical bars, real-time bars, snapshot
//! tickers, historical ticks and market depth, plus parsing of the broker's
//! bar-size and duration strings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contract::ContractRequest;

// =============================================================================
// Bar Size / Duration
// =============================================================================

/// Accepted bar sizes with their length in seconds.
const BAR_SIZES: &[(&str, u32)] = &[
    ("1 sec", 1),
    ("5 secs", 5),
    ("10 secs", 10),
    ("15 secs", 15),
    ("30 secs", 30),
    ("1 min", 60),
    ("2 mins", 120),
    ("3 mins", 180),
    ("5 mins", 300),
    ("10 mins", 600),
    ("15 mins", 900),
    ("20 mins", 1_200),
    ("30 mins", 1_800),
    ("1 hour", 3_600),
    ("2 hours", 7_200),
    ("3 hours", 10_800),
    ("4 hours", 14_400),
    ("8 hours", 28_800),
    ("1 day", 86_400),
    ("1 week", 604_800),
    ("1 month", 2_592_000),
];

/// Bar size setting such as `"5 mins"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSize {
    label: &'static str,
    seconds: u32,
}

impl BarSize {
    /// Parse a bar size string.
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError::InvalidBarSize`] if the string is not one
    /// of the broker's bar sizes.
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        let normalized = raw.trim().to_ascii_lowercase();
        BAR_SIZES
            .iter()
            .find(|(label, _)| *label == normalized)
            .map(|&(label, seconds)| Self { label, seconds })
            .ok_or_else(|| MarketDataError::InvalidBarSize(raw.to_string()))
    }

    /// Length of one bar in seconds.
    #[must_use]
    pub const fn seconds(self) -> u32 {
        self.seconds
    }

    /// Broker label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.label
    }
}

/// Unit of a duration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    /// Seconds (`S`).
    Seconds,
    /// Days (`D`).
    Days,
    /// Weeks (`W`).
    Weeks,
    /// Months (`M`).
    Months,
    /// Years (`Y`).
    Years,
}

impl DurationUnit {
    const fn code(self) -> char {
        match self {
            Self::Seconds => 'S',
            Self::Days => 'D',
            Self::Weeks => 'W',
            Self::Months => 'M',
            Self::Years => 'Y',
        }
    }

    const fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Days => 86_400,
            Self::Weeks => 604_800,
            Self::Months => 2_592_000,
            Self::Years => 31_536_000,
        }
    }
}

/// Look-back duration such as `"2 W"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarDuration {
    amount: u32,
    unit: DurationUnit,
}

impl BarDuration {
    /// Parse a duration string (`"<n> <S|D|W|M|Y>"`).
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError::InvalidDuration`] if the string is
    /// malformed or the amount is zero.
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        let invalid = || MarketDataError::InvalidDuration(raw.to_string());
        let mut parts = raw.split_whitespace();
        let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        let amount: u32 = amount.parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }

        let unit = match unit.to_ascii_uppercase().as_str() {
            "S" => DurationUnit::Seconds,
            "D" => DurationUnit::Days,
            "W" => DurationUnit::Weeks,
            "M" => DurationUnit::Months,
            "Y" => DurationUnit::Years,
            _ => return Err(invalid()),
        };

        Ok(Self { amount, unit })
    }

    /// Approximate length in seconds (months are 30 days, years 365).
    #[must_use]
    pub const fn approx_seconds(self) -> u64 {
        self.amount as u64 * self.unit.seconds()
    }

    /// Unit of this duration.
    #[must_use]
    pub const fn unit(self) -> DurationUnit {
        self.unit
    }
}

impl fmt::Display for BarDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.code())
    }
}

/// Data series to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhatToShow {
    /// Trade prints.
    #[default]
    Trades,
    /// Bid/ask midpoint.
    Midpoint,
    /// Bid.
    Bid,
    /// Ask.
    Ask,
    /// Bid and ask.
    BidAsk,
    /// Historical volatility.
    HistoricalVolatility,
    /// Option implied volatility.
    OptionImpliedVolatility,
}

/// Market data request validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// Unknown bar size.
    #[error("invalid bar size: {0:?}")]
    InvalidBarSize(String),
    /// Malformed duration.
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
    /// Tick count out of range.
    #[error("number_of_ticks must be between 1 and {max}, got {got}")]
    InvalidTickCount {
        /// Requested count.
        got: u32,
        /// Upper bound.
        max: u32,
    },
}

// =============================================================================
// Requests
// =============================================================================

/// Maximum historical ticks per request.
pub const MAX_TICKS: u32 = 1_000;

/// Historical bar request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarDataRequest {
    /// Contract.
    pub contract: ContractRequest,
    /// Bar size, e.g. `"1 min"`.
    #[serde(default = "default_bar_size")]
    pub bar_size: String,
    /// Look-back duration, e.g. `"1 D"`.
    #[serde(default = "default_duration")]
    pub duration: String,
    /// Data series.
    #[serde(default)]
    pub what_to_show: WhatToShow,
    /// Regular trading hours only.
    #[serde(default = "default_true")]
    pub use_rth: bool,
    /// End of the window; `None` means now.
    #[serde(default)]
    pub end_datetime: Option<DateTime<Utc>>,
}

fn default_bar_size() -> String {
    "1 min".to_string()
}

fn default_duration() -> String {
    "1 D".to_string()
}

const fn default_true() -> bool {
    true
}

/// Validated historical bar query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalBarsQuery {
    /// Bar size.
    pub bar_size: BarSize,
    /// Look-back duration.
    pub duration: BarDuration,
    /// Data series.
    pub what_to_show: WhatToShow,
    /// Regular trading hours only.
    pub use_rth: bool,
    /// End of the window.
    pub end: Option<DateTime<Utc>>,
}

impl BarDataRequest {
    /// Validate the string settings into a query.
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError`] for an unknown bar size or malformed
    /// duration.
    pub fn query(&self) -> Result<HistoricalBarsQuery, MarketDataError> {
        Ok(HistoricalBarsQuery {
            bar_size: BarSize::parse(&self.bar_size)?,
            duration: BarDuration::parse(&self.duration)?,
            what_to_show: self.what_to_show,
            use_rth: self.use_rth,
            end: self.end_datetime,
        })
    }
}

/// Real-time 5-second bar request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeBarsRequest {
    /// Contract.
    pub contract: ContractRequest,
    /// Data series.
    #[serde(default)]
    pub what_to_show: WhatToShow,
    /// Regular trading hours only.
    #[serde(default = "default_true")]
    pub use_rth: bool,
}

/// Snapshot or streaming ticker request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataRequest {
    /// Contract.
    pub contract: ContractRequest,
    /// Comma-separated generic tick ids.
    #[serde(default)]
    pub generic_tick_list: String,
    /// One-shot snapshot.
    #[serde(default)]
    pub snapshot: bool,
    /// Regulatory snapshot (billed).
    #[serde(default)]
    pub regulatory_snapshot: bool,
}

/// Historical tick kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TickType {
    /// Last trades.
    #[default]
    Last,
    /// All trades including odd lots.
    AllLast,
    /// Bid/ask quotes.
    BidAsk,
    /// Midpoints.
    MidPoint,
}

/// Historical tick request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickDataRequest {
    /// Contract.
    pub contract: ContractRequest,
    /// Tick kind.
    #[serde(default)]
    pub tick_type: TickType,
    /// Number of ticks.
    #[serde(default = "default_tick_count")]
    pub number_of_ticks: u32,
    /// Ignore size-only updates.
    #[serde(default)]
    pub ignore_size: bool,
}

const fn default_tick_count() -> u32 {
    100
}

impl TickDataRequest {
    /// Validate the tick count.
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError::InvalidTickCount`] outside `1..=MAX_TICKS`.
    pub const fn validate(&self) -> Result<(), MarketDataError> {
        if self.number_of_ticks == 0 || self.number_of_ticks > MAX_TICKS {
            return Err(MarketDataError::InvalidTickCount {
                got: self.number_of_ticks,
                max: MAX_TICKS,
            });
        }
        Ok(())
    }
}

/// Market depth request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDepthRequest {
    /// Contract.
    pub contract: ContractRequest,
    /// Levels per side.
    #[serde(default = "default_depth_rows")]
    pub num_rows: u32,
}

const fn default_depth_rows() -> u32 {
    5
}

// =============================================================================
// Replies
// =============================================================================

/// Historical bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start.
    pub date: DateTime<Utc>,
    /// Open.
    pub open: f64,
    /// High.
    pub high: f64,
    /// Low.
    pub low: f64,
    /// Close.
    pub close: f64,
    /// Volume.
    pub volume: f64,
    /// Volume-weighted average.
    pub average: f64,
    /// Trade count.
    pub bar_count: u64,
}

/// Real-time 5-second bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeBar {
    /// Bar start.
    pub time: DateTime<Utc>,
    /// Open.
    pub open: f64,
    /// High.
    pub high: f64,
    /// Low.
    pub low: f64,
    /// Close.
    pub close: f64,
    /// Volume.
    pub volume: f64,
    /// Volume-weighted average price.
    pub wap: f64,
    /// Trade count.
    pub count: u64,
}

/// Historical tick; fields not applicable to the tick kind are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Tick time.
    pub time: DateTime<Utc>,
    /// Trade or midpoint price.
    pub price: Option<f64>,
    /// Trade size.
    pub size: Option<f64>,
    /// Bid price.
    pub bid_price: Option<f64>,
    /// Ask price.
    pub ask_price: Option<f64>,
    /// Bid size.
    pub bid_size: Option<f64>,
    /// Ask size.
    pub ask_size: Option<f64>,
}

/// One level of the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Level index, 0 is the top of book.
    pub position: u32,
    /// Price.
    pub price: f64,
    /// Size.
    pub size: f64,
    /// Market maker or exchange.
    pub market_maker: String,
}

/// Order book snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthBook {
    /// Symbol.
    pub symbol: String,
    /// Bid levels, best first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best first.
    pub asks: Vec<DepthLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1 min", 60)]
    #[test_case("5 MINS", 300)]
    #[test_case(" 1 day ", 86_400)]
    #[test_case("1 hour", 3_600)]
    fn bar_size_parses(raw: &str, seconds: u32) {
        assert_eq!(BarSize::parse(raw).unwrap().seconds(), seconds);
    }

    #[test_case("7 mins")]
    #[test_case("")]
    #[test_case("1minute")]
    fn bar_size_rejects(raw: &str) {
        assert_eq!(
            BarSize::parse(raw),
            Err(MarketDataError::InvalidBarSize(raw.to_string()))
        );
    }

    #[test_case("1 D", 86_400)]
    #[test_case("2 W", 1_209_600)]
    #[test_case("3600 S", 3_600)]
    #[test_case("1 y", 31_536_000)]
    fn duration_parses(raw: &str, seconds: u64) {
        assert_eq!(BarDuration::parse(raw).unwrap().approx_seconds(), seconds);
    }

    #[test_case("0 D" ; "zero amount")]
    #[test_case("1" ; "missing unit")]
    #[test_case("1 X" ; "unknown unit")]
    #[test_case("one D" ; "non numeric")]
    #[test_case("1 D extra" ; "trailing token")]
    fn duration_rejects(raw: &str) {
        assert!(BarDuration::parse(raw).is_err());
    }

    #[test]
    fn duration_display_round_trips_label() {
        assert_eq!(BarDuration::parse("2 w").unwrap().to_string(), "2 W");
    }

    #[test]
    fn bar_request_defaults() {
        let req: BarDataRequest =
            serde_json::from_str(r#"{"contract":{"symbol":"AAPL"}}"#).unwrap();
        let query = req.query().unwrap();
        assert_eq!(query.bar_size.as_str(), "1 min");
        assert_eq!(query.duration.unit(), DurationUnit::Days);
        assert_eq!(query.what_to_show, WhatToShow::Trades);
        assert!(query.use_rth);
    }

    #[test]
    fn what_to_show_wire_names() {
        let parsed: WhatToShow = serde_json::from_str("\"BID_ASK\"").unwrap();
        assert_eq!(parsed, WhatToShow::BidAsk);
        assert_eq!(
            serde_json::to_string(&WhatToShow::OptionImpliedVolatility).unwrap(),
            "\"OPTION_IMPLIED_VOLATILITY\""
        );
    }

    #[test]
    fn tick_count_bounds() {
        let mut req = TickDataRequest {
            contract: ContractRequest::stock("AAPL"),
            tick_type: TickType::Last,
            number_of_ticks: 0,
            ignore_size: false,
        };
        assert!(req.validate().is_err());
        req.number_of_ticks = MAX_TICKS;
        assert!(req.validate().is_ok());
        req.number_of_ticks = MAX_TICKS + 1;
        assert!(req.validate().is_err());
    }
}
