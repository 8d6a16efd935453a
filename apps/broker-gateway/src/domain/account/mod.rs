//! Account Types
//!
//! Account values, positions and portfolio items as reported by the broker,
//! and the shaping applied to them for the account endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::contract::Contract;

/// Tags kept in the account summary.
pub const SUMMARY_TAGS: &[&str] = &[
    "NetLiquidation",
    "TotalCashValue",
    "SettledCash",
    "AccruedCash",
    "BuyingPower",
    "EquityWithLoanValue",
    "PreviousDayEquityWithLoanValue",
    "GrossPositionValue",
    "RegTEquity",
    "RegTMargin",
    "SMA",
    "InitMarginReq",
    "MaintMarginReq",
    "AvailableFunds",
    "ExcessLiquidity",
    "Cushion",
    "FullInitMarginReq",
    "FullMaintMarginReq",
    "FullAvailableFunds",
    "FullExcessLiquidity",
    "LookAheadNextChange",
    "DayTradesRemaining",
];

/// One tagged account value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountValue {
    /// Account id.
    pub account: String,
    /// Tag, e.g. `NetLiquidation`.
    pub tag: String,
    /// Value as reported (the broker sends strings).
    pub value: String,
    /// Currency, empty for unitless tags.
    pub currency: String,
}

/// Value entry without its tag, as returned by the summary and values
/// endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedValue {
    /// Value.
    pub value: String,
    /// Currency.
    pub currency: String,
    /// Account id.
    pub account: String,
}

impl From<&AccountValue> for TaggedValue {
    fn from(av: &AccountValue) -> Self {
        Self {
            value: av.value.clone(),
            currency: av.currency.clone(),
            account: av.account.clone(),
        }
    }
}

/// Keep only summary tags, one entry per tag.
///
/// When a tag is reported in several currencies the `BASE` entry wins,
/// otherwise the last one seen.
#[must_use]
pub fn summarize(values: &[AccountValue]) -> BTreeMap<String, TaggedValue> {
    let mut summary: BTreeMap<String, TaggedValue> = BTreeMap::new();
    for av in values.iter().filter(|av| SUMMARY_TAGS.contains(&av.tag.as_str())) {
        let keep_existing = summary
            .get(&av.tag)
            .is_some_and(|existing| existing.currency == "BASE");
        if !keep_existing {
            summary.insert(av.tag.clone(), av.into());
        }
    }
    summary
}

/// Group every value by tag, preserving report order within a tag.
#[must_use]
pub fn group_by_tag(values: &[AccountValue]) -> BTreeMap<String, Vec<TaggedValue>> {
    let mut grouped: BTreeMap<String, Vec<TaggedValue>> = BTreeMap::new();
    for av in values {
        grouped.entry(av.tag.clone()).or_default().push(av.into());
    }
    grouped
}

/// Open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Account id.
    pub account: String,
    /// Contract held.
    pub contract: Contract,
    /// Signed quantity.
    pub position: f64,
    /// Average cost per unit.
    pub avg_cost: f64,
}

/// Position enriched with market value and PnL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    /// Account id.
    pub account: String,
    /// Contract held.
    pub contract: Contract,
    /// Signed quantity.
    pub position: f64,
    /// Current market price.
    pub market_price: f64,
    /// Position times market price.
    pub market_value: f64,
    /// Average cost per unit.
    pub average_cost: f64,
    /// Unrealised PnL.
    pub unrealized_pnl: f64,
    /// Realised PnL.
    pub realized_pnl: f64,
}
