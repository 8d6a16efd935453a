//! Scanner and Research Types

use serde::{Deserialize, Serialize};

use crate::domain::contract::Contract;

/// Market scanner request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerRequest {
    /// Instrument class, e.g. `STK`.
    #[serde(default = "default_instrument")]
    pub instrument: String,
    /// Location, e.g. `STK.US.MAJOR`.
    #[serde(default = "default_location")]
    pub location_code: String,
    /// Scan code, e.g. `TOP_PERC_GAIN`.
    #[serde(default = "default_scan_code")]
    pub scan_code: String,
    /// Minimum price.
    #[serde(default)]
    pub above_price: Option<f64>,
    /// Maximum price.
    #[serde(default)]
    pub below_price: Option<f64>,
    /// Minimum volume.
    #[serde(default)]
    pub above_volume: Option<u64>,
    /// Minimum market cap.
    #[serde(default)]
    pub market_cap_above: Option<f64>,
    /// Maximum market cap.
    #[serde(default)]
    pub market_cap_below: Option<f64>,
    /// Rows to return.
    #[serde(default = "default_rows")]
    pub number_of_rows: u32,
}

fn default_instrument() -> String {
    "STK".to_string()
}

fn default_location() -> String {
    "STK.US.MAJOR".to_string()
}

fn default_scan_code() -> String {
    "TOP_PERC_GAIN".to_string()
}

const fn default_rows() -> u32 {
    50
}

impl ScannerRequest {
    /// Whether a price and volume pass the request's filters.
    #[must_use]
    pub fn accepts(&self, price: f64, volume: u64) -> bool {
        self.above_price.is_none_or(|min| price >= min)
            && self.below_price.is_none_or(|max| price <= max)
            && self.above_volume.is_none_or(|min| volume >= min)
    }
}

/// One scanner hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Rank, 0 is the best match.
    pub rank: u32,
    /// Contract.
    pub contract: Contract,
    /// Distance.
    pub distance: String,
    /// Benchmark.
    pub benchmark: String,
    /// Projection.
    pub projection: String,
    /// Combo legs description.
    pub legs: String,
}

/// Contract details as returned by research lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    /// Qualified contract.
    pub contract: Contract,
    /// Market name.
    pub market_name: String,
    /// Minimum price increment.
    pub min_tick: f64,
    /// Long company or instrument name.
    pub long_name: String,
    /// Industry classification.
    pub industry: String,
    /// Trading hours description.
    pub trading_hours: String,
    /// Time zone of the listing exchange.
    pub time_zone_id: String,
    /// Valid exchanges, comma separated.
    pub valid_exchanges: String,
    /// Supported order types, comma separated.
    pub order_types: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_body() {
        let req: ScannerRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.scan_code, "TOP_PERC_GAIN");
        assert_eq!(req.location_code, "STK.US.MAJOR");
        assert_eq!(req.number_of_rows, 50);
    }

    #[test]
    fn filters_apply() {
        let req = ScannerRequest {
            above_price: Some(10.0),
            below_price: Some(100.0),
            above_volume: Some(1_000),
            ..serde_json::from_str("{}").unwrap()
        };
        assert!(req.accepts(50.0, 5_000));
        assert!(!req.accepts(5.0, 5_000));
        assert!(!req.accepts(150.0, 5_000));
        assert!(!req.accepts(50.0, 10));
    }
}
