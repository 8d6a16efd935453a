//! Instrument reference data for the simulated broker.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::domain::contract::{Contract, SecType};
use crate::domain::scanner::ContractDetails;

/// Reference data for one listed instrument.
#[derive(Debug, Clone, Copy)]
pub struct Instrument {
    pub symbol: &'static str,
    pub con_id: i64,
    pub sec_type: SecType,
    pub currency: &'static str,
    pub primary_exchange: &'static str,
    pub base_price: f64,
    pub min_tick: f64,
    pub long_name: &'static str,
    pub industry: &'static str,
}

const US_HOURS: &str = "20250101:0930-20250101:1600";

pub const INSTRUMENTS: &[Instrument] = &[
    Instrument {
        symbol: "AAPL",
        con_id: 265_598,
        sec_type: SecType::Stock,
        currency: "USD",
        primary_exchange: "NASDAQ",
        base_price: 190.0,
        min_tick: 0.01,
        long_name: "APPLE INC",
        industry: "Technology",
    },
    Instrument {
        symbol: "MSFT",
        con_id: 272_093,
        sec_type: SecType::Stock,
        currency: "USD",
        primary_exchange: "NASDAQ",
        base_price: 410.0,
        min_tick: 0.01,
        long_name: "MICROSOFT CORP",
        industry: "Technology",
    },
    Instrument {
        symbol: "GOOG",
        con_id: 208_813_720,
        sec_type: SecType::Stock,
        currency: "USD",
        primary_exchange: "NASDAQ",
        base_price: 170.0,
        min_tick: 0.01,
        long_name: "ALPHABET INC-CL C",
        industry: "Communications",
    },
    Instrument {
        symbol: "TSLA",
        con_id: 76_792_991,
        sec_type: SecType::Stock,
        currency: "USD",
        primary_exchange: "NASDAQ",
        base_price: 240.0,
        min_tick: 0.01,
        long_name: "TESLA INC",
        industry: "Consumer, Cyclical",
    },
    Instrument {
        symbol: "NVDA",
        con_id: 4_815_747,
        sec_type: SecType::Stock,
        currency: "USD",
        primary_exchange: "NASDAQ",
        base_price: 120.0,
        min_tick: 0.01,
        long_name: "NVIDIA CORP",
        industry: "Technology",
    },
    Instrument {
        symbol: "SPY",
        con_id: 756_733,
        sec_type: SecType::Stock,
        currency: "USD",
        primary_exchange: "ARCA",
        base_price: 520.0,
        min_tick: 0.01,
        long_name: "SPDR S&P 500 ETF TRUST",
        industry: "Funds",
    },
    Instrument {
        symbol: "EUR",
        con_id: 12_087_792,
        sec_type: SecType::Forex,
        currency: "USD",
        primary_exchange: "IDEALPRO",
        base_price: 1.08,
        min_tick: 0.000_05,
        long_name: "European Monetary Union Euro",
        industry: "Currency",
    },
];

impl Instrument {
    /// Symbol the instrument streams under.
    pub fn stream_symbol(&self) -> String {
        match self.sec_type {
            SecType::Forex => format!("{}{}", self.symbol, self.currency),
            _ => self.symbol.to_string(),
        }
    }

    /// Fully qualified contract.
    pub fn contract(&self) -> Contract {
        Contract {
            con_id: self.con_id,
            symbol: self.symbol.to_string(),
            sec_type: self.sec_type,
            exchange: match self.sec_type {
                SecType::Forex => "IDEALPRO".to_string(),
                _ => "SMART".to_string(),
            },
            primary_exchange: Some(self.primary_exchange.to_string()),
            currency: self.currency.to_string(),
            local_symbol: match self.sec_type {
                SecType::Forex => format!("{}.{}", self.symbol, self.currency),
                _ => self.symbol.to_string(),
            },
            last_trade_date: None,
            strike: None,
            right: None,
            multiplier: None,
        }
    }

    /// Contract details record.
    pub fn details(&self, contract: Contract) -> ContractDetails {
        let (valid_exchanges, order_types) = match self.sec_type {
            SecType::Forex => ("IDEALPRO", "LMT,MKT,STP,STP LMT"),
            SecType::Option => ("SMART,CBOE,ISE,AMEX", "LMT,MKT,STP,STP LMT"),
            _ => ("SMART,NASDAQ,NYSE,ARCA,BATS,IEX", "LMT,MKT,STP,STP LMT,TRAIL"),
        };
        ContractDetails {
            market_name: contract.symbol.clone(),
            min_tick: self.min_tick,
            long_name: self.long_name.to_string(),
            industry: self.industry.to_string(),
            trading_hours: US_HOURS.to_string(),
            time_zone_id: "US/Eastern".to_string(),
            valid_exchanges: valid_exchanges.to_string(),
            order_types: order_types.to_string(),
            contract,
        }
    }
}

/// Look up an instrument by the symbol it streams under.
pub fn by_stream_symbol(symbol: &str) -> Option<&'static Instrument> {
    INSTRUMENTS.iter().find(|i| i.stream_symbol() == symbol)
}

/// Resolve an unqualified contract against the reference data.
pub fn qualify(contract: &Contract) -> Option<(&'static Instrument, Contract)> {
    match contract.sec_type {
        SecType::Stock | SecType::Forex => {
            let instrument = INSTRUMENTS.iter().find(|i| {
                i.sec_type == contract.sec_type
                    && i.symbol == contract.symbol
                    && i.currency == contract.currency
            })?;
            let mut qualified = instrument.contract();
            if contract.exchange != qualified.exchange && contract.sec_type == SecType::Stock {
                qualified.exchange.clone_from(&contract.exchange);
            }
            Some((instrument, qualified))
        }
        SecType::Option => {
            let underlying = INSTRUMENTS
                .iter()
                .find(|i| i.sec_type == SecType::Stock && i.symbol == contract.symbol)?;
            let mut qualified = contract.clone();
            qualified.con_id = option_con_id(contract);
            qualified.multiplier = Some(contract.multiplier.clone().unwrap_or_else(|| "100".to_string()));
            qualified.primary_exchange = Some("CBOE".to_string());
            qualified.local_symbol = occ_symbol(contract);
            Some((underlying, qualified))
        }
        _ => None,
    }
}

fn option_con_id(contract: &Contract) -> i64 {
    let mut hasher = DefaultHasher::new();
    contract.symbol.hash(&mut hasher);
    contract.last_trade_date.hash(&mut hasher);
    contract.strike.map(f64::to_bits).hash(&mut hasher);
    contract.right.hash(&mut hasher);
    // Keep ids positive and clear of the listed range.
    500_000_000 + i64::try_from(hasher.finish() % 1_000_000_000).unwrap_or(0)
}

fn occ_symbol(contract: &Contract) -> String {
    let expiry = contract.last_trade_date.as_deref().unwrap_or_default();
    let expiry = expiry.get(2..).unwrap_or(expiry);
    let right = match contract.right {
        Some(crate::domain::contract::OptionRight::Put) => 'P',
        _ => 'C',
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let strike = (contract.strike.unwrap_or_default() * 1000.0).round() as u64;
    format!("{:<6}{expiry}{right}{strike:08}", contract.symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::{ContractRequest, create_contract};

    #[test]
    fn qualifies_known_stock() {
        let contract = create_contract(&ContractRequest::stock("AAPL")).unwrap();
        let (_, qualified) = qualify(&contract).unwrap();
        assert_eq!(qualified.con_id, 265_598);
        assert_eq!(qualified.primary_exchange.as_deref(), Some("NASDAQ"));
    }

    #[test]
    fn unknown_stock_is_not_qualified() {
        let contract = create_contract(&ContractRequest::stock("XYZ")).unwrap();
        assert!(qualify(&contract).is_none());
    }

    #[test]
    fn forex_streams_under_pair() {
        let instrument = by_stream_symbol("EURUSD").unwrap();
        assert_eq!(instrument.sec_type, SecType::Forex);
        assert_eq!(instrument.contract().local_symbol, "EUR.USD");
    }

    #[test]
    fn option_gets_stable_id_and_occ_symbol() {
        let request = ContractRequest {
            sec_type: SecType::Option,
            last_trade_date: Some("20250117".to_string()),
            strike: Some(150.0),
            right: Some("C".to_string()),
            ..ContractRequest::stock("AAPL")
        };
        let contract = create_contract(&request).unwrap();
        let (_, first) = qualify(&contract).unwrap();
        let (_, second) = qualify(&contract).unwrap();
        assert_eq!(first.con_id, second.con_id);
        assert_eq!(first.local_symbol, "AAPL  250117C00150000");
        assert_eq!(first.multiplier.as_deref(), Some("100"));
    }
}
