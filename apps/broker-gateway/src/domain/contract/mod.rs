//! Contract Types
//!
//! Client-facing contract requests and the broker contract they are turned
//! into. Qualification (resolving a contract id, primary exchange and so on)
//! is owned by the broker; this module only validates the request shape.

use serde::{Deserialize, Serialize};

/// Default routing exchange.
pub const DEFAULT_EXCHANGE: &str = "SMART";

/// Default currency.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Exchange used for spot FX pairs.
pub const FOREX_EXCHANGE: &str = "IDEALPRO";

/// Security type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecType {
    /// Stock.
    #[default]
    #[serde(rename = "STK")]
    Stock,
    /// Option.
    #[serde(rename = "OPT")]
    Option,
    /// Future.
    #[serde(rename = "FUT")]
    Future,
    /// Spot FX.
    #[serde(rename = "CASH", alias = "FOREX")]
    Forex,
    /// Index.
    #[serde(rename = "IND")]
    Index,
    /// Contract for difference.
    #[serde(rename = "CFD")]
    Cfd,
    /// Commodity.
    #[serde(rename = "CMDTY")]
    Commodity,
    /// Bond.
    #[serde(rename = "BOND")]
    Bond,
    /// Fund.
    #[serde(rename = "FUND")]
    Fund,
}

impl SecType {
    /// Broker code for this security type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "STK",
            Self::Option => "OPT",
            Self::Future => "FUT",
            Self::Forex => "CASH",
            Self::Index => "IND",
            Self::Cfd => "CFD",
            Self::Commodity => "CMDTY",
            Self::Bond => "BOND",
            Self::Fund => "FUND",
        }
    }
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    /// Call.
    #[serde(rename = "C", alias = "CALL")]
    Call,
    /// Put.
    #[serde(rename = "P", alias = "PUT")]
    Put,
}

impl OptionRight {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }
}

/// Contract as described by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRequest {
    /// Underlying symbol (or FX pair such as `EURUSD`).
    pub symbol: String,
    /// Security type.
    #[serde(default)]
    pub sec_type: SecType,
    /// Routing exchange.
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Currency.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Option expiry, `YYYYMMDD` or `YYYYMM`.
    #[serde(default)]
    pub last_trade_date: Option<String>,
    /// Option strike.
    #[serde(default)]
    pub strike: Option<f64>,
    /// Option right, `C` or `P`.
    #[serde(default)]
    pub right: Option<String>,
    /// Contract multiplier.
    #[serde(default)]
    pub multiplier: Option<String>,
    /// Primary listing exchange.
    #[serde(default)]
    pub primary_exchange: Option<String>,
}

fn default_exchange() -> String {
    DEFAULT_EXCHANGE.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl ContractRequest {
    /// Stock request routed through the default exchange.
    #[must_use]
    pub fn stock(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: SecType::Stock,
            exchange: default_exchange(),
            currency: default_currency(),
            last_trade_date: None,
            strike: None,
            right: None,
            multiplier: None,
            primary_exchange: None,
        }
    }
}

/// Broker contract.
///
/// `con_id` is zero until the broker has qualified the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Broker contract id.
    pub con_id: i64,
    /// Symbol.
    pub symbol: String,
    /// Security type.
    pub sec_type: SecType,
    /// Routing exchange.
    pub exchange: String,
    /// Primary listing exchange.
    pub primary_exchange: Option<String>,
    /// Currency.
    pub currency: String,
    /// Exchange-local symbol.
    pub local_symbol: String,
    /// Option expiry.
    pub last_trade_date: Option<String>,
    /// Option strike.
    pub strike: Option<f64>,
    /// Option right.
    pub right: Option<OptionRight>,
    /// Contract multiplier.
    pub multiplier: Option<String>,
}

impl Contract {
    fn base(symbol: String, sec_type: SecType, exchange: String, currency: String) -> Self {
        Self {
            con_id: 0,
            local_symbol: String::new(),
            symbol,
            sec_type,
            exchange,
            primary_exchange: None,
            currency,
            last_trade_date: None,
            strike: None,
            right: None,
            multiplier: None,
        }
    }

    /// Whether the broker has qualified this contract.
    #[must_use]
    pub const fn is_qualified(&self) -> bool {
        self.con_id != 0
    }

    /// Symbol used as the streaming key for this contract.
    ///
    /// FX pairs stream under their concatenated pair (`EURUSD`).
    #[must_use]
    pub fn stream_symbol(&self) -> String {
        match self.sec_type {
            SecType::Forex => format!("{}{}", self.symbol, self.currency),
            _ => self.symbol.clone(),
        }
    }
}

/// Turn a client request into an unqualified broker contract.
///
/// # Errors
///
/// Returns [`ContractError`] if required fields for the security type are
/// missing or malformed, or the security type is not supported.
pub fn create_contract(request: &ContractRequest) -> Result<Contract, ContractError> {
    let symbol = request.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(ContractError::MissingField("symbol"));
    }

    let mut contract = match request.sec_type {
        SecType::Stock => Contract::base(
            symbol,
            SecType::Stock,
            request.exchange.clone(),
            request.currency.clone(),
        ),
        SecType::Option => {
            let expiry = request
                .last_trade_date
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(ContractError::MissingField("last_trade_date"))?;
            if !(expiry.len() == 8 || expiry.len() == 6) || !expiry.chars().all(|c| c.is_ascii_digit())
            {
                return Err(ContractError::InvalidField {
                    field: "last_trade_date",
                    reason: format!("{expiry:?} is not YYYYMMDD or YYYYMM"),
                });
            }

            let strike = request.strike.ok_or(ContractError::MissingField("strike"))?;
            if !strike.is_finite() || strike <= 0.0 {
                return Err(ContractError::InvalidField {
                    field: "strike",
                    reason: format!("{strike} must be positive"),
                });
            }

            let raw_right = request
                .right
                .as_deref()
                .ok_or(ContractError::MissingField("right"))?;
            let right = OptionRight::parse(raw_right).ok_or_else(|| ContractError::InvalidField {
                field: "right",
                reason: format!("{raw_right:?} is not C or P"),
            })?;

            let mut contract = Contract::base(
                symbol,
                SecType::Option,
                request.exchange.clone(),
                request.currency.clone(),
            );
            contract.last_trade_date = Some(expiry.to_string());
            contract.strike = Some(strike);
            contract.right = Some(right);
            contract.multiplier = request.multiplier.clone();
            contract
        }
        SecType::Forex => {
            let pair: String = symbol.chars().filter(char::is_ascii_alphabetic).collect();
            if pair.len() != 6 {
                return Err(ContractError::InvalidField {
                    field: "symbol",
                    reason: format!("{symbol:?} is not a 6-letter currency pair"),
                });
            }
            let (base, quote) = pair.split_at(3);
            Contract::base(
                base.to_string(),
                SecType::Forex,
                FOREX_EXCHANGE.to_string(),
                quote.to_string(),
            )
        }
        other => return Err(ContractError::UnsupportedSecType(other)),
    };

    contract.primary_exchange = request.primary_exchange.clone();
    Ok(contract)
}

/// Contract request validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    /// A field required for the security type is missing.
    #[error("missing required contract field: {0}")]
    MissingField(&'static str),
    /// A field is present but malformed.
    #[error("invalid contract field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The security type cannot be built into a contract.
    #[error("unsupported security type: {}", .0.as_str())]
    UnsupportedSecType(SecType),
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn option_request() -> ContractRequest {
        ContractRequest {
            sec_type: SecType::Option,
            last_trade_date: Some("20250117".to_string()),
            strike: Some(150.0),
            right: Some("C".to_string()),
            ..ContractRequest::stock("AAPL")
        }
    }

    #[test]
    fn request_defaults_from_json() {
        let req: ContractRequest = serde_json::from_str(r#"{"symbol":"AAPL"}"#).unwrap();
        assert_eq!(req.sec_type, SecType::Stock);
        assert_eq!(req.exchange, "SMART");
        assert_eq!(req.currency, "USD");
    }

    #[test]
    fn stock_contract() {
        let contract = create_contract(&ContractRequest::stock("aapl")).unwrap();
        assert_eq!(contract.symbol, "AAPL");
        assert_eq!(contract.sec_type, SecType::Stock);
        assert!(!contract.is_qualified());
    }

    #[test]
    fn option_contract() {
        let contract = create_contract(&option_request()).unwrap();
        assert_eq!(contract.right, Some(OptionRight::Call));
        assert_eq!(contract.strike, Some(150.0));
        assert_eq!(contract.last_trade_date.as_deref(), Some("20250117"));
    }

    #[test]
    fn option_requires_expiry() {
        let req = ContractRequest {
            last_trade_date: None,
            ..option_request()
        };
        assert_eq!(
            create_contract(&req),
            Err(ContractError::MissingField("last_trade_date"))
        );
    }

    #[test_case(Some(0.0) ; "zero strike")]
    #[test_case(Some(-5.0) ; "negative strike")]
    fn option_rejects_bad_strike(strike: Option<f64>) {
        let req = ContractRequest {
            strike,
            ..option_request()
        };
        assert!(matches!(
            create_contract(&req),
            Err(ContractError::InvalidField { field: "strike", .. })
        ));
    }

    #[test]
    fn option_rejects_bad_right() {
        let req = ContractRequest {
            right: Some("X".to_string()),
            ..option_request()
        };
        assert!(matches!(
            create_contract(&req),
            Err(ContractError::InvalidField { field: "right", .. })
        ));
    }

    #[test]
    fn forex_pair_is_split() {
        let req = ContractRequest {
            sec_type: SecType::Forex,
            ..ContractRequest::stock("EURUSD")
        };
        let contract = create_contract(&req).unwrap();
        assert_eq!(contract.symbol, "EUR");
        assert_eq!(contract.currency, "USD");
        assert_eq!(contract.exchange, FOREX_EXCHANGE);
        assert_eq!(contract.stream_symbol(), "EURUSD");
    }

    #[test]
    fn forex_rejects_short_pair() {
        let req = ContractRequest {
            sec_type: SecType::Forex,
            ..ContractRequest::stock("EUR")
        };
        assert!(create_contract(&req).is_err());
    }

    #[test_case(SecType::Future)]
    #[test_case(SecType::Bond)]
    #[test_case(SecType::Index)]
    fn unsupported_sec_types(sec_type: SecType) {
        let req = ContractRequest {
            sec_type,
            ..ContractRequest::stock("ES")
        };
        assert_eq!(
            create_contract(&req),
            Err(ContractError::UnsupportedSecType(sec_type))
        );
    }

    #[test]
    fn missing_symbol() {
        assert_eq!(
            create_contract(&ContractRequest::stock("  ")),
            Err(ContractError::MissingField("symbol"))
        );
    }

    #[test]
    fn sec_type_wire_names() {
        assert_eq!(serde_json::to_string(&SecType::Forex).unwrap(), "\"CASH\"");
        let parsed: SecType = serde_json::from_str("\"OPT\"").unwrap();
        assert_eq!(parsed, SecType::Option);
        assert!(serde_json::from_str::<SecType>("\"XYZ\"").is_err());
    }
}
