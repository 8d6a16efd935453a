//! Subscription Types
//!
//! Domain types for tracking streaming subscriptions: the resource keys
//! clients subscribe to, the sinks registered under them and the per-key
//! lifecycle.
//!
//! # Design
//!
//! A resource key (ticker symbol or account id) has one upstream subscription
//! with the broker session for as long as at least one sink is registered
//! under it. The registry that enforces this lives in
//! [`crate::application::services::registry`]; this module only holds the
//! pure types it is built from.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::streaming::StreamMessage;

// =============================================================================
// Resource Keys
// =============================================================================

/// Maximum length of a ticker symbol (covers OCC-style local symbols).
const MAX_SYMBOL_LEN: usize = 15;

/// Maximum length of an account id.
const MAX_ACCOUNT_LEN: usize = 32;

/// Kind of streaming resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamChannel {
    /// Real-time ticker updates for a symbol.
    Ticker,
    /// Real-time profit and loss for an account.
    Pnl,
}

impl StreamChannel {
    /// Channel name used in stream frames and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Pnl => "pnl",
        }
    }
}

/// Identifier under which streaming subscriptions are aggregated.
///
/// Construct through [`ResourceKey::ticker`] or [`ResourceKey::pnl`] so the
/// identifier is validated and normalised before anything upstream sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "channel", content = "key", rename_all = "lowercase")]
pub enum ResourceKey {
    /// Ticker symbol (upper-cased).
    Ticker(String),
    /// Account id.
    Pnl(String),
}

impl ResourceKey {
    /// Build a ticker key from a raw symbol.
    ///
    /// The symbol is trimmed and upper-cased. Allowed characters are
    /// `A-Z`, `0-9`, `.`, `-` and `/`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the symbol is empty, too long or contains
    /// other characters.
    pub fn ticker(raw: &str) -> Result<Self, KeyError> {
        let symbol = raw.trim().to_ascii_uppercase();
        validate(&symbol, MAX_SYMBOL_LEN, |c| {
            c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '/')
        })?;
        Ok(Self::Ticker(symbol))
    }

    /// Build a PnL key from a raw account id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the account id is empty, too long or not
    /// ASCII alphanumeric.
    pub fn pnl(raw: &str) -> Result<Self, KeyError> {
        let account = raw.trim().to_string();
        validate(&account, MAX_ACCOUNT_LEN, |c| c.is_ascii_alphanumeric())?;
        Ok(Self::Pnl(account))
    }

    /// Build a key for the given channel.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the identifier is malformed for that channel.
    pub fn parse(channel: StreamChannel, raw: &str) -> Result<Self, KeyError> {
        match channel {
            StreamChannel::Ticker => Self::ticker(raw),
            StreamChannel::Pnl => Self::pnl(raw),
        }
    }

    /// The channel this key belongs to.
    #[must_use]
    pub const fn channel(&self) -> StreamChannel {
        match self {
            Self::Ticker(_) => StreamChannel::Ticker,
            Self::Pnl(_) => StreamChannel::Pnl,
        }
    }

    /// The bare identifier (symbol or account id).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ticker(id) | Self::Pnl(id) => id,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel().as_str(), self.id())
    }
}

fn validate(value: &str, max_len: usize, allowed: impl Fn(char) -> bool) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty);
    }
    if value.len() > max_len {
        return Err(KeyError::TooLong {
            value: value.to_string(),
            max: max_len,
        });
    }
    if let Some(c) = value.chars().find(|c| !allowed(*c)) {
        return Err(KeyError::InvalidCharacter {
            value: value.to_string(),
            character: c,
        });
    }
    Ok(())
}

/// Malformed resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Identifier is empty.
    #[error("resource identifier cannot be empty")]
    Empty,
    /// Identifier exceeds the maximum length.
    #[error("resource identifier {value:?} exceeds {max} characters")]
    TooLong {
        /// Offending identifier.
        value: String,
        /// Maximum allowed length.
        max: usize,
    },
    /// Identifier contains a character outside the allowed set.
    #[error("resource identifier {value:?} contains invalid character {character:?}")]
    InvalidCharacter {
        /// Offending identifier.
        value: String,
        /// First invalid character.
        character: char,
    },
}

// =============================================================================
// Sinks
// =============================================================================

/// Unique identifier of an output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Generate a random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Delivery failure for a single sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The connection behind the sink is gone.
    #[error("sink closed")]
    Closed,
    /// The sink's outbound queue is full (slow consumer).
    #[error("sink queue full")]
    Full,
}

/// A "push a message to one connected client" capability.
///
/// `deliver` must return immediately; a sink that cannot accept the message
/// right now reports [`SinkError::Full`] and is dropped by the registry.
pub trait Sink: Send + Sync {
    /// Identity of this sink, stable for its lifetime.
    fn id(&self) -> SinkId;

    /// Hand a message to the sink without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the message could not be queued.
    fn deliver(&self, message: Arc<StreamMessage>) -> Result<(), SinkError>;
}

/// Shared sink handle as stored by the registry.
pub type SharedSink = Arc<dyn Sink>;

// =============================================================================
// Key Lifecycle
// =============================================================================

/// Lifecycle of one resource key.
///
/// `Subscribing` and `Unsubscribing` only last for the duration of the
/// upstream call and are held under the key's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPhase {
    /// No upstream subscription.
    #[default]
    Unsubscribed,
    /// Upstream subscribe in flight.
    Subscribing,
    /// Upstream subscription held, one or more sinks registered.
    Active,
    /// Upstream cancel in flight.
    Unsubscribing,
}

impl KeyPhase {
    /// Phase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Subscribing => "subscribing",
            Self::Active => "active",
            Self::Unsubscribing => "unsubscribing",
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry-wide subscription statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    /// Keys with an active upstream subscription.
    pub active_keys: usize,
    /// Sinks registered across all keys.
    pub sinks: usize,
}

/// Result of dispatching one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Sinks that accepted the message.
    pub delivered: usize,
    /// Sinks removed because delivery failed.
    pub dropped: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("aapl", "AAPL" ; "lowercase is normalised")]
    #[test_case("  MSFT ", "MSFT" ; "whitespace is trimmed")]
    #[test_case("BRK.B", "BRK.B" ; "dot class suffix")]
    #[test_case("EUR/USD", "EUR/USD" ; "slash pair")]
    fn ticker_key_accepts(raw: &str, expected: &str) {
        let key = ResourceKey::ticker(raw).unwrap();
        assert_eq!(key, ResourceKey::Ticker(expected.to_string()));
        assert_eq!(key.id(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("AAPL;DROP" ; "semicolon")]
    #[test_case("A B" ; "inner space")]
    #[test_case("ABCDEFGHIJKLMNOPQ" ; "too long")]
    fn ticker_key_rejects(raw: &str) {
        assert!(ResourceKey::ticker(raw).is_err());
    }

    #[test]
    fn empty_key_reports_empty() {
        assert_eq!(ResourceKey::ticker(""), Err(KeyError::Empty));
    }

    #[test]
    fn invalid_character_is_reported() {
        let err = ResourceKey::ticker("AA$").unwrap_err();
        assert_eq!(
            err,
            KeyError::InvalidCharacter {
                value: "AA$".to_string(),
                character: '$',
            }
        );
    }

    #[test]
    fn pnl_key_keeps_case() {
        let key = ResourceKey::pnl("DU123456").unwrap();
        assert_eq!(key.channel(), StreamChannel::Pnl);
        assert_eq!(key.id(), "DU123456");
        assert!(ResourceKey::pnl("DU-1").is_err());
    }

    #[test]
    fn parse_dispatches_on_channel() {
        assert_eq!(
            ResourceKey::parse(StreamChannel::Ticker, "spy").unwrap(),
            ResourceKey::Ticker("SPY".to_string())
        );
        assert_eq!(
            ResourceKey::parse(StreamChannel::Pnl, "U1").unwrap(),
            ResourceKey::Pnl("U1".to_string())
        );
    }

    #[test]
    fn key_display_includes_channel() {
        let key = ResourceKey::ticker("AAPL").unwrap();
        assert_eq!(key.to_string(), "ticker:AAPL");
    }

    #[test]
    fn key_serialization() {
        let key = ResourceKey::ticker("AAPL").unwrap();
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::json!({"channel": "ticker", "key": "AAPL"}));
    }

    #[test]
    fn sink_ids_are_distinct() {
        assert_ne!(SinkId::generate(), SinkId::generate());
        assert_eq!(SinkId::new(7).to_string(), "0000000000000007");
    }

    #[test]
    fn key_phase_default_is_unsubscribed() {
        assert_eq!(KeyPhase::default(), KeyPhase::Unsubscribed);
        assert_eq!(KeyPhase::Unsubscribing.as_str(), "unsubscribing");
    }
}
