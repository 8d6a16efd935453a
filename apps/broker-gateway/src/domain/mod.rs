//! Domain Layer - Core gateway types and validation.
//!
//! Pure types for streaming subscriptions and the broker request/reply
//! shapes. Nothing in here performs I/O.

/// Account values, positions and portfolio items.
pub mod account;

/// Contract requests and construction.
pub mod contract;

/// Bars, ticks and depth requests and replies.
pub mod market_data;

/// Orders, trades and fills.
pub mod order;

/// Scanner and contract details.
pub mod scanner;

/// Stream messages pushed to clients (tickers, PnL, error frames).
pub mod streaming;

/// Resource keys, sinks and per-key lifecycle.
pub mod subscription;
