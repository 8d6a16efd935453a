#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Broker Gateway - HTTP/WebSocket front end for a brokerage session
//!
//! Exposes one Broker Session to many clients: REST endpoints for account,
//! trading, market data, research and scanner calls, and WebSocket streams
//! for tickers and PnL. Streams are aggregated per resource so the broker
//! sees one upstream subscription per symbol or account however many
//! clients are watching.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Broker data types and the streaming vocabulary
//!   - `subscription`: Resource keys, sinks, registry statistics
//!   - `streaming`: Ticker and PnL updates pushed to clients
//!   - `contract`, `order`, `market_data`, `account`, `scanner`
//!
//! - **Application**: Ports and services
//!   - `ports`: Broker Session interfaces (request/response and streaming)
//!   - `services`: Subscription registry, broker event loop, session state
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broker`: Simulated Broker Session
//!   - `http`: axum REST and WebSocket handlers
//!   - `health`, `metrics`, `telemetry`, `config`
//!
//! # Data Flow
//!
//! ```text
//!                      subscribe/cancel (0<->1 transitions only)
//!  WS client 1 --+   +---------------------------+      +----------------+
//!  WS client 2 --+-->|   SubscriptionRegistry    |----->| Broker Session |
//!  WS client N --+   +---------------------------+      +----------------+
//!        ^                       ^                              |
//!        |   ChannelSink queues  |  dispatch                    | BrokerEvent
//!        +-----------------------+------ event loop <-----------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Broker data types with no I/O.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{ErrorFrame, PnlUpdate, StreamMessage, TickerUpdate};
pub use domain::subscription::{
    DispatchOutcome, KeyError, KeyPhase, ResourceKey, SharedSink, Sink, SinkError, SinkId,
    StreamChannel, SubscriptionStats,
};

// Ports
pub use application::ports::{
    BrokerError, BrokerEvent, BrokerPort, RequestId, SharedBroker, StreamingPort, UpstreamHandle,
};

// Services
pub use application::services::{
    ConnectionState, RegistryError, SessionState, SubscriptionRegistry, run_event_loop,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig};

// Broker adapter
pub use infrastructure::broker::SimulatedBroker;

// HTTP
pub use infrastructure::health::HealthState;
pub use infrastructure::http::{AppState, ChannelSink, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
