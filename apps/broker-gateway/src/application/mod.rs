//! Application Layer - Use cases and port definitions.
//!
//! Ports define how the gateway talks to the Broker Session; services hold
//! the subscription registry and the event loop that feeds it.

/// Port interfaces for the Broker Session.
pub mod ports;

/// Registry, event loop and session state.
pub mod services;
