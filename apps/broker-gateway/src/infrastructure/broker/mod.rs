//! Broker Session Adapter
//!
//! The shipped adapter is an in-process simulated session that speaks both
//! the request/response and the streaming port.

mod instruments;
mod market;
mod simulated;

pub use simulated::SimulatedBroker;
