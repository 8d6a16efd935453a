//! Port Interfaces
//!
//! Contracts between the gateway and the Broker Session, following the
//! hexagonal layout. Infrastructure adapters implement them; application
//! services and HTTP handlers only see these traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamingPort`: open and cancel upstream streaming subscriptions
//! - `BrokerPort`: request/response calls (accounts, orders, market data)
//!
//! Asynchronous updates flow back as [`BrokerEvent`]s on an mpsc channel.

mod broker_port;
mod streaming_port;

pub use broker_port::{BrokerError, BrokerPort, ConnectionInfo, SharedBroker};
pub use streaming_port::{BrokerEvent, RequestId, StreamingPort, UpstreamHandle};

#[cfg(test)]
pub use streaming_port::MockStreamingPort;
