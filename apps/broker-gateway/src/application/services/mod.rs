//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionRegistry`: per-key sink sets and upstream subscriptions
//! - `run_event_loop`: feeds broker events into the registry
//! - `SessionState`: broker connection tracking

/// Broker event loop.
pub mod event_loop;

/// Subscription registry.
pub mod registry;

/// Broker session state.
pub mod session;

pub use event_loop::run_event_loop;
pub use registry::{RegistryError, SubscriptionRegistry};
pub use session::{ConnectionState, SessionSnapshot, SessionState};
