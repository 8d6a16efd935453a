//! Configuration Module
//!
//! Environment configuration for the gateway.

mod settings;

pub use settings::{
    BrokerSettings, ConfigError, GatewayConfig, ServerSettings, SimulatorSettings, StreamSettings,
};
