//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::time::Duration;

/// Broker Session connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Broker host.
    pub host: String,
    /// Broker API port (4002 = paper gateway).
    pub port: u16,
    /// Client id of this session.
    pub client_id: i32,
    /// Reject order placement.
    pub readonly: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4002,
            client_id: 1,
            readonly: false,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP/WebSocket port.
    pub http_port: u16,
    /// Upper bound on a single broker data pull.
    pub request_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Streaming fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Outbound queue length per streaming connection.
    pub sink_capacity: usize,
    /// Capacity of the broker event channel.
    pub event_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sink_capacity: 256,
            event_capacity: 4_096,
        }
    }
}

/// Simulated broker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorSettings {
    /// Interval between synthetic stream updates.
    pub tick_interval: Duration,
    /// Managed accounts.
    pub accounts: Vec<String>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            accounts: vec!["DU123456".to_string()],
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Broker Session settings.
    pub broker: BrokerSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Streaming settings.
    pub streaming: StreamSettings,
    /// Simulated broker settings.
    pub simulator: SimulatorSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Unparseable numbers fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `BROKER_HOST` is empty, a capacity is
    /// zero or no simulated account is configured.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("BROKER_HOST").unwrap_or(defaults.broker.host);
        if host.trim().is_empty() {
            return Err(ConfigError::EmptyValue("BROKER_HOST".to_string()));
        }

        let broker = BrokerSettings {
            host: host.trim().to_string(),
            port: parse_or(&lookup, "BROKER_PORT", defaults.broker.port),
            client_id: parse_or(&lookup, "BROKER_CLIENT_ID", defaults.broker.client_id),
            readonly: lookup("BROKER_READONLY")
                .map_or(defaults.broker.readonly, |v| parse_bool(&v)),
        };

        let server = ServerSettings {
            http_port: parse_or(&lookup, "GATEWAY_HTTP_PORT", defaults.server.http_port),
            request_timeout: lookup("GATEWAY_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(defaults.server.request_timeout, Duration::from_secs),
        };

        let streaming = StreamSettings {
            sink_capacity: parse_or(
                &lookup,
                "STREAM_SINK_CAPACITY",
                defaults.streaming.sink_capacity,
            ),
            event_capacity: parse_or(
                &lookup,
                "BROKER_EVENT_CAPACITY",
                defaults.streaming.event_capacity,
            ),
        };
        if streaming.sink_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("STREAM_SINK_CAPACITY".to_string()));
        }
        if streaming.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("BROKER_EVENT_CAPACITY".to_string()));
        }

        let accounts = lookup("SIM_ACCOUNTS").map_or(defaults.simulator.accounts, |v| {
            v.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        });
        if accounts.is_empty() {
            return Err(ConfigError::EmptyValue("SIM_ACCOUNTS".to_string()));
        }

        let simulator = SimulatorSettings {
            tick_interval: lookup("SIM_TICK_INTERVAL_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map_or(defaults.simulator.tick_interval, Duration::from_millis),
            accounts,
        };

        Ok(Self {
            broker,
            server,
            streaming,
            simulator,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A queue capacity is zero.
    #[error("environment variable {0} must be greater than zero")]
    ZeroCapacity(String),
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
